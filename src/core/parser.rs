//! Reads the line-oriented input file into a `Simulation`. Each line
//! carries one value followed by free-form commentary; the field order is
//! fixed and documented in the bundled example input.

// std
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
// others
use pest::Parser;
// pertmc
use crate::core::detector::DetectorDefinition;
use crate::core::pertmc::{Float, MAX_NUM_LAYERS};
use crate::core::simulation::Simulation;
use crate::core::source::{BeamType, SourceDefinition};
use crate::core::tissue::{Layer, PerturbMode, TissueStack};
use crate::shapes::ellipsoid::Ellipsoid;

#[derive(Parser)]
#[grammar = "mcinput.pest"]
struct InputFileParser;

/// Configuration failures are fatal at startup; the message carries the
/// 1-based line of the offending value where one exists.
#[derive(Debug)]
pub enum InputError {
    Io(std::io::Error),
    Syntax(String),
    Field {
        line: usize,
        field: &'static str,
        message: String,
    },
    Invalid(String),
}

impl fmt::Display for InputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputError::Io(e) => write!(f, "cannot read input file: {}", e),
            InputError::Syntax(msg) => write!(f, "malformed input file: {}", msg),
            InputError::Field {
                line,
                field,
                message,
            } => write!(f, "line {}: bad value for {}: {}", line, field, message),
            InputError::Invalid(msg) => write!(f, "invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for InputError {}

impl From<std::io::Error> for InputError {
    fn from(e: std::io::Error) -> Self {
        InputError::Io(e)
    }
}

/// Token stream over the parsed file with typed accessors.
struct Values {
    items: Vec<(usize, String)>,
    pos: usize,
}

impl Values {
    fn parse(text: &str) -> Result<Self, InputError> {
        let file = InputFileParser::parse(Rule::file, text)
            .map_err(|e| InputError::Syntax(e.to_string()))?
            .next()
            .unwrap();
        let mut items = Vec::new();
        for entry in file.into_inner() {
            if entry.as_rule() != Rule::entry {
                continue;
            }
            for token in entry.into_inner() {
                if token.as_rule() == Rule::token {
                    let (line, _) = token.as_span().start_pos().line_col();
                    items.push((line, token.as_str().to_string()));
                }
            }
        }
        Ok(Values { items, pos: 0 })
    }

    fn next(&mut self, field: &'static str) -> Result<(usize, &str), InputError> {
        match self.items.get(self.pos) {
            Some((line, tok)) => {
                self.pos += 1;
                Ok((*line, tok.as_str()))
            }
            None => Err(InputError::Field {
                line: self.items.last().map(|(l, _)| *l).unwrap_or(0),
                field,
                message: "missing value (input file ended early)".to_string(),
            }),
        }
    }

    fn string(&mut self, field: &'static str) -> Result<String, InputError> {
        let (_, tok) = self.next(field)?;
        Ok(tok.to_string())
    }

    fn float(&mut self, field: &'static str) -> Result<Float, InputError> {
        let (line, tok) = self.next(field)?;
        tok.parse::<Float>().map_err(|_| InputError::Field {
            line,
            field,
            message: format!("expected a number, found {:?}", tok),
        })
    }

    fn count(&mut self, field: &'static str) -> Result<usize, InputError> {
        let (line, tok) = self.next(field)?;
        tok.parse::<usize>().map_err(|_| InputError::Field {
            line,
            field,
            message: format!("expected a non-negative integer, found {:?}", tok),
        })
    }
}

/// Parses an input file from disk.
pub fn read_input_file(path: &Path) -> Result<Simulation, InputError> {
    let text = fs::read_to_string(path)?;
    read_input_str(&text)
}

/// Parses the fixed field order: output name, layer stack, beam, bin
/// geometry, photon count, time bins, perturbation block, and the
/// detector ring description.
pub fn read_input_str(text: &str) -> Result<Simulation, InputError> {
    let mut values = Values::parse(text)?;

    let output_name = values.string("output filename")?;

    let num_layers = values.count("number of layers")?;
    if num_layers == 0 || num_layers > MAX_NUM_LAYERS {
        return Err(InputError::Invalid(format!(
            "number of layers must be in 1..={}, got {}",
            MAX_NUM_LAYERS, num_layers
        )));
    }

    let n_above = values.float("outside medium n")?;
    let mut tissue_layers = Vec::with_capacity(num_layers);
    for _ in 0..num_layers {
        let n = values.float("layer n")?;
        let mus = values.float("layer mus")?;
        let mua = values.float("layer mua")?;
        let g = values.float("layer g")?;
        let d = values.float("layer thickness")?;
        tissue_layers.push(Layer {
            n,
            mua,
            mus,
            g,
            d,
            ..Layer::default()
        });
    }
    let n_below = values.float("bottom medium n")?;

    let (line, beam_tok) = {
        let (line, tok) = values.next("beam type")?;
        (line, tok.to_string())
    };
    let beam_type = BeamType::from_str(&beam_tok).map_err(|_| InputError::Field {
        line,
        field: "beam type",
        message: format!(
            "must be g (Gaussian), f (flat) or r (rectangular), found {:?}",
            beam_tok
        ),
    })?;

    let beam_center_x = values.float("beam center x")?;
    let beam_radius = values.float("beam radius")?;
    let src_na = values.float("source NA")?;

    let nr = values.count("nr")?;
    let dr = values.float("dr")?;
    let nz = values.count("nz")?;
    let dz = values.float("dz")?;
    let nx = values.count("nx")?;
    let dx = values.float("dx")?;
    let ny = values.count("ny")?;
    let dy = values.float("dy")?;

    let num_photons = values.count("number of photons")?;
    let nt = values.count("nt")?;
    let dt = values.float("dt")?;

    let pert_flag = values.count("perturbation flag")?;
    if pert_flag > 3 {
        return Err(InputError::Invalid(format!(
            "perturbation flag must be 0..=3, got {}",
            pert_flag
        )));
    }
    let ex = values.float("ellipsoid center x")?;
    let ey = values.float("ellipsoid center y")?;
    let ez = values.float("ellipsoid center z")?;
    let rx = values.float("ellipsoid radius x")?;
    let ry = values.float("ellipsoid radius y")?;
    let rz = values.float("ellipsoid radius z")?;
    let pert_layer_z_min = values.float("perturbed layer z min")?;
    let pert_layer_z_max = values.float("perturbed layer z max")?;

    // the detector section redeclares the radial bin count; a nonzero
    // redeclaration wins
    let nr = {
        let redeclared = values.count("detector nr")?;
        if redeclared != 0 {
            redeclared
        } else {
            nr
        }
    };
    let reflect_flag = values.count("reflect flag")? != 0;
    let mut det_ctr = Vec::with_capacity(nr);
    for _ in 0..nr {
        det_ctr.push(values.float("detector center")?);
    }
    let det_rad = values.float("detector radius")?;

    if nr == 0 || nz == 0 || nt == 0 || nx == 0 || ny == 0 {
        return Err(InputError::Invalid(
            "all detector bin counts must be positive".to_string(),
        ));
    }
    if det_rad == 0.0 {
        eprintln!("Warning: zero detector radius specified");
    }

    let ellipsoid = Ellipsoid::new(ex, ey, ez, rx, ry, rz);
    let ellipsoid_present = pert_flag == 3 && !ellipsoid.is_absent();
    let perturb_mode = match pert_flag {
        1 => PerturbMode::Ellipsoid,
        2 => PerturbMode::Layer,
        _ => PerturbMode::None,
    };

    let mut tissue = TissueStack::new(n_above, tissue_layers, n_below, ellipsoid, ellipsoid_present);
    tissue.perturb_mode = perturb_mode;
    tissue.pert_layer_z_min = pert_layer_z_min;
    tissue.pert_layer_z_max = pert_layer_z_max;
    if ellipsoid_present {
        let slab = tissue.slab_thickness();
        if ez - rz < 0.0 || ez + rz > slab {
            return Err(InputError::Invalid(format!(
                "ellipsoid [{}, {}] must lie inside the slab [0, {}]",
                ez - rz,
                ez + rz,
                slab
            )));
        }
    }

    let source = SourceDefinition {
        num_photons,
        beam_type,
        beam_radius,
        beam_center_x,
        src_na,
        ..SourceDefinition::default()
    };

    let mut detector = DetectorDefinition::new(nr, dr, nz, dz, nx, dx, ny, dy, nt, dt);
    detector.reflect_flag = reflect_flag;
    detector.det_ctr = det_ctr;
    detector.det_rad = det_rad;

    Ok(Simulation::new(tissue, source, detector, output_name))
}
