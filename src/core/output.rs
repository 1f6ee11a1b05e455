//! Post-loop normalization by geometric measure and photon count, the
//! labeled text report, and the JSON run summary.

// std
use std::f64::consts::PI;
use std::fs::File;
use std::io::{BufWriter, Result as IoResult, Write};
use std::path::{Path, PathBuf};
// pertmc
use crate::core::pertmc::{fmt_sci, fmt_sci_upper12, Float};
use crate::core::photondb;
use crate::core::simulation::{RunResult, Simulation};

/// Scales every tally by its bin measure and the photon count, and derives
/// the marginal and scalar views. Call exactly once per run.
pub fn normalize_results(result: &mut RunResult, sim: &Simulation) {
    let det = &sim.detector;
    let t = &mut result.tallies;
    let nr = det.nr;
    let na = det.na;
    let nz = det.nz;
    let nt = det.nt;
    let (dr, da, dz) = (det.dr, det.da, det.dz);
    let n_phot = result.num_photons as Float;
    let num_lay = sim.tissue.num_layers;

    // marginals are formed from the raw joint tallies first
    let mut sum_r = 0.0;
    let mut sum_t = 0.0;
    for ir in 0..nr {
        for ia in 0..na {
            sum_r += t.r_ra[(ir, ia)];
            sum_t += t.t_ra[(ir, ia)];
        }
    }
    t.rd = sum_r;
    t.td = sum_t;

    for ir in 0..nr {
        let mut sum_r = 0.0;
        let mut sum_t = 0.0;
        for ia in 0..na {
            sum_r += t.r_ra[(ir, ia)];
            sum_t += t.t_ra[(ir, ia)];
        }
        t.r_r[ir] = sum_r;
        t.t_r[ir] = sum_t;
    }

    for ia in 0..na {
        let mut sum_r = 0.0;
        let mut sum_t = 0.0;
        for ir in 0..nr {
            sum_r += t.r_ra[(ir, ia)];
            sum_t += t.t_ra[(ir, ia)];
        }
        t.r_a[ia] = sum_r;
        t.t_a[ia] = sum_t;
    }

    for iz in 0..nz {
        let mut sum_a = 0.0;
        for ir in 0..nr {
            sum_a += t.a_rz[(ir, iz)];
        }
        t.a_z[iz] = sum_a;
    }

    // scalars
    t.rd /= n_phot;
    t.td /= n_phot;
    t.rtot = t.rd + result.rspec;
    for a in t.a_layer.iter_mut() {
        *a /= n_phot;
    }
    t.atot = t.a_layer.iter().sum();

    // R(r,a), T(r,a) by annulus area and solid angle
    let c1 = 2.0 * PI * dr * dr * 2.0 * PI * da * n_phot;
    for ir in 0..nr {
        for ia in 0..na {
            let c2 = c1 * (ir as Float + 0.5) * ((ia as Float + 0.5) * da).sin();
            t.r_ra[(ir, ia)] /= c2;
            t.t_ra[(ir, ia)] /= c2;
        }
    }

    // R(x,y) by cell area
    for ix in 0..2 * det.nx {
        for iy in 0..2 * det.ny {
            t.r_xy[(ix, iy)] /= n_phot * det.dx * det.dy;
        }
    }

    // R(r), T(r) and each time column of R(r,t) by annulus area
    for ir in 0..nr {
        let c1 = 2.0 * PI * (ir as Float + 0.5) * dr * dr * n_phot;
        t.r_r[ir] /= c1;
        t.t_r[ir] /= c1;
        for it in 0..nt {
            t.r_rt[(ir, it)] /= c1;
        }
    }

    // R(a), T(a) by solid angle
    for ia in 0..na {
        let c1 = 2.0 * PI * ((ia as Float + 0.5) * da).sin() * da * n_phot;
        t.r_a[ia] /= c1;
        t.t_a[ia] /= c1;
    }

    // A(r,z) by annulus volume, A(z) by depth slab
    for ir in 0..nr {
        for iz in 0..nz {
            let c1 = 2.0 * PI * (ir as Float + 0.5) * dr * dr * dz * n_phot;
            t.a_rz[(ir, iz)] /= c1;
        }
    }
    for iz in 0..nz {
        t.a_z[iz] /= dz * n_phot;
    }

    // fluence = absorption over the bin-center layer's mua
    for iz in 0..nz {
        let z = (iz as Float + 0.5) * dz;
        let mut i = 1;
        while z >= sim.tissue.layers[i].zend && i < num_lay {
            i += 1;
        }
        let mua = sim.tissue.layers[i].mua;
        for ir in 0..nr {
            t.flu_rz[(ir, iz)] = t.a_rz[(ir, iz)] / mua;
        }
        t.flu_z[iz] = t.a_z[iz] / mua;
    }
}

/// The labeled text report, `<name>.txt` in `dir`.
pub fn save_text_report(result: &RunResult, sim: &Simulation, dir: &Path) -> IoResult<PathBuf> {
    let det = &sim.detector;
    let t = &result.tallies;
    let nr = det.nr;
    let na = det.na;
    let nz = det.nz;
    let nt = det.nt;
    let (dr, da, dz, dt) = (det.dr, det.da, det.dz, det.dt);
    let num_lay = sim.tissue.num_layers;
    let path = dir.join(format!("{}.txt", sim.output_name));
    let mut f = BufWriter::new(File::create(&path)?);

    writeln!(f, "Input tissue parameters")?;
    writeln!(f, "Number of layers: {}", num_lay)?;
    writeln!(f, "layer\tn\tmus\tg\tmua\tthickness (cm)")?;
    for i in 1..=num_lay {
        let l = &sim.tissue.layers[i];
        writeln!(f, "{}\t{}\t{}\t{}\t{}\t{}", i, l.n, l.mus, l.g, l.mua, l.d)?;
    }
    writeln!(f, "Input number of photons={}", result.num_photons)?;

    writeln!(f, "\n\n")?;
    writeln!(f, "Specular reflection   = {}", fmt_sci_upper12(result.rspec))?;
    writeln!(f, "Diffuse reflection    = {}", fmt_sci_upper12(t.rd))?;
    writeln!(f, "Total reflection      = {}", fmt_sci_upper12(t.rtot))?;
    writeln!(f, "Diffuse transmission  = {}", fmt_sci_upper12(t.td))?;
    writeln!(f, "Total absorption      = {}", fmt_sci_upper12(t.atot))?;

    writeln!(f, "\n")?;
    writeln!(f, "Absorption vs layer")?;
    for i in 1..=num_lay {
        writeln!(f, "Layer {}: \t{:.6}", i, t.a_layer[i])?;
    }
    if sim.tissue.ellipsoid_present {
        writeln!(f, "Ellipsoid: \t{:.6}", t.a_layer[sim.tissue.ellipsoid_index])?;
    }
    writeln!(f, "\n")?;

    writeln!(f, "Radially resolved reflection and transmission")?;
    writeln!(f, "r(cm)\tR(r)[W/cm2]\tT(r)[W/cm2]")?;
    for ir in 0..nr {
        writeln!(
            f,
            "{}\t{}\t{}",
            fmt_sci((ir as Float + 0.5) * dr, 4),
            fmt_sci(t.r_r[ir], 4),
            fmt_sci(t.t_r[ir], 4)
        )?;
    }
    writeln!(f, "\n")?;

    writeln!(f, "Reflection vs r and time [W/cm2/ps]")?;
    writeln!(f, "The top row is time (in ps)")?;
    writeln!(f, "The first column is radius (in cm)")?;
    writeln!(f, "\t\tincreasing time ------->")?;
    write!(f, "           \t")?;
    for it in 0..nt {
        write!(f, "{}\t", fmt_sci((it as Float + 0.5) * dt, 4))?;
    }
    writeln!(f)?;
    for ir in 0..nr {
        write!(f, "{}\t", fmt_sci((ir as Float + 0.5) * dr, 4))?;
        for it in 0..nt {
            write!(f, "{}\t", fmt_sci(t.r_rt[(ir, it)], 4))?;
        }
        writeln!(f)?;
    }
    writeln!(f, "\n")?;

    writeln!(f, "Angular resolved reflection and transmission")?;
    writeln!(f, "a(rad) \t R(a)[W/Sr] \t T(a)[W/Sr]")?;
    for ia in 0..na {
        writeln!(
            f,
            "{}\t{}\t{}",
            fmt_sci((ia as Float + 0.5) * da, 4),
            fmt_sci(t.r_a[ia], 4),
            fmt_sci(t.t_a[ia], 4)
        )?;
    }
    writeln!(f, "\n")?;

    writeln!(f, "Reflection vs r and angle [W/cm2/Sr]")?;
    writeln!(f, "The top row is angle (in rad)")?;
    writeln!(f, "The first column is radius (in cm)")?;
    writeln!(f, "\t\tincreasing angle ------->")?;
    write!(f, "           \t")?;
    for ia in 0..na {
        write!(f, "{}\t", fmt_sci((ia as Float + 0.5) * da, 4))?;
    }
    writeln!(f)?;
    for ir in 0..nr {
        write!(f, "{}\t", fmt_sci((ir as Float + 0.5) * dr, 4))?;
        for ia in 0..na {
            write!(f, "{}\t", fmt_sci(t.r_ra[(ir, ia)], 4))?;
        }
        writeln!(f)?;
    }
    writeln!(f, "\n")?;

    writeln!(f, "Transmission vs r and angle [W/cm2/Sr]")?;
    writeln!(f, "The top row is angle (in rad)")?;
    writeln!(f, "The first column is radius (in cm)")?;
    writeln!(f, "\t\tincreasing angle ------->")?;
    write!(f, "           \t")?;
    for ia in 0..na {
        write!(f, "{}\t", fmt_sci((ia as Float + 0.5) * da, 4))?;
    }
    writeln!(f)?;
    for ir in 0..nr {
        write!(f, "{}\t", fmt_sci((ir as Float + 0.5) * dr, 4))?;
        for ia in 0..na {
            write!(f, "{}\t", fmt_sci(t.t_ra[(ir, ia)], 4))?;
        }
        writeln!(f)?;
    }
    writeln!(f, "\n")?;

    writeln!(f, "Depth resolved fluence and absorption")?;
    writeln!(f, "depth (cm)\tfluence[-]\tabsorption[W/cm]")?;
    for iz in 0..nz {
        writeln!(
            f,
            "{}\t{}\t{}",
            fmt_sci((iz as Float + 0.5) * dz, 4),
            fmt_sci(t.flu_z[iz], 4),
            fmt_sci(t.a_z[iz], 4)
        )?;
    }
    writeln!(f, "\n")?;

    writeln!(f, "Fluence vs r and z [W/cm2]")?;
    writeln!(f, "The top row is radius (in cm)")?;
    writeln!(f, "The first column is depth (in cm)")?;
    writeln!(f, "\t\tincreasing radius ------->")?;
    write!(f, "           \t")?;
    for ir in 0..nr {
        write!(f, "{}\t", fmt_sci((ir as Float + 0.5) * dr, 4))?;
    }
    writeln!(f)?;
    for iz in 0..nz {
        write!(f, "{}\t", fmt_sci((iz as Float + 0.5) * dz, 4))?;
        for ir in 0..nr {
            write!(f, "{}\t", fmt_sci(t.flu_rz[(ir, iz)], 4))?;
        }
        writeln!(f)?;
    }
    writeln!(f, "\n")?;

    writeln!(f, "Absorption vs r and z [W/cm3]")?;
    writeln!(f, "The top row is radius (in cm)")?;
    writeln!(f, "The first column is depth (in cm)")?;
    writeln!(f, "\t\tincreasing radius ------->")?;
    write!(f, "           \t")?;
    for ir in 0..nr {
        write!(f, "{}\t", fmt_sci((ir as Float + 0.5) * dr, 4))?;
    }
    writeln!(f)?;
    for iz in 0..nz {
        write!(f, "{}\t", fmt_sci((iz as Float + 0.5) * dz, 4))?;
        for ir in 0..nr {
            write!(f, "{}\t", fmt_sci(t.a_rz[(ir, iz)], 4))?;
        }
        writeln!(f)?;
    }
    writeln!(f, "\n")?;

    writeln!(f, "Cartesian resolved reflection")?;
    writeln!(f, "x(cm)\t    y(cm)\t    R(r)[W/cm2]")?;
    for ix in 0..2 * det.nx {
        for iy in 0..2 * det.ny {
            write!(
                f,
                "{}\t",
                fmt_sci((ix as Float + 0.5) * det.dx - det.nx as Float * det.dx, 4)
            )?;
            write!(
                f,
                "{}\t",
                fmt_sci((iy as Float + 0.5) * det.dy - det.ny as Float * det.dy, 4)
            )?;
            writeln!(f, "{}", fmt_sci(t.r_xy[(ix, iy)], 4))?;
        }
    }
    writeln!(f, "\n")?;

    f.flush()?;
    Ok(path)
}

/// Machine-readable scalar summary, `<name>.json` in `dir`.
#[derive(Debug, Serialize)]
struct RunSummary<'a> {
    output_name: &'a str,
    num_photons: usize,
    seed_flag: i32,
    abs_weighting: crate::core::reflection::AbsWeighting,
    perturb_mode: crate::core::tissue::PerturbMode,
    ellipsoid_present: bool,
    rspec: Float,
    rd: Float,
    rtot: Float,
    td: Float,
    atot: Float,
    a_layer: &'a [Float],
    tot_out_top: u64,
    tot_out_bot: u64,
    history_overflows: u64,
    banana_dead_walks: u64,
    banana_photons: u64,
    /// Raw second moments of the radial reflectance accumulator, for
    /// relative-error estimates downstream.
    r_r2: &'a [Float],
}

pub fn save_json_summary(result: &RunResult, sim: &Simulation, dir: &Path) -> IoResult<PathBuf> {
    let t = &result.tallies;
    let summary = RunSummary {
        output_name: &sim.output_name,
        num_photons: result.num_photons,
        seed_flag: sim.flags.seed,
        abs_weighting: sim.flags.abs_weighting,
        perturb_mode: sim.tissue.perturb_mode,
        ellipsoid_present: sim.tissue.ellipsoid_present,
        rspec: result.rspec,
        rd: t.rd,
        rtot: t.rtot,
        td: t.td,
        atot: t.atot,
        a_layer: &t.a_layer,
        tot_out_top: t.tot_out_top,
        tot_out_bot: t.tot_out_bot,
        history_overflows: t.history_overflows,
        banana_dead_walks: t.banana_dead_walks,
        banana_photons: result.banana.banana_photons,
        r_r2: &t.r_r2,
    };
    let path = dir.join(format!("{}.json", sim.output_name));
    let f = BufWriter::new(File::create(&path)?);
    serde_json::to_writer_pretty(f, &summary)?;
    Ok(path)
}

/// Writes every output of a normalized run: the text report, the JSON
/// summary, the twelve banana face files, and (when enabled) the photon
/// database files.
pub fn save_all(result: &RunResult, sim: &Simulation, dir: &Path) -> IoResult<()> {
    save_text_report(result, sim, dir)?;
    save_json_summary(result, sim, dir)?;
    result.banana.write_out_files(dir)?;
    result
        .banana
        .write_in_files(dir, &sim.source, &sim.detector, &sim.tissue)?;
    if sim.flags.photon_db {
        for (bin, records) in result.db_records.iter().enumerate() {
            let path = dir.join(format!("{}_hist{}", sim.output_name, bin));
            photondb::write_db_file(&path, &sim.tissue, records)?;
        }
    }
    Ok(())
}
