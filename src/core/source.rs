//! The collimated/focused source: beam profile sampling and the launch
//! direction cone set by the numerical aperture.

// std
use std::f64::consts::PI;
// others
use strum_macros::{Display, EnumString};
// pertmc
use crate::core::geometry::{Point3f, Vector3f};
use crate::core::pertmc::Float;
use crate::core::rng::Rng;

/// Beam profile, parsed from the single-letter code in the input file.
#[derive(Debug, Copy, Clone, PartialEq, Display, EnumString, Serialize, Deserialize)]
pub enum BeamType {
    #[strum(serialize = "f", serialize = "F")]
    Flat,
    #[strum(serialize = "g", serialize = "G")]
    Gaussian,
    #[strum(serialize = "r", serialize = "R")]
    RectangularFlat,
}

impl Default for BeamType {
    fn default() -> Self {
        BeamType::Flat
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDefinition {
    pub num_photons: usize,
    pub beam_type: BeamType,
    pub beam_radius: Float,
    pub beam_center_x: Float,
    pub src_na: Float,
    /// Half-extent of the rectangular beam along y (cm). The historic
    /// preset used 4.0.
    pub rect_half_y: Float,
}

impl Default for SourceDefinition {
    fn default() -> Self {
        SourceDefinition {
            num_photons: 0,
            beam_type: BeamType::Flat,
            beam_radius: 0.0,
            beam_center_x: 0.0,
            src_na: 0.0,
            rect_half_y: 4.0,
        }
    }
}

impl SourceDefinition {
    /// Samples the launch point on the surface and the launch direction.
    /// `n1` is the refractive index of the first tissue layer; the launch
    /// cone rejects directions whose sine exceeds NA/n1.
    pub fn sample(&self, n1: Float, rng: &mut Rng) -> (Point3f, Vector3f) {
        let mut p = Point3f::default();
        if self.beam_radius != 0.0 {
            let rn1 = rng.uniform_float();
            let rn2 = rng.uniform_float();
            let cos_rn2 = (2.0 * PI * rn2).cos();
            let sin_rn2 = (2.0 * PI * rn2).sin();
            match self.beam_type {
                BeamType::Flat => {
                    p.x = self.beam_radius * rn1.sqrt() * cos_rn2;
                    p.y = self.beam_radius * rn1.sqrt() * sin_rn2;
                }
                BeamType::RectangularFlat => {
                    p.x = self.beam_radius * (rn2 - 0.5) + self.beam_center_x;
                    p.y = rn1 * 2.0 * self.rect_half_y - self.rect_half_y;
                }
                BeamType::Gaussian => {
                    let mut rn1 = rn1;
                    if rn1 == 1.0 {
                        rn1 = rng.uniform_float();
                    }
                    let r = self.beam_radius * (-(1.0 - rn1).ln() / 2.0).sqrt();
                    p.x = r * cos_rn2;
                    p.y = r * sin_rn2;
                }
            }
        }
        p.z = 0.0;

        let theta = 2.0 * PI * rng.uniform_float();
        let u = if self.src_na == 0.0 {
            Vector3f { x: 0.0, y: 0.0, z: 1.0 }
        } else {
            let (cosp, sinp) = loop {
                let cosp = rng.uniform_float();
                let sinp = (1.0 - cosp * cosp).sqrt();
                if sinp <= self.src_na / n1 {
                    break (cosp, sinp);
                }
            };
            Vector3f {
                x: theta.cos() * sinp,
                y: theta.sin() * sinp,
                z: cosp,
            }
        };
        (p, u)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn beam_letters_parse() {
        assert_eq!(BeamType::from_str("f").unwrap(), BeamType::Flat);
        assert_eq!(BeamType::from_str("F").unwrap(), BeamType::Flat);
        assert_eq!(BeamType::from_str("g").unwrap(), BeamType::Gaussian);
        assert_eq!(BeamType::from_str("R").unwrap(), BeamType::RectangularFlat);
        assert!(BeamType::from_str("x").is_err());
    }

    #[test]
    fn pencil_beam_launches_straight_down() {
        let src = SourceDefinition {
            num_photons: 1,
            ..SourceDefinition::default()
        };
        let mut rng = Rng::new(1);
        for _ in 0..10 {
            let (p, u) = src.sample(1.4, &mut rng);
            assert_eq!((p.x, p.y, p.z), (0.0, 0.0, 0.0));
            assert_eq!((u.x, u.y, u.z), (0.0, 0.0, 1.0));
        }
    }

    #[test]
    fn flat_beam_stays_in_disk() {
        let src = SourceDefinition {
            beam_type: BeamType::Flat,
            beam_radius: 0.2,
            ..SourceDefinition::default()
        };
        let mut rng = Rng::new(1);
        for _ in 0..1000 {
            let (p, _) = src.sample(1.4, &mut rng);
            assert!((p.x * p.x + p.y * p.y).sqrt() <= 0.2 + 1e-12);
        }
    }

    #[test]
    fn na_cone_is_respected() {
        let src = SourceDefinition {
            src_na: 0.22,
            ..SourceDefinition::default()
        };
        let n1 = 1.4;
        let mut rng = Rng::new(1);
        for _ in 0..1000 {
            let (_, u) = src.sample(n1, &mut rng);
            let sin_theta = (u.x * u.x + u.y * u.y).sqrt();
            assert!(sin_theta <= src.src_na / n1 + 1e-12);
            assert!((u.length() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn rectangle_uses_configured_extent() {
        let src = SourceDefinition {
            beam_type: BeamType::RectangularFlat,
            beam_radius: 1.0,
            beam_center_x: 0.5,
            rect_half_y: 2.0,
            ..SourceDefinition::default()
        };
        let mut rng = Rng::new(1);
        for _ in 0..1000 {
            let (p, _) = src.sample(1.0, &mut rng);
            assert!(p.x >= 0.0 && p.x <= 1.0);
            assert!(p.y >= -2.0 && p.y <= 2.0);
        }
    }
}
