//! Draw random samples for the scattering phase function and rotate the
//! propagation direction.

// std
use std::f64::consts::PI;
// pertmc
use crate::core::geometry::Vector3f;
use crate::core::pertmc::Float;
use crate::core::rng::Rng;

/// Cosine of the polar scattering angle from the Henyey-Greenstein phase
/// function with anisotropy `g`; isotropic when `g` is zero. The result is
/// clamped to [-1, 1] against roundoff in the inversion.
pub fn sample_hg(g: Float, rng: &mut Rng) -> Float {
    if g == 0.0 {
        2.0 * rng.uniform_float() - 1.0
    } else {
        let temp = (1.0 - g * g) / (1.0 - g + 2.0 * g * rng.uniform_float());
        let mut cost = (1.0 + g * g - temp * temp) / (2.0 * g);
        if cost < -1.0 {
            cost = -1.0;
        } else if cost > 1.0 {
            cost = 1.0;
        }
        cost
    }
}

/// Rotates direction `u` by polar cosine `cost` and azimuth `psi` about
/// itself. The frame degenerates to direct assignment near the poles
/// (|uz| > 1 - 1e-10) where the transverse frame is singular.
pub fn spin(u: &Vector3f, cost: Float, psi: Float) -> Vector3f {
    let sint = (1.0 - cost * cost).sqrt();
    let cosp = psi.cos();
    let sinp = psi.sin();
    if u.z.abs() > 1.0 - 1.0e-10 {
        Vector3f {
            x: sint * cosp,
            y: sint * sinp,
            z: cost * u.z / u.z.abs(),
        }
    } else {
        let temp = (1.0 - u.z * u.z).sqrt();
        Vector3f {
            x: sint * (u.x * u.z * cosp - u.y * sinp) / temp + u.x * cost,
            y: sint * (u.y * u.z * cosp + u.x * sinp) / temp + u.y * cost,
            z: -sint * cosp * temp + u.z * cost,
        }
    }
}

/// One full scattering event: sample the deflection and azimuth for the
/// layer anisotropy `g` and rotate the direction in place.
pub fn scatter(u: &mut Vector3f, g: Float, rng: &mut Rng) {
    let cost = sample_hg(g, rng);
    let psi = 2.0 * PI * rng.uniform_float();
    *u = spin(u, cost, psi);
}
