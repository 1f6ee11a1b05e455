//! Interface physics and collision events: Fresnel reflection/refraction
//! at the planar interfaces, index-matched crossings of the ellipsoid
//! surface, and the absorption weighting schemes.

// pertmc
use crate::core::detector::{DetectorDefinition, Tallies};
use crate::core::pertmc::{Float, CHANCE, COS_90_D, COS_ZERO};
use crate::core::photon::{History, Photon};
use crate::core::rng::Rng;
use crate::core::sampling;
use crate::core::tissue::TissueStack;

/// How collisions remove weight from the packet.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub enum AbsWeighting {
    /// Deterministic weight drop `w·μa/μt` at every collision.
    Continuous,
    /// Survival lottery against the albedo; losers deposit everything.
    Analog,
}

impl Default for AbsWeighting {
    fn default() -> Self {
        AbsWeighting::Continuous
    }
}

/// Fresnel reflectance for unpolarized light crossing `n1 -> n2` with
/// incidence cosine `ci`, via the trig-identity form. Also yields the
/// refraction cosine for Snell's law. Degenerate branches: matched media
/// reflect nothing, normal incidence uses the index contrast alone, and
/// grazing incidence reflects everything.
pub fn fresnel(n1: Float, n2: Float, ci: Float) -> (Float, Float) {
    if n1 == n2 {
        (0.0, ci)
    } else if ci > COS_ZERO {
        let r = (n2 - n1) * (n2 - n1) / ((n2 + n1) * (n2 + n1));
        (r, ci)
    } else if ci < COS_90_D {
        (1.0, 0.0)
    } else {
        let si = (1.0 - ci * ci).sqrt();
        let st = n1 / n2 * si;
        let ct = (1.0 - st * st).sqrt();
        let sd = si * ct - ci * st;
        let ss = si * ct + ci * st;
        let cd = ci * ct + si * st;
        let cs = ci * ct - si * st;
        let r = 0.5 * (sd * sd / (ss * ss) + sd * sd * cs * cs / (cd * cd * ss * ss));
        (r, ct)
    }
}

fn cross_down(
    photon: &mut Photon,
    tissue: &TissueStack,
    det: &DetectorDefinition,
    tallies: &mut Tallies,
    rng: &mut Rng,
) {
    let curr_layer = photon.curr_layer;
    let uz = photon.u.z;
    let n_curr = tissue.layers[curr_layer].n;
    let n_next = tissue.layers[curr_layer + 1].n;

    let coscrit = if n_curr > n_next {
        (1.0 - (n_next / n_curr) * (n_next / n_curr)).sqrt()
    } else {
        0.0
    };

    let (r, uz_snell) = if uz <= coscrit {
        (1.0, 0.0)
    } else {
        fresnel(n_curr, n_next, uz)
    };

    if rng.uniform_float() > r {
        // transmitted
        photon.u.x *= n_curr / n_next;
        photon.u.y *= n_curr / n_next;
        photon.u.z = uz_snell;
        if curr_layer == tissue.num_layers {
            // out the bottom, all-or-none
            tallies.record_transmission(det, photon.p.x, photon.p.y, photon.u.z, photon.w, 0.0);
            photon.w = 0.0;
            photon.dead = true;
        } else {
            photon.curr_layer += 1;
        }
    } else {
        photon.u.z = -uz;
    }
}

fn cross_up(
    photon: &mut Photon,
    tissue: &TissueStack,
    det: &DetectorDefinition,
    tallies: &mut Tallies,
    hist: &History,
    rng: &mut Rng,
) {
    let curr_layer = photon.curr_layer;
    let uz = photon.u.z;
    let n_curr = tissue.layers[curr_layer].n;
    let n_next = tissue.layers[curr_layer - 1].n;

    let coscrit = if n_curr > n_next {
        (1.0 - (n_next / n_curr) * (n_next / n_curr)).sqrt()
    } else {
        0.0
    };

    let (r, uz_snell) = if -uz <= coscrit {
        (1.0, 0.0)
    } else {
        fresnel(n_curr, n_next, -uz)
    };

    if rng.uniform_float() > r {
        if curr_layer == 1 {
            // out the top; the refracted exterior direction sets the
            // angular bin
            photon.u.x *= n_curr / n_next;
            photon.u.y *= n_curr / n_next;
            photon.u.z = uz_snell;
            tallies.record_reflection(
                det,
                photon.p.x,
                photon.p.y,
                photon.u.z,
                photon.w,
                0.0,
                hist.cum_path_length,
                tissue.layers[1].n,
            );
            photon.w = 0.0;
            photon.dead = true;
        } else {
            photon.curr_layer -= 1;
            photon.u.x *= n_curr / n_next;
            photon.u.y *= n_curr / n_next;
            photon.u.z = -uz_snell;
        }
    } else {
        photon.u.z = -uz;
    }
}

/// Dispatch on the travel direction at a planar interface of the current
/// layer.
pub fn cross_layer(
    photon: &mut Photon,
    tissue: &TissueStack,
    det: &DetectorDefinition,
    tallies: &mut Tallies,
    hist: &History,
    rng: &mut Rng,
) {
    if photon.u.z < 0.0 {
        cross_up(photon, tissue, det, tallies, hist, rng);
    } else {
        cross_down(photon, tissue, det, tallies, rng);
    }
}

/// Crossing the ellipsoid surface: the index is matched to the host layer,
/// so there is no Fresnel event and no weight change; only the optics
/// toggle.
pub fn cross_ellipsoid(photon: &mut Photon, tissue: &TissueStack) {
    if photon.curr_layer == tissue.ellipsoid_index {
        photon.curr_layer = tissue.ellipsoid_host;
    } else {
        photon.curr_layer = tissue.ellipsoid_index;
    }
}

/// Deposits absorbed weight at a collision site. Pseudocollisions (steps
/// cut short by a boundary, recognizable by a banked `sleft`) deposit
/// nothing. In analog mode the caller has already lost the survival
/// lottery, so the whole packet is deposited and the photon dies.
pub fn absorb(
    photon: &mut Photon,
    tissue: &TissueStack,
    det: &DetectorDefinition,
    tallies: &mut Tallies,
    hist: &mut History,
    weighting: AbsWeighting,
) {
    if photon.sleft != 0.0 {
        return;
    }
    let props = tissue.properties_at(photon.curr_layer);
    let dw = match weighting {
        AbsWeighting::Continuous => photon.w * props.mua / props.mut_total(),
        AbsWeighting::Analog => photon.w,
    };
    photon.w -= dw;
    tallies.record_absorption(
        det,
        photon.p.x,
        photon.p.y,
        photon.p.z,
        photon.curr_layer,
        dw,
    );
    hist.last_mut().weight = photon.w;
    if weighting == AbsWeighting::Analog {
        photon.dead = true;
    }
}

/// Analog collision: survive-and-scatter with probability `albedo`,
/// otherwise absorb everything.
pub fn scatter_or_absorb(
    photon: &mut Photon,
    tissue: &TissueStack,
    det: &DetectorDefinition,
    tallies: &mut Tallies,
    hist: &mut History,
    rng: &mut Rng,
) {
    let albedo = tissue.properties_at(photon.curr_layer).albedo;
    if rng.uniform_float() < albedo {
        let g = tissue.properties_at(photon.curr_layer).g;
        sampling::scatter(&mut photon.u, g, rng);
    } else {
        absorb(photon, tissue, det, tallies, hist, AbsWeighting::Analog);
    }
}

/// Russian roulette; wired behind a flag and off in the base design.
pub fn roulette(photon: &mut Photon, rng: &mut Rng) {
    if photon.w == 0.0 {
        photon.dead = true;
    } else if rng.uniform_float() < CHANCE {
        photon.w /= CHANCE;
    } else {
        photon.dead = true;
    }
}

/// Terminates packets whose history is about to saturate.
pub fn test_weight(photon: &mut Photon, hist: &History, tallies: &mut Tallies) {
    if hist.is_saturated() {
        photon.dead = true;
        tallies.history_overflows += 1;
        eprintln!("WARNING: history capacity reached, abandoning this photon");
    }
}
