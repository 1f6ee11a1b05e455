//! The step engine: optical-depth step sampling, arbitration between the
//! planar layer interfaces and the ellipsoid surface, and packet motion
//! with history recording.

// pertmc
use crate::core::pertmc::{Float, COS_90_D, ONE};
use crate::core::photon::{History, Photon, TrackVertex};
use crate::core::rng::Rng;
use crate::core::tissue::TissueStack;
use crate::shapes::ellipsoid::EllipsoidState;

/// Outcome of the boundary arbitration for one sampled step.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum BoundaryHit {
    /// Free flight: the step ends with a collision inside the medium.
    None,
    /// The step is cut by a planar interface of the current layer.
    Layer,
    /// The step is cut by the ellipsoid surface from outside.
    EllipsoidEnter,
    /// The step is cut by the ellipsoid surface from inside.
    EllipsoidExit,
}

/// Samples the geometric step for the current layer: a fresh exponential
/// optical depth, or the remainder banked at the last boundary hit.
pub fn set_step_size(photon: &mut Photon, tissue: &TissueStack, rng: &mut Rng) {
    let props = tissue.properties_at(photon.curr_layer);
    let mut_t = props.mut_total();
    if photon.sleft == 0.0 {
        let rn = loop {
            let rn = rng.uniform_float();
            if rn > 0.0 && rn <= ONE {
                break rn;
            }
        };
        photon.s = -rn.ln() / mut_t;
    } else {
        photon.s = photon.sleft / mut_t;
        photon.sleft = 0.0;
    }
}

/// Decides which boundary, if any, terminates the sampled step.
///
/// The planar interfaces of the current geometric layer are tested first
/// and truncate the step; the ellipsoid may then override if its crossing
/// is strictly nearer. On any hit the unspent optical depth is banked in
/// `sleft` so the next step resumes with the correct exponential law in
/// the next medium.
pub fn hit_boundary(photon: &mut Photon, tissue: &TissueStack) -> BoundaryHit {
    let s_sampled = photon.s;
    let mut s = s_sampled;
    let mut hit = BoundaryHit::None;

    let geom = tissue.geometric_layer(photon.curr_layer);
    let layer = &tissue.layers[geom];
    let uz = photon.u.z;
    // grazing incidence scatters instead of crossing
    if uz.abs() >= COS_90_D {
        let dbound: Float = if uz < 0.0 {
            (layer.zbegin - photon.p.z) / uz
        } else {
            (layer.zend - photon.p.z) / uz
        };
        if s > dbound {
            hit = BoundaryHit::Layer;
            s = dbound;
        }
    }

    if tissue.ellipsoid_present && !tissue.ellipsoid.is_absent() {
        let p1 = photon.p;
        let p2 = photon.p + photon.u * s;
        if p2.z >= 0.0 && p2.z <= tissue.slab_thickness() {
            let one_in = tissue.ellipsoid.classify(&p1);
            let two_in = tissue.ellipsoid.classify(&p2);
            let segment_inside = (one_in == EllipsoidState::Inside
                || one_in == EllipsoidState::OnSurface)
                && two_in == EllipsoidState::Inside;
            if segment_inside {
                // free flight wholly inside the inhomogeneity
                hit = BoundaryHit::None;
            } else if let Some(root) = tissue.ellipsoid.segment_intersection(&p1, &p2) {
                let d_e = root * (p2 - p1).length();
                if d_e < s {
                    s = d_e;
                    hit = if photon.curr_layer == tissue.ellipsoid_index {
                        BoundaryHit::EllipsoidExit
                    } else {
                        BoundaryHit::EllipsoidEnter
                    };
                }
            }
        }
    }

    if hit != BoundaryHit::None {
        let props = tissue.properties_at(photon.curr_layer);
        photon.sleft = (s_sampled - s) * props.mut_total();
        photon.s = s;
        photon.hit_bdry = true;
    }
    hit
}

/// Advances the packet by the arbitrated step and records the new vertex.
/// The per-layer path and collision statistics feed the photon database.
pub fn move_photon(photon: &mut Photon, hist: &mut History) {
    photon.p = photon.p + photon.u * photon.s;

    let prev = *hist.last();
    let boundary_col = photon.hit_bdry;
    photon.hit_bdry = false;
    let path_length = (photon.p - prev.p).length();

    hist.vertices.push(TrackVertex {
        p: photon.p,
        u: photon.u,
        weight: photon.w,
        path_length,
        boundary_col,
    });
    hist.cum_path_length += path_length;
    hist.pathlen_in_layer[photon.curr_layer] += path_length;
    if !boundary_col {
        hist.col_in_layer[photon.curr_layer] += 1;
    }
}
