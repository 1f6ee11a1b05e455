//! Live packet state and the per-photon track history. The history is the
//! substrate for the banana accumulator and the photon database, so every
//! step endpoint lands here together with its boundary flag.

// pertmc
use crate::core::geometry::{Point3f, Vector3f};
use crate::core::pertmc::{Float, MAX_HISTORY_PTS};

/// One recorded track vertex.
#[derive(Debug, Default, Copy, Clone, Serialize, Deserialize)]
pub struct TrackVertex {
    pub p: Point3f,
    pub u: Vector3f,
    pub weight: Float,
    /// Euclidean distance from the predecessor vertex.
    pub path_length: Float,
    /// Set when the step producing this vertex ended on a boundary.
    pub boundary_col: bool,
}

/// Track history of a single photon plus the per-layer statistics the
/// photon database consumes. Reused across photons via `clear`.
#[derive(Debug, Default, Clone)]
pub struct History {
    pub vertices: Vec<TrackVertex>,
    pub cum_path_length: Float,
    /// Collision and path-length totals per layer index (the ellipsoid's
    /// slot included).
    pub col_in_layer: Vec<u32>,
    pub pathlen_in_layer: Vec<Float>,
}

impl History {
    pub fn with_layer_slots(num_slots: usize) -> Self {
        History {
            vertices: Vec::with_capacity(4096),
            cum_path_length: 0.0,
            col_in_layer: vec![0; num_slots],
            pathlen_in_layer: vec![0.0; num_slots],
        }
    }

    pub fn clear(&mut self) {
        self.vertices.clear();
        self.cum_path_length = 0.0;
        for c in self.col_in_layer.iter_mut() {
            *c = 0;
        }
        for p in self.pathlen_in_layer.iter_mut() {
            *p = 0.0;
        }
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// A photon about to outgrow the history is abandoned instead.
    pub fn is_saturated(&self) -> bool {
        self.vertices.len() >= MAX_HISTORY_PTS - 4
    }

    pub fn last(&self) -> &TrackVertex {
        self.vertices.last().unwrap()
    }

    pub fn last_mut(&mut self) -> &mut TrackVertex {
        self.vertices.last_mut().unwrap()
    }
}

/// Live photon packet state.
#[derive(Debug, Default, Clone)]
pub struct Photon {
    pub p: Point3f,
    pub u: Vector3f,
    /// Packet weight in (0, 1].
    pub w: Float,
    /// Current geometric step length (cm).
    pub s: Float,
    /// Remaining optical depth banked at the last boundary hit.
    pub sleft: Float,
    pub curr_layer: usize,
    pub hit_bdry: bool,
    pub dead: bool,
    pub rspec: Float,
}

impl Photon {
    /// Resets the packet at the source position with the launch direction
    /// and weight `1 - Rspec`, and seeds the history with the source
    /// vertex.
    pub fn launch(&mut self, p: Point3f, u: Vector3f, rspec: Float, hist: &mut History) {
        self.p = p;
        self.u = u;
        self.w = 1.0 - rspec;
        self.s = 0.0;
        self.sleft = 0.0;
        self.curr_layer = 1;
        self.hit_bdry = false;
        self.dead = false;
        self.rspec = rspec;
        hist.clear();
        hist.vertices.push(TrackVertex {
            p,
            u,
            weight: self.w,
            path_length: 0.0,
            boundary_col: false,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_seeds_history() {
        let mut photon = Photon::default();
        let mut hist = History::with_layer_slots(4);
        hist.col_in_layer[1] = 7;
        photon.launch(
            Point3f { x: 0.1, y: 0.0, z: 0.0 },
            Vector3f { x: 0.0, y: 0.0, z: 1.0 },
            0.04,
            &mut hist,
        );
        assert_eq!(hist.len(), 1);
        assert_eq!(hist.vertices[0].p.x, 0.1);
        assert!((photon.w - 0.96).abs() < 1e-15);
        assert_eq!(photon.curr_layer, 1);
        assert!(!photon.dead);
        assert_eq!(hist.col_in_layer[1], 0);
        assert_eq!(hist.vertices[0].path_length, 0.0);
    }

    #[test]
    fn saturation_boundary() {
        let mut hist = History::with_layer_slots(2);
        assert!(!hist.is_saturated());
        hist.vertices = vec![TrackVertex::default(); MAX_HISTORY_PTS - 4];
        assert!(hist.is_saturated());
    }
}
