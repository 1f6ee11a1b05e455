//! The embedded ellipsoidal inhomogeneity. Classification and segment
//! intersection are formed in the unit-sphere frame of the ellipsoid; the
//! root selection rules below are load-bearing for both transport and the
//! banana walker and must not be "simplified".

// others
use smallvec::SmallVec;
// pertmc
use crate::core::geometry::{pnt3_lerp, Point3f};
use crate::core::pertmc::Float;

/// Classification tolerance on the quadratic form.
const SURFACE_TOL: Float = 1.0e-11;

/// A segment starting on the surface discards the trivial re-intersection
/// below this parameter value.
const ROOT_TOL: Float = 1.0e-10;

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum EllipsoidState {
    /// No ellipsoid: some radius is zero, geometry is skipped entirely.
    Absent,
    Outside,
    Inside,
    OnSurface,
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ellipsoid {
    pub center: Point3f,
    pub rx: Float,
    pub ry: Float,
    pub rz: Float,
}

impl Ellipsoid {
    pub fn new(ex: Float, ey: Float, ez: Float, rx: Float, ry: Float, rz: Float) -> Self {
        Ellipsoid {
            center: Point3f { x: ex, y: ey, z: ez },
            rx,
            ry,
            rz,
        }
    }

    pub fn is_absent(&self) -> bool {
        self.rx == 0.0 || self.ry == 0.0 || self.rz == 0.0
    }

    /// Classifies a point against the surface with tolerance 1e-11 on the
    /// quadratic form.
    pub fn classify(&self, p: &Point3f) -> EllipsoidState {
        if self.is_absent() {
            return EllipsoidState::Absent;
        }
        let dx = (p.x - self.center.x) / self.rx;
        let dy = (p.y - self.center.y) / self.ry;
        let dz = (p.z - self.center.z) / self.rz;
        let q = dx * dx + dy * dy + dz * dz;
        if q < 1.0 - SURFACE_TOL {
            EllipsoidState::Inside
        } else if q > 1.0 + SURFACE_TOL {
            EllipsoidState::Outside
        } else {
            EllipsoidState::OnSurface
        }
    }

    /// Real roots of the segment/surface quadratic restricted to the open
    /// unit interval, ascending. Zero, one, or two entries.
    pub fn segment_roots(&self, p1: &Point3f, p2: &Point3f) -> SmallVec<[Float; 2]> {
        let mut roots: SmallVec<[Float; 2]> = SmallVec::new();
        if self.is_absent() {
            return roots;
        }
        let ex = self.center.x;
        let ey = self.center.y;
        let ez = self.center.z;
        let rx2 = self.rx * self.rx;
        let ry2 = self.ry * self.ry;
        let rz2 = self.rz * self.rz;
        let a = (p2.x - p1.x) * (p2.x - p1.x) / rx2
            + (p2.y - p1.y) * (p2.y - p1.y) / ry2
            + (p2.z - p1.z) * (p2.z - p1.z) / rz2;
        let b = 2.0 * (p2.x - p1.x) * (p1.x - ex) / rx2
            + 2.0 * (p2.y - p1.y) * (p1.y - ey) / ry2
            + 2.0 * (p2.z - p1.z) * (p1.z - ez) / rz2;
        let c = (p1.x - ex) * (p1.x - ex) / rx2
            + (p1.y - ey) * (p1.y - ey) / ry2
            + (p1.z - ez) * (p1.z - ez) / rz2
            - 1.0;
        let disc = b * b - 4.0 * a * c;
        if disc <= 0.0 {
            return roots;
        }
        let sq = disc.sqrt();
        let root1 = (-b - sq) / (2.0 * a);
        let root2 = (-b + sq) / (2.0 * a);
        if root1 > 0.0 && root1 < 1.0 {
            roots.push(root1);
        }
        if root2 > 0.0 && root2 < 1.0 {
            roots.push(root2);
        }
        roots
    }

    /// The admissible crossing parameter for a segment, applying the
    /// tie-break table:
    ///
    /// - one root: discarded when the start is on-surface and the root is
    ///   the trivial one (|s| < 1e-10);
    /// - two roots: the nearer, unless the start is on-surface, in which
    ///   case the farther (the segment is leaving through the far side).
    pub fn segment_intersection(&self, p1: &Point3f, p2: &Point3f) -> Option<Float> {
        let roots = self.segment_roots(p1, p2);
        let start = self.classify(p1);
        match roots.len() {
            0 => None,
            1 => {
                let root = roots[0];
                if start == EllipsoidState::OnSurface && root.abs() < ROOT_TOL {
                    None
                } else {
                    Some(root)
                }
            }
            _ => {
                if start == EllipsoidState::OnSurface {
                    Some(roots[1])
                } else {
                    Some(roots[0])
                }
            }
        }
    }

    /// Point on the segment at crossing parameter `s`.
    pub fn crossing_point(&self, p1: &Point3f, p2: &Point3f, s: Float) -> Point3f {
        pnt3_lerp(p1, p2, s)
    }

    /// Portion of the segment length lying inside the ellipsoid; used by
    /// downstream perturbation tooling and exercised by the tests to pin
    /// the root geometry.
    pub fn segment_length_inside(&self, p1: &Point3f, p2: &Point3f) -> Float {
        let full = crate::core::geometry::pnt3_distance(p1, p2);
        let one_in = self.classify(p1);
        let two_in = self.classify(p2);
        if one_in == EllipsoidState::Absent {
            return full;
        }
        // neither endpoint outside means the whole segment is interior
        if one_in != EllipsoidState::Outside && two_in != EllipsoidState::Outside {
            return full;
        }
        let roots = self.segment_roots(p1, p2);
        match roots.len() {
            1 => {
                let crossing = pnt3_lerp(p1, p2, roots[0]);
                if one_in == EllipsoidState::Inside {
                    crate::core::geometry::pnt3_distance(p1, &crossing)
                } else {
                    crate::core::geometry::pnt3_distance(&crossing, p2)
                }
            }
            2 => {
                let from = pnt3_lerp(p1, p2, roots[0]);
                let to = pnt3_lerp(p1, p2, roots[1]);
                crate::core::geometry::pnt3_distance(&from, &to)
            }
            _ => 0.0,
        }
    }
}
