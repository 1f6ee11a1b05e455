//! Optional per-detector photon history database: every photon whose
//! terminal vertex lands inside a detector annulus contributes one binary
//! record to that detector's file. Downstream perturbation tooling replays
//! these records instead of the full simulation.

// std
use std::fs::File;
use std::io::{BufWriter, Result as IoResult, Write};
use std::path::Path;
// others
use byteorder::{LittleEndian, WriteBytesExt};
// pertmc
use crate::core::detector::DetectorDefinition;
use crate::core::pertmc::{Float, MAX_COORD};
use crate::core::photon::History;
use crate::core::tissue::TissueStack;

/// File magic for the photon database.
const MAGIC: &[u8; 8] = b"PMCHIST\x01";

/// One stored photon: collision statistics per layer plus the exit state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhotonRecord {
    pub total_collisions: u32,
    pub col_in_layer: Vec<u32>,
    pub pathlen_in_layer: Vec<Float>,
    pub cum_path_length: Float,
    pub exit_x: Float,
    pub exit_y: Float,
    pub exit_uz: Float,
}

/// Which detector annulus, if any, collects the photon's exit point.
/// Reflection-mode rings sit on the top surface, transmission-mode rings
/// on the bottom.
pub fn detector_bin(
    det: &DetectorDefinition,
    tissue: &TissueStack,
    x: Float,
    y: Float,
    z: Float,
) -> Option<usize> {
    let slab = tissue.slab_thickness();
    let on_top = z.abs() < 1.0e-9;
    let on_bottom = (z - slab).abs() < 1.0e-9;
    let on_surface = if det.reflect_flag { on_top } else { on_bottom };
    if !on_surface {
        return None;
    }
    for (i, &ctr) in det.det_ctr.iter().enumerate() {
        let rho = ((x - ctr) * (x - ctr) + y * y).sqrt();
        if rho <= det.det_rad {
            return Some(i);
        }
    }
    None
}

/// Builds the record for a terminated photon, or None when any history
/// coordinate ran away beyond the storable range.
pub fn make_record(hist: &History) -> Option<PhotonRecord> {
    for v in hist.vertices.iter() {
        if v.p.x.abs() >= MAX_COORD || v.p.y.abs() >= MAX_COORD || v.p.z.abs() >= MAX_COORD {
            return None;
        }
    }
    let boundary_cols = hist
        .vertices
        .iter()
        .filter(|v| v.boundary_col)
        .count() as u32;
    let last = hist.last();
    Some(PhotonRecord {
        total_collisions: hist.len() as u32 - boundary_cols,
        col_in_layer: hist.col_in_layer.clone(),
        pathlen_in_layer: hist.pathlen_in_layer.clone(),
        cum_path_length: hist.cum_path_length,
        exit_x: last.p.x,
        exit_y: last.p.y,
        exit_uz: last.u.z,
    })
}

/// Writes one detector bin's records: a header carrying the layer optics,
/// then the records back to back, all little-endian.
pub fn write_db_file(
    path: &Path,
    tissue: &TissueStack,
    records: &[PhotonRecord],
) -> IoResult<()> {
    let mut f = BufWriter::new(File::create(path)?);
    f.write_all(MAGIC)?;
    f.write_u32::<LittleEndian>(tissue.num_layers as u32)?;
    for i in 1..=tissue.num_layers {
        let l = &tissue.layers[i];
        f.write_f64::<LittleEndian>(l.n)?;
        f.write_f64::<LittleEndian>(l.mua)?;
        f.write_f64::<LittleEndian>(l.mus)?;
        f.write_f64::<LittleEndian>(l.g)?;
        f.write_f64::<LittleEndian>(l.d)?;
    }
    f.write_u64::<LittleEndian>(records.len() as u64)?;
    for rec in records {
        f.write_u32::<LittleEndian>(rec.total_collisions)?;
        for i in 1..=tissue.num_layers {
            f.write_u32::<LittleEndian>(rec.col_in_layer[i])?;
            f.write_f64::<LittleEndian>(rec.pathlen_in_layer[i])?;
        }
        f.write_f64::<LittleEndian>(rec.cum_path_length)?;
        f.write_f64::<LittleEndian>(rec.exit_x)?;
        f.write_f64::<LittleEndian>(rec.exit_y)?;
        f.write_f64::<LittleEndian>(rec.exit_uz)?;
    }
    f.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geometry::{Point3f, Vector3f};
    use crate::core::photon::TrackVertex;
    use crate::core::tissue::Layer;
    use crate::shapes::ellipsoid::Ellipsoid;

    fn tissue() -> TissueStack {
        TissueStack::new(
            1.0,
            vec![Layer {
                n: 1.4,
                mua: 1.0,
                mus: 9.0,
                g: 0.0,
                d: 1.0,
                ..Layer::default()
            }],
            1.0,
            Ellipsoid::default(),
            false,
        )
    }

    fn det() -> DetectorDefinition {
        let mut d = DetectorDefinition::new(2, 0.1, 4, 0.1, 2, 0.1, 2, 0.1, 4, 1.0);
        d.det_ctr = vec![0.1, 0.4];
        d.det_rad = 0.05;
        d
    }

    #[test]
    fn top_exit_bins_by_annulus() {
        let t = tissue();
        let d = det();
        assert_eq!(detector_bin(&d, &t, 0.12, 0.0, 0.0), Some(0));
        assert_eq!(detector_bin(&d, &t, 0.42, 0.0, 0.0), Some(1));
        assert_eq!(detector_bin(&d, &t, 0.25, 0.0, 0.0), None);
        // bottom exits are ignored in reflection mode
        assert_eq!(detector_bin(&d, &t, 0.1, 0.0, 1.0), None);
    }

    #[test]
    fn transmit_mode_uses_bottom_surface() {
        let t = tissue();
        let mut d = det();
        d.reflect_flag = false;
        assert_eq!(detector_bin(&d, &t, 0.1, 0.0, 1.0), Some(0));
        assert_eq!(detector_bin(&d, &t, 0.1, 0.0, 0.0), None);
    }

    #[test]
    fn runaway_photon_is_not_recorded() {
        let mut hist = History::with_layer_slots(3);
        hist.vertices.push(TrackVertex {
            p: Point3f { x: 31.0, y: 0.0, z: 0.0 },
            u: Vector3f { x: 0.0, y: 0.0, z: 1.0 },
            weight: 1.0,
            path_length: 0.0,
            boundary_col: false,
        });
        assert!(make_record(&hist).is_none());
    }

    #[test]
    fn record_counts_real_collisions() {
        let mut hist = History::with_layer_slots(3);
        for (z, bdry) in &[(0.0, false), (0.2, false), (0.0, true)] {
            hist.vertices.push(TrackVertex {
                p: Point3f { x: 0.0, y: 0.0, z: *z },
                u: Vector3f { x: 0.0, y: 0.0, z: -1.0 },
                weight: 1.0,
                path_length: 0.2,
                boundary_col: *bdry,
            });
        }
        hist.cum_path_length = 0.4;
        let rec = make_record(&hist).unwrap();
        assert_eq!(rec.total_collisions, 2);
        assert_eq!(rec.exit_uz, -1.0);
        assert!((rec.cum_path_length - 0.4).abs() < 1e-15);
    }

    #[test]
    fn db_file_round_trips_header() {
        use byteorder::{LittleEndian, ReadBytesExt};
        use std::io::Read;
        let dir = tempfile::tempdir().unwrap();
        let t = tissue();
        let rec = PhotonRecord {
            total_collisions: 3,
            col_in_layer: vec![0, 3, 0],
            pathlen_in_layer: vec![0.0, 0.5, 0.0],
            cum_path_length: 0.5,
            exit_x: 0.1,
            exit_y: 0.0,
            exit_uz: -0.9,
        };
        let path = dir.path().join("hist0");
        write_db_file(&path, &t, &[rec]).unwrap();
        let mut f = std::fs::File::open(&path).unwrap();
        let mut magic = [0u8; 8];
        f.read_exact(&mut magic).unwrap();
        assert_eq!(&magic, MAGIC);
        assert_eq!(f.read_u32::<LittleEndian>().unwrap(), 1);
        assert_eq!(f.read_f64::<LittleEndian>().unwrap(), 1.4);
    }
}
