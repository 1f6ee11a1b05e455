//! Detector binning and the tally arrays filled during the photon loop.
//! All tallies are write-only while photons run and are scaled once at the
//! end of the run.

// std
use std::f64::consts::PI;
// pertmc
use crate::core::pertmc::{clamp_t, Float, C_CM_PER_PS};
use crate::core::tensor::Matrix;

/// Bin geometry for every tally dimension plus the physical detector ring
/// consumed by the photon database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorDefinition {
    pub nr: usize,
    pub dr: Float,
    pub nz: usize,
    pub dz: Float,
    pub na: usize,
    pub da: Float,
    pub nt: usize,
    pub dt: Float,
    pub nx: usize,
    pub dx: Float,
    pub ny: usize,
    pub dy: Float,
    /// true: the detector ring collects reflected photons, false:
    /// transmitted ones.
    pub reflect_flag: bool,
    pub det_ctr: Vec<Float>,
    pub det_rad: Float,
}

impl DetectorDefinition {
    pub fn new(
        nr: usize,
        dr: Float,
        nz: usize,
        dz: Float,
        nx: usize,
        dx: Float,
        ny: usize,
        dy: Float,
        nt: usize,
        dt: Float,
    ) -> Self {
        let mut det = DetectorDefinition {
            nr,
            dr,
            nz,
            dz,
            na: 0,
            da: 0.0,
            nt,
            dt,
            nx,
            dx,
            ny,
            dy,
            reflect_flag: true,
            det_ctr: Vec::new(),
            det_rad: 0.0,
        };
        det.set_na(1);
        det
    }

    /// The angular dimension defaults to fully integrated (one bin over
    /// the quarter circle); `da` always tracks `na`.
    pub fn set_na(&mut self, na: usize) {
        self.na = na;
        self.da = (PI / 2.0) / na as Float;
    }

    pub fn radial_bin(&self, x: Float, y: Float) -> usize {
        clamp_t(((x * x + y * y).sqrt() / self.dr) as usize, 0, self.nr - 1)
    }

    pub fn angular_bin(&self, uz: Float) -> usize {
        clamp_t((uz.acos() / self.da) as usize, 0, self.na - 1)
    }

    pub fn depth_bin(&self, z: Float) -> usize {
        clamp_t((z / self.dz) as usize, 0, self.nz - 1)
    }
}

/// Every accumulator of the run besides the banana. Per-worker copies are
/// merged in worker order after the loop.
#[derive(Debug, Default, Clone)]
pub struct Tallies {
    pub a_rz: Matrix<Float>,
    pub a_z: Vec<Float>,
    pub a_layer: Vec<Float>,
    pub atot: Float,
    pub flu_rz: Matrix<Float>,
    pub flu_z: Vec<Float>,
    pub r_ra: Matrix<Float>,
    pub r_r: Vec<Float>,
    pub r_r2: Vec<Float>,
    pub r_a: Vec<Float>,
    pub r_rt: Matrix<Float>,
    pub r_xy: Matrix<Float>,
    pub t_ra: Matrix<Float>,
    pub t_r: Vec<Float>,
    pub t_a: Vec<Float>,
    pub rd: Float,
    pub rtot: Float,
    pub td: Float,
    /// Photons that left through the top/bottom surface.
    pub tot_out_top: u64,
    pub tot_out_bot: u64,
    /// Numeric-degenerate event counters.
    pub history_overflows: u64,
    pub banana_dead_walks: u64,
}

impl Tallies {
    pub fn new(det: &DetectorDefinition, num_layer_slots: usize) -> Self {
        Tallies {
            a_rz: Matrix::zeros(det.nr, det.nz),
            a_z: vec![0.0; det.nz],
            a_layer: vec![0.0; num_layer_slots],
            atot: 0.0,
            flu_rz: Matrix::zeros(det.nr, det.nz),
            flu_z: vec![0.0; det.nz],
            r_ra: Matrix::zeros(det.nr, det.na),
            r_r: vec![0.0; det.nr],
            r_r2: vec![0.0; det.nr],
            r_a: vec![0.0; det.na],
            r_rt: Matrix::zeros(det.nr, det.nt),
            r_xy: Matrix::zeros(2 * det.nx, 2 * det.ny),
            t_ra: Matrix::zeros(det.nr, det.na),
            t_r: vec![0.0; det.nr],
            t_a: vec![0.0; det.na],
            rd: 0.0,
            rtot: 0.0,
            td: 0.0,
            tot_out_top: 0,
            tot_out_bot: 0,
            history_overflows: 0,
            banana_dead_walks: 0,
        }
    }

    /// Escape through the top surface. `r` is the residual internal
    /// reflectance (zero for the all-or-none crossing decision), `n1` the
    /// index of the first layer, which sets the in-medium speed for the
    /// time bin.
    pub fn record_reflection(
        &mut self,
        det: &DetectorDefinition,
        x: Float,
        y: Float,
        uz: Float,
        w: Float,
        r: Float,
        cum_path_length: Float,
        n1: Float,
    ) {
        let ir = det.radial_bin(x, y);
        let ia = det.angular_bin(uz);
        let amt_out = (1.0 - r) * w;
        self.r_r[ir] += amt_out;
        self.r_ra[(ir, ia)] += amt_out;
        self.r_r2[ir] += amt_out * amt_out;

        // time of flight in ps at the in-medium speed; out-of-range times
        // are discarded from R(r,t) only
        let t_delay = cum_path_length / (C_CM_PER_PS / n1);
        let it = (t_delay / det.dt).floor();
        if it >= 0.0 && (it as usize) < det.nt {
            self.r_rt[(ir, it as usize)] += amt_out;
        }

        // Cartesian reflectance on the offset grid; escapes outside the
        // grid are discarded
        let ix = ((x + det.nx as Float * det.dx) / det.dx).floor();
        let iy = ((y + det.ny as Float * det.dy) / det.dy).floor();
        if ix >= 0.0
            && (ix as usize) < 2 * det.nx
            && iy >= 0.0
            && (iy as usize) < 2 * det.ny
        {
            self.r_xy[(ix as usize, iy as usize)] += amt_out;
        }
        self.tot_out_top += 1;
    }

    /// Escape through the bottom surface.
    pub fn record_transmission(
        &mut self,
        det: &DetectorDefinition,
        x: Float,
        y: Float,
        uz: Float,
        w: Float,
        r: Float,
    ) {
        let ir = det.radial_bin(x, y);
        let ia = det.angular_bin(uz);
        self.t_ra[(ir, ia)] += (1.0 - r) * w;
        self.tot_out_bot += 1;
    }

    /// Continuous-mode absorption deposit.
    pub fn record_absorption(
        &mut self,
        det: &DetectorDefinition,
        x: Float,
        y: Float,
        z: Float,
        curr_layer: usize,
        dw: Float,
    ) {
        let ir = det.radial_bin(x, y);
        let iz = det.depth_bin(z);
        self.a_layer[curr_layer] += dw;
        self.a_rz[(ir, iz)] += dw;
    }

    pub fn merge(&mut self, other: &Tallies) {
        self.a_rz.merge(&other.a_rz);
        for (a, b) in self.a_z.iter_mut().zip(other.a_z.iter()) {
            *a += *b;
        }
        for (a, b) in self.a_layer.iter_mut().zip(other.a_layer.iter()) {
            *a += *b;
        }
        self.flu_rz.merge(&other.flu_rz);
        for (a, b) in self.flu_z.iter_mut().zip(other.flu_z.iter()) {
            *a += *b;
        }
        self.r_ra.merge(&other.r_ra);
        for (a, b) in self.r_r.iter_mut().zip(other.r_r.iter()) {
            *a += *b;
        }
        for (a, b) in self.r_r2.iter_mut().zip(other.r_r2.iter()) {
            *a += *b;
        }
        for (a, b) in self.r_a.iter_mut().zip(other.r_a.iter()) {
            *a += *b;
        }
        self.r_rt.merge(&other.r_rt);
        self.r_xy.merge(&other.r_xy);
        self.t_ra.merge(&other.t_ra);
        for (a, b) in self.t_r.iter_mut().zip(other.t_r.iter()) {
            *a += *b;
        }
        for (a, b) in self.t_a.iter_mut().zip(other.t_a.iter()) {
            *a += *b;
        }
        self.tot_out_top += other.tot_out_top;
        self.tot_out_bot += other.tot_out_bot;
        self.history_overflows += other.history_overflows;
        self.banana_dead_walks += other.banana_dead_walks;
    }
}
