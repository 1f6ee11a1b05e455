//! Shared scalar type, physical constants, and small numeric helpers used
//! throughout the simulator.

/// All transport arithmetic runs in double precision; the boundary
/// tie-break tolerances below are far below single precision.
pub type Float = f64;

/// Photon history capacity per packet; a packet that would exceed it is
/// abandoned with a warning.
pub const MAX_HISTORY_PTS: usize = 300_000;

/// Speed of light in cm/ps; time-resolved tallies bin in picoseconds.
pub const C_CM_PER_PS: Float = 0.03;

/// Layer count limit (tissue layers, excluding the two outside media).
pub const MAX_NUM_LAYERS: usize = 12;

/// Cosine below which incidence counts as grazing (90 degrees).
pub const COS_90_D: Float = 1.0e-6;

/// Cosine above which incidence counts as normal.
pub const COS_ZERO: Float = 1.0 - 1.0e-12;

/// Upper rejection bound for uniform samples feeding -ln().
pub const ONE: Float = 1.0 - 1.0e-12;

/// Direction-cosine floor for outbound voxel-face contributions.
pub const MU_LB: Float = 0.01;

/// Weight threshold and survival chance for (disabled by default) roulette.
pub const WEIGHT_LIMIT: Float = 1.0e-4;
pub const CHANCE: Float = 0.1;

/// Coordinates beyond this are considered runaway and excluded from the
/// photon database.
pub const MAX_COORD: Float = 30.0;

pub fn clamp_t<T>(val: T, low: T, high: T) -> T
where
    T: PartialOrd,
{
    if val < low {
        low
    } else if val > high {
        high
    } else {
        val
    }
}

/// Renders a float the way C's `%.*e` does: a sign-carrying exponent padded
/// to two digits, e.g. `1.0000e+00`. The report and the banana face files
/// are diffed against reference output, so the exponent form matters.
pub fn fmt_sci(v: Float, prec: usize) -> String {
    let s = format!("{:.*e}", prec, v);
    let e = s.find('e').unwrap();
    let (mantissa, exp) = s.split_at(e);
    let exp = &exp[1..];
    let (sign, digits) = match exp.strip_prefix('-') {
        Some(d) => ("-", d),
        None => ("+", exp),
    };
    format!("{}e{}{:0>2}", mantissa, sign, digits)
}

/// `%12.4E` of the scalar summary block.
pub fn fmt_sci_upper12(v: Float) -> String {
    format!("{:>12}", fmt_sci(v, 4).to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fmt_sci_matches_c_layout() {
        assert_eq!(fmt_sci(1.0, 4), "1.0000e+00");
        assert_eq!(fmt_sci(0.0, 4), "0.0000e+00");
        assert_eq!(fmt_sci(-0.0099, 4), "-9.9000e-03");
        assert_eq!(fmt_sci(12345.678, 4), "1.2346e+04");
        assert_eq!(fmt_sci(3.5e-112, 6), "3.500000e-112");
    }

    #[test]
    fn fmt_sci_upper_pads_to_twelve() {
        assert_eq!(fmt_sci_upper12(1.0), "  1.0000E+00");
        assert_eq!(fmt_sci_upper12(-1.0), " -1.0000E+00");
    }

    #[test]
    fn clamp_clamps() {
        assert_eq!(clamp_t(5, 0, 3), 3);
        assert_eq!(clamp_t(-1.0, 0.0, 3.0), 0.0);
        assert_eq!(clamp_t(2, 0, 3), 2);
    }
}
