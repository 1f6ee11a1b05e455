//! Uniform random numbers from the subtractive-lag generator of Knuth
//! (the `ran3` of Numerical Recipes). Deterministic for a given seed; the
//! simulation contract only asks for uniformity and reproducibility, and
//! the tests assert exactly that.

// std
use std::time::{SystemTime, UNIX_EPOCH};

const MBIG: i64 = 1_000_000_000;
const MSEED: i64 = 161_803_398;
const FAC: f64 = 1.0e-9;

/// How a run picks its base seed: 0 selects the fixed reproducible seed,
/// anything else derives one from wall-clock time.
pub fn resolve_seed(seed_flag: i32) -> u32 {
    if seed_flag == 0 {
        1
    } else {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        // 16-bit wall-clock seed, never 0 so it cannot collide with the
        // reproducible stream
        ((secs % (1 << 15)) as u32) + 2
    }
}

#[derive(Debug, Clone)]
pub struct Rng {
    ma: [i64; 56],
    inext: usize,
    inextp: usize,
}

impl Rng {
    pub fn new(seed: u32) -> Self {
        let mut ma = [0_i64; 56];
        let mut mj = (MSEED - i64::from(seed)) % MBIG;
        if mj < 0 {
            mj += MBIG;
        }
        ma[55] = mj;
        let mut mk: i64 = 1;
        for i in 1..=54 {
            let ii = (21 * i) % 55;
            ma[ii] = mk;
            mk = mj - mk;
            if mk < 0 {
                mk += MBIG;
            }
            mj = ma[ii];
        }
        for _ in 0..4 {
            for i in 1..=55 {
                ma[i] -= ma[1 + (i + 30) % 55];
                if ma[i] < 0 {
                    ma[i] += MBIG;
                }
            }
        }
        Rng {
            ma,
            inext: 0,
            inextp: 31,
        }
    }

    /// Next uniform sample in [0, 1). Callers that feed a logarithm reject
    /// zero themselves, as the step sampler does.
    pub fn uniform_float(&mut self) -> f64 {
        self.inext += 1;
        if self.inext == 56 {
            self.inext = 1;
        }
        self.inextp += 1;
        if self.inextp == 56 {
            self.inextp = 1;
        }
        let mut mj = self.ma[self.inext] - self.ma[self.inextp];
        if mj < 0 {
            mj += MBIG;
        }
        self.ma[self.inext] = mj;
        mj as f64 * FAC
    }
}
