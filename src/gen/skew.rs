use rand::seq::SliceRandom;
use rand::Rng;

/// Samples indices from a finite set of size `n` with a Pareto-shaped skew:
/// low indices are hot, the tail is long. Rejection-samples until the draw
/// lands inside the set.
#[derive(Debug, Clone, Copy)]
pub struct ParetoIndex {
    shape: f64,
}

impl ParetoIndex {
    pub fn new(shape: f64) -> Self {
        Self { shape }
    }

    pub fn sample(&self, rng: &mut impl Rng, n: usize) -> usize {
        debug_assert!(n > 0);
        loop {
            // Lomax (Pareto II) draw via inverse transform.
            let u: f64 = rng.gen();
            let draw = (1.0 - u).powf(-1.0 / self.shape) - 1.0;
            let idx = (n as f64 * draw / self.shape) as usize;
            if idx < n {
                return idx;
            }
        }
    }
}

impl Default for ParetoIndex {
    fn default() -> Self {
        Self::new(3.0)
    }
}

/// A fixed permutation on `0..n`. Applied on top of the skewed sampler so
/// the hot set is spread across the id space instead of clustering at zero.
#[derive(Debug, Clone)]
pub struct Genericize {
    mapping: Vec<u32>,
}

impl Genericize {
    pub fn new(rng: &mut impl Rng, n: u32) -> Self {
        let mut mapping: Vec<u32> = (0..n).collect();
        mapping.shuffle(rng);
        Self { mapping }
    }

    pub fn apply(&self, idx: usize) -> u32 {
        self.mapping[idx]
    }
}
