use rand::Rng;
use rand_distr::{Distribution, Normal};

use super::error::{Result, SimulationError};

/// Normal distribution of one year's portfolio return, in percent.
#[derive(Debug, Clone, Copy)]
pub struct AnnualReturnSampler {
    normal: Normal<f64>,
}

impl AnnualReturnSampler {
    pub fn new(mean: f64, std_dev: f64) -> Result<Self> {
        if !mean.is_finite() || !std_dev.is_finite() || std_dev < 0.0 {
            return Err(SimulationError::InvalidDistribution { mean, std_dev });
        }
        Normal::new(mean, std_dev)
            .map(|normal| Self { normal })
            .map_err(|_| SimulationError::InvalidDistribution { mean, std_dev })
    }

    pub fn mean(&self) -> f64 {
        self.normal.mean()
    }

    pub fn std_dev(&self) -> f64 {
        self.normal.std_dev()
    }

    /// Unbounded draw; values below -100% are possible and callers clamp the
    /// resulting balance rather than the return.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        if self.normal.std_dev() == 0.0 {
            return self.normal.mean();
        }
        self.normal.sample(rng)
    }
}

pub(crate) fn derive_path_seed(run_seed: u64, path_index: u32) -> u64 {
    let mixed = run_seed ^ ((path_index as u64) << 32) ^ path_index as u64;
    splitmix64(mixed)
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}
