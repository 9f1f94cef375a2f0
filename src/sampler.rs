//! Random bound sampling for partial sweeps.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Draws the random bounds that keep expiration sweeps partial: how many
/// shards a janitor pass visits, and how many index entries a shard sweep
/// examines.
pub(crate) trait Sampler: Send + Sync {
    /// Draw a value in `[0, bound)`. A zero bound yields zero.
    fn sample(&mut self, bound: usize) -> usize;
}

/// Production sampler seeded from OS entropy per instance.
pub(crate) struct EntropySampler {
    rng: SmallRng,
}

impl EntropySampler {
    pub(crate) fn new() -> Self {
        Self {
            rng: SmallRng::from_entropy(),
        }
    }
}

impl Sampler for EntropySampler {
    fn sample(&mut self, bound: usize) -> usize {
        if bound == 0 {
            return 0;
        }
        self.rng.gen_range(0..bound)
    }
}

/// Sampler that ignores the bound and always returns `usize::MAX`, turning
/// a partial sweep into a full one in tests.
#[cfg(test)]
pub(crate) struct MaxSampler;

#[cfg(test)]
impl Sampler for MaxSampler {
    fn sample(&mut self, _bound: usize) -> usize {
        usize::MAX
    }
}
