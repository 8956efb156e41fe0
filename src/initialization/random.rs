use ndarray::{ArrayD, IxDyn};
use ndarray_rand::RandomExt;
use rand::{SeedableRng, rngs::StdRng};
use rand_distr::Normal;

use super::Initializer;
use crate::Result;

/// An initializer sampling every slot element from a normal distribution.
pub struct NormalInitializer {
    rng: StdRng,
    distribution: Normal<f32>,
}

impl NormalInitializer {
    /// Creates a new `NormalInitializer`.
    ///
    /// # Arguments
    /// * `rng` - A random number generator.
    /// * `mean` - The mean of the distribution.
    /// * `std_dev` - The standard deviation of the distribution.
    ///
    /// # Returns
    /// An error if `std_dev` is not finite (Nan or infinite).
    pub fn new(rng: StdRng, mean: f32, std_dev: f32) -> Result<Self> {
        Ok(Self {
            rng,
            distribution: Normal::new(mean, std_dev)?,
        })
    }

    /// Creates a new `NormalInitializer` seeded from the OS, or from `seed` if present.
    pub fn from_seed(seed: Option<u64>, mean: f32, std_dev: f32) -> Result<Self> {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Self::new(rng, mean, std_dev)
    }

    pub fn std_dev(&self) -> f32 {
        self.distribution.std_dev()
    }

    /// Rescales the distribution, keeping its mean and the generator's state.
    ///
    /// # Returns
    /// An error if `std_dev` is not finite, leaving the distribution untouched.
    pub fn set_std_dev(&mut self, std_dev: f32) -> Result<()> {
        self.distribution = Normal::new(self.distribution.mean(), std_dev)?;
        Ok(())
    }
}

impl Initializer for NormalInitializer {
    fn initialize(&mut self, shape: &[usize]) -> ArrayD<f32> {
        ArrayD::random_using(IxDyn(shape), self.distribution, &mut self.rng)
    }
}
