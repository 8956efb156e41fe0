use log::{debug, warn};
use ndarray::{ArrayD, ArrayViewD, Zip};

use super::{BaseOptimizer, Optimizer};
use crate::{OptimizerConfig, PaceConfig, Parameter, Result};

/// The Pace optimization algorithm.
///
/// Stateless, every step is `-a * tanh((lr / a) * g)` with `a = lr * std(g)`, so no element
/// moves more than `a` and the slope at the origin is always `lr`.
#[derive(Debug)]
pub struct Pace {
    base: BaseOptimizer,
    epsilon: f32,
}

impl Pace {
    /// Creates a new `Pace`.
    ///
    /// # Arguments
    /// * `config` - The optimizer's hyperparameters.
    ///
    /// # Returns
    /// An error if the hyperparameters are invalid.
    pub fn new(config: PaceConfig) -> Result<Self> {
        config.validate()?;

        let PaceConfig {
            name,
            learning_rate,
            decay,
            epsilon,
            clipnorm,
            clipvalue,
        } = config;

        Ok(Self {
            base: BaseOptimizer::new(name, learning_rate, decay).with_clipping(clipnorm, clipvalue),
            epsilon,
        })
    }
}

impl Optimizer for Pace {
    fn base(&self) -> &BaseOptimizer {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseOptimizer {
        &mut self.base
    }

    fn attach(&mut self, _params: &[Parameter]) -> Result<()> {
        Ok(())
    }

    fn apply_dense(&mut self, grad: ArrayViewD<'_, f32>, param: &mut Parameter) -> Result<()> {
        self.check(&grad, param)?;

        let Some(step) = pace_step(&grad, self.base.decayed_learning_rate()) else {
            return Ok(());
        };

        Zip::from(param.value_mut())
            .and(&step)
            .for_each(|p, &s| *p += s);

        Ok(())
    }

    fn config(&self) -> OptimizerConfig {
        OptimizerConfig::Pace(PaceConfig {
            name: self.base.name().to_string(),
            learning_rate: self.base.learning_rate(),
            decay: self.base.decay(),
            epsilon: self.epsilon,
            clipnorm: self.base.clipnorm(),
            clipvalue: self.base.clipvalue(),
        })
    }
}

/// Computes the step Pace takes for `grad` with base rate `lr`.
///
/// The dispersion is computed in `f64`, so it doesn't overflow for gradients near `f32::MAX`.
///
/// # Returns
/// `None` when the step would be zero everywhere, that is for an empty or constant gradient,
/// or when the step bound isn't finite (a gradient holding `NaN` or infinities).
pub fn pace_step(grad: &ArrayViewD<'_, f32>, lr: f32) -> Option<ArrayD<f32>> {
    if grad.is_empty() {
        return None;
    }

    let lr = f64::from(lr);
    let a = lr * grad.mapv(f64::from).std(0.).abs();

    if a == 0. {
        debug!("constant gradient, skipping step");
        return None;
    }

    if !a.is_finite() || a > f64::from(f32::MAX) {
        warn!("step bound {a} is not finite, skipping step");
        return None;
    }

    let slope = lr / a;
    Some(grad.mapv(|g| (-a * (slope * f64::from(g)).tanh()) as f32))
}
