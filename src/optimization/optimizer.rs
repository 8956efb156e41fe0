use log::debug;
use ndarray::{ArrayD, ArrayViewD};

use super::BaseOptimizer;
use crate::{OptimErr, OptimizerConfig, Parameter, Result};

/// Defines the strategy for updating trainable parameters based on their gradients.
///
/// A training loop attaches its parameters once and then, on every step, either calls
/// `apply_gradients` or calls `apply_dense` per parameter followed by a single
/// `finish_step`.
pub trait Optimizer: Send {
    /// The shared learning rate, decay, clipping and step counter.
    fn base(&self) -> &BaseOptimizer;

    fn base_mut(&mut self) -> &mut BaseOptimizer;

    /// Creates the per-parameter state for every parameter in `params`.
    ///
    /// # Arguments
    /// * `params` - The parameters that are going to be optimized.
    ///
    /// # Returns
    /// An error if a parameter was already attached with a different shape.
    fn attach(&mut self, params: &[Parameter]) -> Result<()>;

    /// Checks that `apply_dense` would succeed, without mutating anything.
    ///
    /// # Arguments
    /// * `grad` - The gradient of `param`.
    /// * `param` - The parameter to update.
    fn check(&self, grad: &ArrayViewD<'_, f32>, param: &Parameter) -> Result<()> {
        check_shape(grad, param)
    }

    /// Updates `param` in place given its dense gradient.
    ///
    /// # Arguments
    /// * `grad` - The gradient of `param`, with the same shape.
    /// * `param` - The parameter to update.
    ///
    /// # Returns
    /// An error, before any mutation, if the gradient doesn't match the parameter.
    fn apply_dense(&mut self, grad: ArrayViewD<'_, f32>, param: &mut Parameter) -> Result<()>;

    /// Updates only the entries `indices` of `param`.
    ///
    /// None of the optimizers support sparse updates, this always fails.
    fn apply_sparse(
        &mut self,
        _indices: &[usize],
        _grad: ArrayViewD<'_, f32>,
        _param: &mut Parameter,
    ) -> Result<()> {
        Err(OptimErr::Unimplemented {
            optimizer: self.name().to_string(),
            operation: "apply_sparse",
        })
    }

    /// Returns a snapshot of every hyperparameter needed to rebuild this optimizer.
    fn config(&self) -> OptimizerConfig;

    fn name(&self) -> &str {
        self.base().name()
    }

    fn iterations(&self) -> u64 {
        self.base().iterations()
    }

    fn set_iterations(&mut self, iterations: u64) {
        self.base_mut().set_iterations(iterations);
    }

    fn learning_rate(&self) -> f32 {
        self.base().learning_rate()
    }

    fn set_learning_rate(&mut self, learning_rate: f32) {
        self.base_mut().set_learning_rate(learning_rate);
    }

    fn decayed_learning_rate(&self) -> f32 {
        self.base().decayed_learning_rate()
    }

    /// Ends the current optimization step, must be called once per step and not per parameter.
    fn finish_step(&mut self) {
        self.base_mut().advance();
    }

    /// Applies one whole optimization step.
    ///
    /// Every gradient is validated before any parameter is touched, then clipped, applied,
    /// and finally the step counter is incremented once.
    ///
    /// # Arguments
    /// * `grads` - One gradient per parameter, in the same order.
    /// * `params` - The parameters to update.
    fn apply_gradients(&mut self, grads: &[ArrayD<f32>], params: &mut [Parameter]) -> Result<()> {
        if grads.len() != params.len() {
            return Err(OptimErr::LengthMismatch {
                got: grads.len(),
                expected: params.len(),
            });
        }

        for (grad, param) in grads.iter().zip(params.iter()) {
            self.check(&grad.view(), param)?;
        }

        for (grad, param) in grads.iter().zip(params.iter_mut()) {
            if self.base().clips() {
                let clipped = self.base().clip(grad.view());
                self.apply_dense(clipped.view(), param)?;
            } else {
                self.apply_dense(grad.view(), param)?;
            }
        }

        debug!("{} finished step {}", self.name(), self.iterations());
        self.finish_step();
        Ok(())
    }
}

impl<T: Optimizer + ?Sized> Optimizer for Box<T> {
    fn base(&self) -> &BaseOptimizer {
        (**self).base()
    }

    fn base_mut(&mut self) -> &mut BaseOptimizer {
        (**self).base_mut()
    }

    fn attach(&mut self, params: &[Parameter]) -> Result<()> {
        (**self).attach(params)
    }

    fn check(&self, grad: &ArrayViewD<'_, f32>, param: &Parameter) -> Result<()> {
        (**self).check(grad, param)
    }

    fn apply_dense(&mut self, grad: ArrayViewD<'_, f32>, param: &mut Parameter) -> Result<()> {
        (**self).apply_dense(grad, param)
    }

    fn apply_sparse(
        &mut self,
        indices: &[usize],
        grad: ArrayViewD<'_, f32>,
        param: &mut Parameter,
    ) -> Result<()> {
        (**self).apply_sparse(indices, grad, param)
    }

    fn config(&self) -> OptimizerConfig {
        (**self).config()
    }
}

/// Fails if `grad` doesn't have the exact shape of `param`.
pub(crate) fn check_shape(grad: &ArrayViewD<'_, f32>, param: &Parameter) -> Result<()> {
    if grad.shape() != param.shape() {
        return Err(OptimErr::ShapeMismatch {
            what: "gradient",
            got: grad.shape().to_vec(),
            expected: param.shape().to_vec(),
        });
    }

    Ok(())
}
