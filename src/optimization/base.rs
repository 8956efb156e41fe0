use ndarray::{ArrayD, ArrayViewD};

/// State every optimizer shares: its name, learning rate, decay, gradient clipping and step counter.
#[derive(Debug, Clone, PartialEq)]
pub struct BaseOptimizer {
    name: String,
    learning_rate: f32,
    decay: f32,
    clipnorm: Option<f32>,
    clipvalue: Option<f32>,
    iterations: u64,
}

impl BaseOptimizer {
    /// Creates a new `BaseOptimizer` with no clipping at step 0.
    ///
    /// # Arguments
    /// * `name` - The optimizer's name, kept in its config.
    /// * `learning_rate` - The base learning rate before decay.
    /// * `decay` - The inverse time decay rate, `0` disables decay.
    pub fn new(name: impl Into<String>, learning_rate: f32, decay: f32) -> Self {
        Self {
            name: name.into(),
            learning_rate,
            decay,
            clipnorm: None,
            clipvalue: None,
            iterations: 0,
        }
    }

    /// Sets the gradient clipping thresholds.
    pub fn with_clipping(mut self, clipnorm: Option<f32>, clipvalue: Option<f32>) -> Self {
        self.clipnorm = clipnorm;
        self.clipvalue = clipvalue;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    pub fn set_learning_rate(&mut self, learning_rate: f32) {
        self.learning_rate = learning_rate;
    }

    pub fn decay(&self) -> f32 {
        self.decay
    }

    pub fn clipnorm(&self) -> Option<f32> {
        self.clipnorm
    }

    pub fn clipvalue(&self) -> Option<f32> {
        self.clipvalue
    }

    /// The amount of optimization steps taken so far.
    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    pub fn set_iterations(&mut self, iterations: u64) {
        self.iterations = iterations;
    }

    /// Marks the end of a global optimization step.
    pub fn advance(&mut self) {
        self.iterations += 1;
    }

    /// The learning rate for the current step: `lr / (1 + decay * iterations)`.
    pub fn decayed_learning_rate(&self) -> f32 {
        if self.decay > 0. {
            self.learning_rate / (1. + self.decay * self.iterations as f32)
        } else {
            self.learning_rate
        }
    }

    /// Returns `true` if `clip` would modify some gradient.
    pub fn clips(&self) -> bool {
        self.clipnorm.is_some() || self.clipvalue.is_some()
    }

    /// Clips a gradient by its L2 norm first and then element-wise by value.
    pub fn clip(&self, grad: ArrayViewD<'_, f32>) -> ArrayD<f32> {
        let mut grad = grad.to_owned();

        if let Some(clipnorm) = self.clipnorm {
            let norm = grad.iter().map(|g| g * g).sum::<f32>().sqrt();
            if norm > clipnorm {
                grad *= clipnorm / norm;
            }
        }

        if let Some(clipvalue) = self.clipvalue {
            grad.mapv_inplace(|g| g.clamp(-clipvalue, clipvalue));
        }

        grad
    }
}
