//! Gravity and Pace, two gradient descent optimizers meant to replace SGD or Adam in a
//! training loop.
//!
//! The training loop owns its `Parameter`s and computes their gradients, an `Optimizer`
//! is attached to the parameters once and then updates them in place on every step.

pub mod config;
pub mod error;
pub mod initialization;
pub mod optimization;
pub mod parameter;

pub use config::{GravityConfig, OptimizerBuilder, OptimizerConfig, PaceConfig};
pub use error::{OptimErr, Result};
pub use optimization::{BaseOptimizer, Gravity, Optimizer, Pace};
pub use parameter::{ParamId, Parameter};
