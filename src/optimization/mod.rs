mod base;
mod gravity;
mod optimizer;
mod pace;

pub use base::BaseOptimizer;
pub use gravity::{Gravity, effective_beta, gravity_update, saturate};
pub use optimizer::Optimizer;
pub use pace::{Pace, pace_step};
