mod builder;
mod spec;

pub use builder::OptimizerBuilder;
pub use spec::{GravityConfig, OptimizerConfig, PaceConfig};
