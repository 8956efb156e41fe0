use log::info;

use super::OptimizerConfig;
use crate::{
    Result,
    optimization::{Gravity, Optimizer, Pace},
};

/// Builds new optimizers given their configuration.
#[derive(Debug, Default, Clone, Copy)]
pub struct OptimizerBuilder {
    seed: Option<u64>,
}

impl OptimizerBuilder {
    /// Creates a new `OptimizerBuilder` seeding its optimizers from the OS.
    pub fn new() -> Self {
        Self { seed: None }
    }

    /// Fixes the seed used to initialize the optimizers' slots.
    pub fn seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// Builds an optimizer following a config.
    ///
    /// # Args
    /// * `config` - The configuration of the optimizer.
    ///
    /// # Returns
    /// A new optimizer or an error if the configuration is invalid.
    pub fn build(&self, config: OptimizerConfig) -> Result<Box<dyn Optimizer>> {
        info!("building optimizer {}", config.name());

        let optimizer: Box<dyn Optimizer> = match config {
            OptimizerConfig::Gravity(config) => match self.seed {
                Some(seed) => Box::new(Gravity::seeded(config, seed)?),
                None => Box::new(Gravity::new(config)?),
            },
            OptimizerConfig::Pace(config) => Box::new(Pace::new(config)?),
        };

        Ok(optimizer)
    }

    /// Parses a JSON config and builds the optimizer it describes.
    pub fn build_from_json(&self, json: &str) -> Result<Box<dyn Optimizer>> {
        self.build(OptimizerConfig::from_json(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GravityConfig, OptimErr, PaceConfig};

    #[test]
    fn builds_each_kind() {
        let builder = OptimizerBuilder::new().seed(Some(42));

        let gravity = builder.build(GravityConfig::default().into()).unwrap();
        assert_eq!(gravity.name(), "Gravity");

        let pace = builder.build(PaceConfig::new(0.1).into()).unwrap();
        assert_eq!(pace.name(), "AdaptivePace");
    }

    #[test]
    fn rejects_invalid_config() {
        let config = GravityConfig {
            alpha: 0.,
            ..Default::default()
        };

        let err = OptimizerBuilder::new().build(config.into()).err().unwrap();
        assert!(matches!(err, OptimErr::InvalidConfig(_)), "{err}");
    }

    #[test]
    fn from_json() {
        let json = r#"{"pace":{"learning_rate":0.2,"decay":0.01}}"#;
        let pace = OptimizerBuilder::new().build_from_json(json).unwrap();

        assert_eq!(pace.learning_rate(), 0.2);
        assert_eq!(pace.config(), OptimizerConfig::from_json(json).unwrap());
    }

    #[test]
    fn from_json_with_lr_alias() {
        let builder = OptimizerBuilder::new().seed(Some(1));

        let gravity = builder.build_from_json(r#"{"gravity":{"lr":0.5}}"#).unwrap();
        assert_eq!(gravity.learning_rate(), 0.5);

        let pace = builder.build_from_json(r#"{"pace":{"lr":0.5}}"#).unwrap();
        assert_eq!(pace.learning_rate(), 0.5);
    }

    #[test]
    fn built_config_round_trips() {
        let config = OptimizerConfig::Gravity(GravityConfig {
            learning_rate: 0.02,
            beta: 0.95,
            clipnorm: Some(5.),
            ..Default::default()
        });

        let optimizer = OptimizerBuilder::new().build(config.clone()).unwrap();
        assert_eq!(optimizer.config(), config);
    }
}
