use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{OptimErr, Result};

const DEFAULT_EPSILON: f32 = 1e-7;

fn default_epsilon() -> f32 {
    DEFAULT_EPSILON
}

fn default_pace_name() -> String {
    "AdaptivePace".into()
}

/// The hyperparameters of a `Gravity` optimizer, every field has a default.
///
/// `lr` is accepted as an alias of `learning_rate`, any other unknown key is rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GravityConfig {
    pub name: String,
    #[serde(alias = "lr")]
    pub learning_rate: f32,
    pub alpha: f32,
    pub beta: f32,
    pub decay: f32,
    pub epsilon: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clipnorm: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clipvalue: Option<f32>,
}

impl Default for GravityConfig {
    fn default() -> Self {
        Self {
            name: "Gravity".into(),
            learning_rate: 0.1,
            alpha: 0.01,
            beta: 0.9,
            decay: 0.,
            epsilon: DEFAULT_EPSILON,
            clipnorm: None,
            clipvalue: None,
        }
    }
}

impl GravityConfig {
    /// Checks every invariant of the hyperparameters.
    ///
    /// # Returns
    /// An `InvalidConfig` error naming the first offending hyperparameter.
    pub fn validate(&self) -> Result<()> {
        positive("learning_rate", self.learning_rate)?;
        positive("alpha", self.alpha)?;

        if !(0. ..1.).contains(&self.beta) {
            return Err(OptimErr::InvalidConfig(format!(
                "beta must be in [0, 1), got {}",
                self.beta
            )));
        }

        validate_base(self.decay, self.clipnorm, self.clipvalue)
    }
}

/// The hyperparameters of a `Pace` optimizer, `learning_rate` is required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PaceConfig {
    #[serde(default = "default_pace_name")]
    pub name: String,
    #[serde(alias = "lr")]
    pub learning_rate: f32,
    #[serde(default)]
    pub decay: f32,
    #[serde(default = "default_epsilon")]
    pub epsilon: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clipnorm: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clipvalue: Option<f32>,
}

impl PaceConfig {
    /// Creates a new `PaceConfig` with the given base rate and defaults for the rest.
    pub fn new(learning_rate: f32) -> Self {
        Self {
            name: default_pace_name(),
            learning_rate,
            decay: 0.,
            epsilon: DEFAULT_EPSILON,
            clipnorm: None,
            clipvalue: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        positive("learning_rate", self.learning_rate)?;
        validate_base(self.decay, self.clipnorm, self.clipvalue)
    }
}

/// A snapshot of an optimizer's configuration, enough to rebuild an equivalent one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerConfig {
    Gravity(GravityConfig),
    Pace(PaceConfig),
}

impl OptimizerConfig {
    pub fn validate(&self) -> Result<()> {
        match self {
            OptimizerConfig::Gravity(config) => config.validate(),
            OptimizerConfig::Pace(config) => config.validate(),
        }
    }

    /// The optimizer's display name.
    pub fn name(&self) -> &str {
        match self {
            OptimizerConfig::Gravity(config) => &config.name,
            OptimizerConfig::Pace(config) => &config.name,
        }
    }

    /// Flattens the hyperparameters into a name to value mapping.
    pub fn to_map(&self) -> Result<Map<String, Value>> {
        let value = match self {
            OptimizerConfig::Gravity(config) => serde_json::to_value(config)?,
            OptimizerConfig::Pace(config) => serde_json::to_value(config)?,
        };

        match value {
            Value::Object(map) => Ok(map),
            other => Err(OptimErr::InvalidConfig(format!(
                "expected an object, got {other}"
            ))),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parses and validates a configuration.
    pub fn from_json(s: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}

impl From<GravityConfig> for OptimizerConfig {
    fn from(value: GravityConfig) -> Self {
        Self::Gravity(value)
    }
}

impl From<PaceConfig> for OptimizerConfig {
    fn from(value: PaceConfig) -> Self {
        Self::Pace(value)
    }
}

fn positive(what: &str, value: f32) -> Result<()> {
    if value > 0. && value.is_finite() {
        return Ok(());
    }

    Err(OptimErr::InvalidConfig(format!(
        "{what} must be positive, got {value}"
    )))
}

fn validate_base(decay: f32, clipnorm: Option<f32>, clipvalue: Option<f32>) -> Result<()> {
    if !(decay >= 0. && decay.is_finite()) {
        return Err(OptimErr::InvalidConfig(format!(
            "decay must be non negative, got {decay}"
        )));
    }

    if let Some(clipnorm) = clipnorm {
        positive("clipnorm", clipnorm)?;
    }

    if let Some(clipvalue) = clipvalue {
        positive("clipvalue", clipvalue)?;
    }

    Ok(())
}
