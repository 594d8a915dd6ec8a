//! Serialized form of a sub-unit.

use crate::error::{RecurrentError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Class name plus class-specific settings, as stored in a container config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerConfig {
    pub class_name: String,
    pub config: Value,
}

impl LayerConfig {
    pub fn new(class_name: impl Into<String>, config: &impl Serialize) -> Result<Self> {
        Ok(Self {
            class_name: class_name.into(),
            config: serde_json::to_value(config)?,
        })
    }

    /// Decode the class-specific settings
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.config.clone())
            .map_err(|err| RecurrentError::invalid_config(&self.class_name, err))
    }
}
