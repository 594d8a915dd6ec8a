//! Class name → constructor mapping used to rebuild pipelines from configs.

use super::SubUnit;
use crate::cells::{GruCell, LstmCell, SimpleRnnCell};
use crate::config::LayerConfig;
use crate::error::{RecurrentError, Result};
use crate::layers::{Activation, Dense};
use burn::tensor::backend::Backend;
use std::collections::HashMap;
use std::fmt;

/// Builds a sub-unit from its serialized settings
pub type LayerFactory<B> =
    Box<dyn Fn(&LayerConfig, &<B as Backend>::Device) -> Result<SubUnit<B>>>;

/// Factories keyed by `LayerConfig::class_name`.
///
/// [`with_builtins`](Self::with_builtins) knows the stock cells and layers.
/// Closure-backed cells ([`FnCell`](crate::cells::FnCell)) have to be
/// registered by the caller under the class name they serialize with.
pub struct LayerRegistry<B: Backend> {
    factories: HashMap<String, LayerFactory<B>>,
}

impl<B: Backend> LayerRegistry<B> {
    /// Registry with no factories
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(SimpleRnnCell::<B>::CLASS_NAME, |config, device| {
            Ok(SubUnit::cell(SimpleRnnCell::<B>::from_config(config, device)?))
        });
        registry.register(LstmCell::<B>::CLASS_NAME, |config, device| {
            Ok(SubUnit::cell(LstmCell::<B>::from_config(config, device)?))
        });
        registry.register(GruCell::<B>::CLASS_NAME, |config, device| {
            Ok(SubUnit::cell(GruCell::<B>::from_config(config, device)?))
        });
        registry.register(Dense::<B>::CLASS_NAME, |config, device| {
            Ok(SubUnit::plain(Dense::<B>::from_config(config, device)?))
        });
        registry.register(Activation::CLASS_NAME, |config, _device| {
            Ok(SubUnit::plain(Activation::from_config(config)?))
        });
        registry
    }

    /// Add or replace the factory for `class_name`
    pub fn register<F>(&mut self, class_name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&LayerConfig, &B::Device) -> Result<SubUnit<B>> + 'static,
    {
        let class_name = class_name.into();
        if self.factories.contains_key(&class_name) {
            tracing::warn!(class_name = %class_name, "replacing registered layer factory");
        }
        self.factories.insert(class_name, Box::new(factory));
        self
    }

    pub fn contains(&self, class_name: &str) -> bool {
        self.factories.contains_key(class_name)
    }

    pub fn build(&self, config: &LayerConfig, device: &B::Device) -> Result<SubUnit<B>> {
        let factory = self
            .factories
            .get(&config.class_name)
            .ok_or_else(|| RecurrentError::UnknownLayer(config.class_name.clone()))?;
        factory(config, device)
    }
}

impl<B: Backend> Default for LayerRegistry<B> {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl<B: Backend> fmt::Debug for LayerRegistry<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.factories.keys().collect();
        names.sort();
        f.debug_struct("LayerRegistry")
            .field("classes", &names)
            .finish()
    }
}
