use std::collections::HashMap;

use crate::steps::dwds_audio::DwdsAudioStep;
use crate::steps::TransformStep;

/// Name → step lookup table, built once at startup and owned by the engine.
#[derive(Default)]
pub struct TransformRegistry {
    steps: HashMap<&'static str, Box<dyn TransformStep>>,
}

impl TransformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every step shipped with the syncer.
    pub fn with_builtins() -> Result<Self, reqwest::Error> {
        let mut registry = Self::new();
        registry.register(Box::new(DwdsAudioStep::new()?));
        Ok(registry)
    }

    /// Register a step under its own name. A later registration with the same
    /// name replaces the earlier one.
    pub fn register(&mut self, step: Box<dyn TransformStep>) {
        let name = step.name();
        if self.steps.insert(name, step).is_some() {
            tracing::warn!(step = name, "transform step registered twice, replacing");
        }
    }

    pub fn get(&self, name: &str) -> Option<&dyn TransformStep> {
        self.steps.get(name).map(|s| s.as_ref())
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.steps.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
