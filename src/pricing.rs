//! Built-in model table with context sizes and per-million-token prices.

use std::collections::BTreeMap;

use serde::Serialize;

pub const DEFAULT_MODEL_ID: &str = "gpt-5.3-codex";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelInfo {
    pub id: String,
    pub context_window: u64,
    /// USD per million net input tokens.
    pub input_price: f64,
    /// USD per million output tokens.
    pub output_price: f64,
}

impl ModelInfo {
    #[must_use]
    pub fn new(id: impl Into<String>, context_window: u64, input_price: f64, output_price: f64) -> Self {
        Self {
            id: id.into(),
            context_window,
            input_price,
            output_price,
        }
    }
}

/// Model lookup that always resolves, using the default entry for unknown ids.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: BTreeMap<String, ModelInfo>,
    default_id: String,
}

impl ModelRegistry {
    #[must_use]
    pub fn new(default: ModelInfo) -> Self {
        let default_id = default.id.clone();
        let mut models = BTreeMap::new();
        models.insert(default_id.clone(), default);
        Self { models, default_id }
    }

    #[must_use]
    pub fn builtin() -> Self {
        let mut registry = Self::new(ModelInfo::new(DEFAULT_MODEL_ID, 400_000, 10.0, 30.0));
        for model in [
            ModelInfo::new("gpt-5.2-codex", 400_000, 1.75, 14.0),
            ModelInfo::new("gpt-5.1-codex-max", 400_000, 1.25, 10.0),
            ModelInfo::new("gpt-5.1-codex", 400_000, 1.25, 10.0),
            ModelInfo::new("gpt-5.1-codex-mini", 400_000, 0.25, 2.0),
            ModelInfo::new("gpt-5-codex", 400_000, 1.25, 10.0),
            ModelInfo::new("gpt-5", 400_000, 1.25, 10.0),
        ] {
            registry.insert(model);
        }
        registry
    }

    /// Adds or replaces a model entry.
    #[must_use]
    pub fn with_model(mut self, model: ModelInfo) -> Self {
        self.insert(model);
        self
    }

    /// Adds or replaces a model entry.
    pub fn insert(&mut self, model: ModelInfo) {
        self.models.insert(model.id.clone(), model);
    }

    pub fn get(&self, id: &str) -> Option<&ModelInfo> {
        self.models.get(id)
    }

    pub fn default_model(&self) -> &ModelInfo {
        &self.models[&self.default_id]
    }

    pub fn default_id(&self) -> &str {
        &self.default_id
    }

    pub fn resolve(&self, id: &str) -> &ModelInfo {
        self.get(id).unwrap_or_else(|| self.default_model())
    }

    pub fn models(&self) -> impl Iterator<Item = &ModelInfo> {
        self.models.values()
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
