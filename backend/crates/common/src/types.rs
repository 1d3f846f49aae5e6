use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// Value written for a property that has no textual content.
pub const PLACEHOLDER: &str = "-";

/// Flattened, string-keyed view of a source record.
pub type FieldMapping = BTreeMap<String, String>;

/// Returns the non-empty, non-placeholder value stored under `field`.
pub fn field_text<'a>(fields: &'a FieldMapping, field: &str) -> Option<&'a str> {
    fields
        .get(field)
        .map(String::as_str)
        .filter(|v| !v.is_empty() && *v != PLACEHOLDER)
}

/// One configured pipeline step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransformConfig {
    pub name: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub source_field: String,
    #[serde(default)]
    pub target_field: String,
    #[serde(default, alias = "config")]
    pub options: HashMap<String, serde_json::Value>,
}

impl TransformConfig {
    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(|v| v.as_str())
    }
}
