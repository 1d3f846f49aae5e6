pub mod dwds_audio;

use ankisync_common::types::{FieldMapping, TransformConfig};
use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("invalid config for step {step}: {reason}")]
    InvalidConfig { step: String, reason: String },

    #[error("lookup failed: {0}")]
    Lookup(String),
}

/// A named enrichment step run against every new record.
///
/// Implementations write only to `config.target_field` and treat a missing or
/// empty `config.source_field` value as nothing to do.
#[async_trait]
pub trait TransformStep: Send + Sync {
    fn name(&self) -> &'static str;

    async fn process(
        &self,
        fields: &mut FieldMapping,
        config: &TransformConfig,
    ) -> Result<(), TransformError>;
}

/// Check that a step config names both fields.
pub fn require_fields(step: &str, config: &TransformConfig) -> Result<(), TransformError> {
    if config.source_field.trim().is_empty() || config.target_field.trim().is_empty() {
        return Err(TransformError::InvalidConfig {
            step: step.to_string(),
            reason: "source_field and target_field are required".to_string(),
        });
    }
    Ok(())
}
