use ankisync_common::types::FieldMapping;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::notion::models::Page;

/// Failure taxonomy of the source store.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SourceError {
    #[error("authentication failed, check the integration token: {0}")]
    AuthenticationFailed(String),

    #[error("database not found or not shared with the integration: {0}")]
    TargetNotFound(String),

    #[error("transient source failure: {0}")]
    TransientFailure(String),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum SinkError {
    #[error("sink unreachable: {0}")]
    Unreachable(String),

    #[error("no {0} name configured")]
    MissingName(&'static str),

    #[error("sink rejected {action}: {message}")]
    Api { action: String, message: String },

    #[error("sink request failed: {0}")]
    Transport(String),

    #[error("unexpected response to {action}: {detail}")]
    InvalidResponse { action: String, detail: String },
}

/// Deck and note model every synced note is written under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteTarget {
    pub deck_name: String,
    pub model_name: String,
}

/// Remote store that owns the canonical records.
#[async_trait]
pub trait SourceStore: Send + Sync {
    /// All records edited after `since`, newest first, with pagination resolved.
    async fn fetch_changed(&self, since: DateTime<Utc>) -> Result<Vec<Page>, SourceError>;

    /// Write `fields` back onto `page`, using the page's own property types.
    async fn update_fields(&self, page: &Page, fields: &FieldMapping) -> Result<(), SourceError>;
}

/// Flashcard store receiving the synced notes.
#[async_trait]
pub trait SinkGateway: Send + Sync {
    async fn check_connection(&self) -> Result<(), SinkError>;

    async fn ensure_deck_exists(&self, name: &str) -> Result<(), SinkError>;

    /// Create the model from `fields` if it does not exist yet. An existing model
    /// is left untouched.
    async fn ensure_model_exists(&self, name: &str, fields: &[String]) -> Result<(), SinkError>;

    /// `false` when the sink already holds an equivalent note.
    async fn can_insert(&self, target: &NoteTarget, fields: &FieldMapping)
        -> Result<bool, SinkError>;

    /// Insert all notes in one call, returning how many the sink accepted.
    async fn bulk_insert(
        &self,
        target: &NoteTarget,
        notes: &[FieldMapping],
    ) -> Result<usize, SinkError>;
}
