use ankisync_common::types::{field_text, FieldMapping, TransformConfig};
use ankisync_transforms::TransformRegistry;
use chrono::Utc;

use crate::connector::{NoteTarget, SinkError, SinkGateway, SourceError, SourceStore};
use crate::cursor::SyncCursor;
use crate::notion::extract::{extract_fields, observed_field_names};
use crate::notion::models::Page;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    SinkUnreachable(SinkError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("could not ensure deck: {0}")]
    Deck(SinkError),

    #[error("could not ensure note model: {0}")]
    Model(SinkError),
}

impl SyncError {
    /// Fatal errors stop the process on the first cycle. A transient source
    /// failure only ends the current cycle.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SyncError::Source(SourceError::TransientFailure(_)))
    }
}

/// Counts for one completed cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub fetched: usize,
    pub duplicates: usize,
    pub dedup_errors: usize,
    pub transform_errors: usize,
    pub write_backs: usize,
    pub write_back_errors: usize,
    pub batch_size: usize,
    pub inserted: usize,
    pub insert_failed: bool,
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub target: NoteTarget,
    /// Pipeline steps in execution order.
    pub transforms: Vec<TransformConfig>,
}

pub struct SyncEngine<S, K> {
    source: S,
    sink: K,
    registry: TransformRegistry,
    settings: EngineSettings,
    cursor: SyncCursor,
}

impl<S, K> SyncEngine<S, K>
where
    S: SourceStore,
    K: SinkGateway,
{
    pub fn new(
        source: S,
        sink: K,
        registry: TransformRegistry,
        settings: EngineSettings,
        cursor: SyncCursor,
    ) -> Self {
        Self {
            source,
            sink,
            registry,
            settings,
            cursor,
        }
    }

    pub fn cursor(&self) -> SyncCursor {
        self.cursor
    }

    /// Configured step names with no registered implementation.
    pub fn unresolved_steps(&self) -> Vec<&str> {
        self.settings
            .transforms
            .iter()
            .filter(|t| self.registry.get(&t.name).is_none())
            .map(|t| t.name.as_str())
            .collect()
    }

    /// Run one sync cycle. The cursor only advances when this returns `Ok`.
    pub async fn run_cycle(&mut self) -> Result<CycleReport, SyncError> {
        let since = self.cursor.get();
        tracing::info!(since = %since, "starting sync cycle");

        self.sink
            .check_connection()
            .await
            .map_err(SyncError::SinkUnreachable)?;

        let pages = self.source.fetch_changed(since).await?;

        let mut report = CycleReport {
            fetched: pages.len(),
            ..CycleReport::default()
        };
        tracing::info!(count = pages.len(), "fetched changed records");

        if let Some(first) = pages.first() {
            let target = &self.settings.target;
            self.sink
                .ensure_deck_exists(&target.deck_name)
                .await
                .map_err(SyncError::Deck)?;
            self.sink
                .ensure_model_exists(&target.model_name, &observed_field_names(first))
                .await
                .map_err(SyncError::Model)?;

            let mut batch = Vec::new();
            for page in &pages {
                if let Some(fields) = self.process_record(page, &mut report).await {
                    batch.push(fields);
                }
            }

            report.batch_size = batch.len();
            if !batch.is_empty() {
                match self.sink.bulk_insert(target, &batch).await {
                    Ok(inserted) => report.inserted = inserted,
                    Err(e) => {
                        tracing::warn!(error = %e, batch = batch.len(), "bulk insert failed");
                        report.insert_failed = true;
                    }
                }
            }
            tracing::info!(
                inserted = report.inserted,
                batch = report.batch_size,
                "added notes"
            );
        }

        let cursor = self.cursor.advance(Utc::now());
        tracing::info!(?report, cursor = %cursor, "sync cycle completed");
        Ok(report)
    }

    /// Dedup gate, transform pipeline and write-back for one record. Returns the
    /// fields to insert, or `None` when the record is skipped.
    async fn process_record(&self, page: &Page, report: &mut CycleReport) -> Option<FieldMapping> {
        let mut fields = extract_fields(page);

        match self.sink.can_insert(&self.settings.target, &fields).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(record_id = %page.id, "note already exists, skipping");
                report.duplicates += 1;
                return None;
            }
            Err(e) => {
                tracing::warn!(record_id = %page.id, error = %e, "duplicate check failed, skipping");
                report.dedup_errors += 1;
                return None;
            }
        }

        let mut pending = FieldMapping::new();
        for config in self.settings.transforms.iter().filter(|t| t.enabled) {
            let Some(step) = self.registry.get(&config.name) else {
                tracing::warn!(record_id = %page.id, step = %config.name, "unknown transform step");
                report.transform_errors += 1;
                continue;
            };

            let before = fields.get(&config.target_field).cloned();
            if let Err(e) = step.process(&mut fields, config).await {
                tracing::warn!(
                    record_id = %page.id,
                    step = %config.name,
                    error = %e,
                    "transform step failed"
                );
                report.transform_errors += 1;
                continue;
            }

            if let Some(value) = field_text(&fields, &config.target_field) {
                if before.as_deref() != Some(value) {
                    pending.insert(config.target_field.clone(), value.to_string());
                }
            }
        }

        if !pending.is_empty() {
            match self.source.update_fields(page, &pending).await {
                Ok(()) => {
                    tracing::debug!(
                        record_id = %page.id,
                        fields = ?pending.keys().collect::<Vec<_>>(),
                        "wrote fields back"
                    );
                    report.write_backs += 1;
                }
                Err(e) => {
                    tracing::warn!(record_id = %page.id, error = %e, "write-back failed");
                    report.write_back_errors += 1;
                }
            }
        }

        Some(fields)
    }
}
