mod anki;
mod connector;
mod cursor;
mod engine;
mod notion;
mod scheduler;

use std::process::ExitCode;

use ankisync_config::{init_tracing, AppConfig};
use ankisync_transforms::TransformRegistry;
use chrono::Utc;

use crate::anki::client::{AnkiClient, AnkiClientConfig};
use crate::connector::NoteTarget;
use crate::cursor::SyncCursor;
use crate::engine::{EngineSettings, SyncEngine};
use crate::notion::client::{NotionClient, NotionClientConfig};
use crate::scheduler::Scheduler;

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing("info");

    tracing::info!(service = "ankisync-syncer", "starting");

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let scheduler = match build_scheduler(&config) {
        Ok(scheduler) => scheduler,
        Err(e) => {
            tracing::error!(error = %e, "failed to create http clients");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        deck = %config.anki.deck_name,
        model = %config.anki.model_name,
        interval_secs = config.notion.poll_interval_seconds,
        "sync configured"
    );

    tokio::select! {
        result = scheduler.run() => match result {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                tracing::error!(error = %e, "fatal error on first sync, exiting");
                ExitCode::FAILURE
            }
        },
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received, exiting");
            ExitCode::SUCCESS
        }
    }
}

fn build_scheduler(
    config: &AppConfig,
) -> Result<Scheduler<NotionClient, AnkiClient>, reqwest::Error> {
    let notion = NotionClient::new(NotionClientConfig::from(&config.notion))?;
    let anki = AnkiClient::new(AnkiClientConfig::from(&config.anki))?;
    let registry = TransformRegistry::with_builtins()?;
    tracing::info!(steps = ?registry.names(), "registered transform steps");

    let settings = EngineSettings {
        target: NoteTarget {
            deck_name: config.anki.deck_name.clone(),
            model_name: config.anki.model_name.clone(),
        },
        transforms: config.processors.clone(),
    };
    let cursor = SyncCursor::new(config.initial_cursor(Utc::now()));

    let engine = SyncEngine::new(notion, anki, registry, settings, cursor);
    for name in engine.unresolved_steps() {
        tracing::warn!(step = name, "configured transform step is not registered");
    }

    Ok(Scheduler::new(engine, config.poll_interval()))
}
