use std::time::Duration;

use ankisync_common::types::FieldMapping;
use ankisync_config::AnkiSettings;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use super::models::{
    default_card_template, AnkiNote, AnkiRequest, AnkiResponse, CreateModelParams, NotesParams,
    ANKI_CONNECT_VERSION,
};
use crate::connector::{NoteTarget, SinkError, SinkGateway};

#[derive(Debug, Clone)]
pub struct AnkiClientConfig {
    pub connect_url: String,
    pub max_retries: u32,
    pub timeout_secs: u64,
}

impl From<&AnkiSettings> for AnkiClientConfig {
    fn from(settings: &AnkiSettings) -> Self {
        Self {
            connect_url: settings.connect_url.clone(),
            max_retries: settings.max_retries,
            timeout_secs: settings.timeout_secs,
        }
    }
}

/// AnkiConnect client speaking the `{action, version, params}` protocol.
#[derive(Clone)]
pub struct AnkiClient {
    client: Client,
    config: AnkiClientConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum AnkiClientError {
    #[error("HTTP {status}: {body}")]
    HttpError { status: StatusCode, body: String },

    #[error("request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("max retries exceeded after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded { attempts: u32, last_error: String },

    #[error("AnkiConnect {action} error: {message}")]
    Api { action: String, message: String },

    #[error("AnkiConnect {action} returned no result")]
    EmptyResult { action: String },
}

impl From<AnkiClientError> for SinkError {
    fn from(err: AnkiClientError) -> Self {
        match err {
            AnkiClientError::Api { action, message } => SinkError::Api { action, message },
            AnkiClientError::EmptyResult { action } => SinkError::InvalidResponse {
                action,
                detail: "missing result".to_string(),
            },
            other => SinkError::Transport(other.to_string()),
        }
    }
}

impl AnkiClient {
    pub fn new(config: AnkiClientConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    /// For testing: create a client pointing at a specific URL (e.g., wiremock).
    #[cfg(test)]
    pub fn with_connect_url(mut self, connect_url: &str) -> Self {
        self.config.connect_url = connect_url.to_string();
        self
    }

    pub async fn version(&self) -> Result<u32, AnkiClientError> {
        self.invoke("version", json!({})).await
    }

    pub async fn deck_names(&self) -> Result<Vec<String>, AnkiClientError> {
        self.invoke("deckNames", json!({})).await
    }

    pub async fn create_deck(&self, name: &str) -> Result<(), AnkiClientError> {
        let _: Value = self.invoke("createDeck", json!({ "deck": name })).await?;
        Ok(())
    }

    pub async fn model_names(&self) -> Result<Vec<String>, AnkiClientError> {
        self.invoke("modelNames", json!({})).await
    }

    pub async fn create_model(&self, name: &str, fields: &[String]) -> Result<(), AnkiClientError> {
        let params = CreateModelParams {
            model_name: name.to_string(),
            in_order_fields: fields.to_vec(),
            card_templates: vec![default_card_template(fields)],
        };
        let _: Value = self.invoke("createModel", params).await?;
        Ok(())
    }

    pub async fn can_add_notes(&self, notes: Vec<AnkiNote>) -> Result<Vec<bool>, AnkiClientError> {
        self.invoke("canAddNotes", NotesParams { notes }).await
    }

    /// Returns one entry per note: the new note id, or `None` if it was rejected.
    pub async fn add_notes(
        &self,
        notes: Vec<AnkiNote>,
    ) -> Result<Vec<Option<u64>>, AnkiClientError> {
        self.invoke("addNotes", NotesParams { notes }).await
    }

    async fn invoke<T, P>(&self, action: &str, params: P) -> Result<T, AnkiClientError>
    where
        T: DeserializeOwned,
        P: Serialize,
    {
        let request = AnkiRequest {
            action,
            version: ANKI_CONNECT_VERSION,
            params,
        };
        let response: AnkiResponse<T> = self.post_with_retry(&request).await?;

        if let Some(message) = response.error {
            return Err(AnkiClientError::Api {
                action: action.to_string(),
                message,
            });
        }
        response.result.ok_or_else(|| AnkiClientError::EmptyResult {
            action: action.to_string(),
        })
    }

    async fn post_with_retry<B, T>(&self, body: &B) -> Result<T, AnkiClientError>
    where
        B: Serialize,
        T: DeserializeOwned,
    {
        let mut last_error = String::new();

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let backoff_secs = std::cmp::min(1u64 << attempt, 30);
                tracing::warn!(attempt, backoff_secs, "retrying ankiconnect after backoff");
                tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
            }

            let response = match self
                .client
                .post(&self.config.connect_url)
                .json(body)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    last_error = e.to_string();
                    if e.is_timeout() || e.is_connect() {
                        continue;
                    }
                    return Err(AnkiClientError::RequestError(e));
                }
            };

            let status = response.status();

            if status.is_success() {
                return response
                    .json::<T>()
                    .await
                    .map_err(AnkiClientError::RequestError);
            }

            if status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                last_error = format!("{status}: {body}");
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            return Err(AnkiClientError::HttpError { status, body });
        }

        Err(AnkiClientError::MaxRetriesExceeded {
            attempts: self.config.max_retries + 1,
            last_error,
        })
    }
}

#[async_trait]
impl SinkGateway for AnkiClient {
    async fn check_connection(&self) -> Result<(), SinkError> {
        let version = self
            .version()
            .await
            .map_err(|e| SinkError::Unreachable(e.to_string()))?;
        tracing::debug!(version, "ankiconnect reachable");
        Ok(())
    }

    async fn ensure_deck_exists(&self, name: &str) -> Result<(), SinkError> {
        if name.trim().is_empty() {
            return Err(SinkError::MissingName("deck"));
        }

        let decks = self.deck_names().await?;
        if decks.iter().any(|d| d == name) {
            tracing::debug!(deck = name, "deck already exists");
            return Ok(());
        }

        tracing::info!(deck = name, "deck does not exist, creating");
        self.create_deck(name).await?;
        tracing::info!(deck = name, "created deck");
        Ok(())
    }

    async fn ensure_model_exists(&self, name: &str, fields: &[String]) -> Result<(), SinkError> {
        if name.trim().is_empty() {
            return Err(SinkError::MissingName("model"));
        }

        let models = self.model_names().await?;
        if models.iter().any(|m| m == name) {
            tracing::debug!(model = name, "model already exists");
            return Ok(());
        }

        tracing::info!(model = name, fields = ?fields, "model does not exist, creating");
        self.create_model(name, fields).await?;
        tracing::info!(model = name, "created model");
        Ok(())
    }

    async fn can_insert(
        &self,
        target: &NoteTarget,
        fields: &FieldMapping,
    ) -> Result<bool, SinkError> {
        let note = AnkiNote::new(&target.deck_name, &target.model_name, fields.clone());
        let verdicts = self.can_add_notes(vec![note]).await?;
        verdicts
            .first()
            .copied()
            .ok_or_else(|| SinkError::InvalidResponse {
                action: "canAddNotes".to_string(),
                detail: "no indicators returned".to_string(),
            })
    }

    async fn bulk_insert(
        &self,
        target: &NoteTarget,
        notes: &[FieldMapping],
    ) -> Result<usize, SinkError> {
        let notes: Vec<AnkiNote> = notes
            .iter()
            .map(|fields| AnkiNote::new(&target.deck_name, &target.model_name, fields.clone()))
            .collect();
        let ids = self.add_notes(notes).await?;
        Ok(ids.iter().filter(|id| id.is_some()).count())
    }
}
