use std::sync::LazyLock;
use std::time::Duration;

use ankisync_common::types::{field_text, FieldMapping, TransformConfig};
use async_trait::async_trait;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, REFERER};
use reqwest::{Client, StatusCode};

use super::{require_fields, TransformError, TransformStep};

pub const DWDS_BASE_URL: &str = "https://www.dwds.de";

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/138.0.0.0 Safari/537.36";
const TIMEOUT_SECS: u64 = 15;
const MAX_RETRIES: u32 = 3;
const MAX_BACKOFF_SECS: u64 = 5;

const AUDIO_EXTENSIONS: [&str; 5] = [".mp3", ".ogg", ".wav", ".m4a", ".aac"];
const AUDIO_PATH_HINTS: [&str; 5] = ["audio", "sound", "pronunciation", "media", "mp3"];

static AUDIO_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<audio\b([^>]*)>").expect("valid audio tag regex"));
static AUDIO_CLOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</audio\s*>").expect("valid audio close regex"));
static SOURCE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<source\b([^>]*)>").expect("valid source tag regex"));
static SRC_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(?:^|\s)src\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>"']+))"#)
        .expect("valid src attribute regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioInfo {
    pub url: String,
    pub format: &'static str,
}

/// Looks a word up on DWDS and stores the pronunciation audio URL.
pub struct DwdsAudioStep {
    client: Client,
    base_url: String,
    max_retries: u32,
}

impl DwdsAudioStep {
    pub fn new() -> Result<Self, reqwest::Error> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static("de-DE,de;q=0.9,en-US;q=0.8,en;q=0.7"),
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: DWDS_BASE_URL.to_string(),
            max_retries: MAX_RETRIES,
        })
    }

    /// Override the dictionary site the lookup is sent to.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Fetch the dictionary page for `word` and pull the first usable audio link.
    ///
    /// `Ok(None)` means the page had no pronunciation.
    pub async fn lookup(
        &self,
        word: &str,
        base_url: &str,
    ) -> Result<Option<AudioInfo>, TransformError> {
        let url = format!(
            "{}/wb/{}",
            base_url,
            urlencoding::encode(&word.trim().to_lowercase())
        );
        let html = self.fetch_page_with_retry(&url, base_url).await?;
        Ok(extract_audio_url(&html, base_url))
    }

    async fn fetch_page_with_retry(
        &self,
        url: &str,
        base_url: &str,
    ) -> Result<String, TransformError> {
        let mut last_error = String::new();

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff_secs = std::cmp::min(1u64 << (attempt - 1), MAX_BACKOFF_SECS);
                tracing::debug!(attempt, backoff_secs, "retrying dwds lookup");
                tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
            }

            let response = match self
                .client
                .get(url)
                .header(REFERER, format!("{base_url}/"))
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    last_error = e.to_string();
                    if e.is_timeout() || e.is_connect() {
                        continue;
                    }
                    return Err(TransformError::Lookup(last_error));
                }
            };

            let status = response.status();
            if status == StatusCode::OK {
                return response
                    .text()
                    .await
                    .map_err(|e| TransformError::Lookup(format!("unreadable body: {e}")));
            }

            last_error = format!("HTTP status code: {status}");
            if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                continue;
            }
            return Err(TransformError::Lookup(last_error));
        }

        Err(TransformError::Lookup(format!(
            "gave up after {} attempts: {last_error}",
            self.max_retries + 1
        )))
    }
}

#[async_trait]
impl TransformStep for DwdsAudioStep {
    fn name(&self) -> &'static str {
        "dwds_audio"
    }

    async fn process(
        &self,
        fields: &mut FieldMapping,
        config: &TransformConfig,
    ) -> Result<(), TransformError> {
        require_fields(self.name(), config)?;

        let Some(word) = field_text(fields, &config.source_field).map(str::to_string) else {
            return Ok(());
        };

        let base_url = config
            .option_str("base_url")
            .map(|b| b.trim_end_matches('/'))
            .unwrap_or(self.base_url.as_str());

        tracing::info!(step = self.name(), word = %word, "looking up pronunciation");

        // Lookup failures never fail the step; the target field stays as it was.
        match self.lookup(&word, base_url).await {
            Ok(Some(audio)) => {
                tracing::debug!(word = %word, url = %audio.url, format = audio.format, "audio found");
                fields.insert(config.target_field.clone(), audio.url);
            }
            Ok(None) => {
                tracing::debug!(word = %word, "no audio link found");
            }
            Err(e) => {
                tracing::warn!(word = %word, error = %e, "could not fetch audio");
            }
        }
        Ok(())
    }
}

/// Find the first `<audio src>` or nested `<source src>` that resolves to an audio URL.
pub fn extract_audio_url(html: &str, base_url: &str) -> Option<AudioInfo> {
    for tag in AUDIO_TAG.captures_iter(html) {
        let (Some(whole), Some(attrs)) = (tag.get(0), tag.get(1)) else {
            continue;
        };

        if let Some(info) = src_attr(attrs.as_str()).and_then(|src| clean_audio_url(src, base_url)) {
            return Some(info);
        }

        let rest = &html[whole.end()..];
        let inner = match AUDIO_CLOSE.find(rest) {
            Some(close) => &rest[..close.start()],
            None => rest,
        };
        let nested = SOURCE_TAG
            .captures_iter(inner)
            .filter_map(|source| source.get(1).and_then(|a| src_attr(a.as_str())))
            .find_map(|src| clean_audio_url(src, base_url));
        if nested.is_some() {
            return nested;
        }
    }
    None
}

fn src_attr(attrs: &str) -> Option<&str> {
    let caps = SRC_ATTR.captures(attrs)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .or_else(|| caps.get(3))
        .map(|m| m.as_str())
        .filter(|s| !s.trim().is_empty())
}

/// Unescape, absolutize and validate a raw audio reference.
pub fn clean_audio_url(raw: &str, base_url: &str) -> Option<AudioInfo> {
    let unescaped = raw
        .replace("&amp;", "&")
        .replace("&#x2F;", "/")
        .replace("&#47;", "/");
    let trimmed = unescaped.trim().trim_matches(|c| c == '"' || c == '\'');

    if trimmed.is_empty() || trimmed.to_lowercase().contains("javascript:") {
        return None;
    }

    let url = if trimmed.starts_with("http") {
        trimmed.to_string()
    } else if let Some(rest) = trimmed.strip_prefix("//") {
        format!("https://{rest}")
    } else if trimmed.starts_with('/') {
        format!("{base_url}{trimmed}")
    } else {
        format!("{base_url}/{trimmed}")
    };

    if !is_audio_url(&url) {
        return None;
    }
    let format = detect_audio_format(&url);
    Some(AudioInfo { url, format })
}

pub fn is_audio_url(url: &str) -> bool {
    let lower = url.to_lowercase();
    AUDIO_EXTENSIONS.iter().any(|ext| lower.contains(ext))
        || AUDIO_PATH_HINTS.iter().any(|hint| lower.contains(hint))
}

fn detect_audio_format(url: &str) -> &'static str {
    let lower = url.to_lowercase();
    AUDIO_EXTENSIONS
        .iter()
        .copied()
        .find(|ext| lower.contains(ext))
        .map(|ext| &ext[1..])
        .unwrap_or("unknown")
}
