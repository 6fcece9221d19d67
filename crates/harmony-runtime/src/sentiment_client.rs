//! [`SentimentClient`] – zero-shot text classification over HTTP.
//!
//! Talks to a Hugging Face style inference endpoint.  The utterance is
//! scored against every [`SentimentLabel`] and the highest-scoring label
//! wins.
//!
//! ```text
//! POST <url>
//! Authorization: Bearer <token>
//! {"inputs": "...", "parameters": {"candidate_labels": [...], "multi_label": true}}
//!
//! 200 {"labels": ["anger", ...], "scores": [0.91, ...]}
//! ```

use std::time::Duration;

use async_trait::async_trait;
use harmony_types::{HarmonyError, SentimentLabel};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::collaborators::SentimentClassifier;
use crate::error::ClientError;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct Scored {
    labels: Vec<String>,
    scores: Vec<f64>,
}

/// Some deployments wrap the result in a one-element array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScoredResponse {
    Single(Scored),
    Batch(Vec<Scored>),
}

pub struct SentimentClient {
    url: String,
    token: Option<String>,
    timeout: Duration,
    client: reqwest::Client,
}

impl SentimentClient {
    pub fn new(url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            url: url.into(),
            token,
            timeout: DEFAULT_TIMEOUT,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Request body for `text`.
    pub fn request_body(text: &str) -> Value {
        let labels: Vec<&str> = SentimentLabel::ALL.iter().map(|l| l.as_str()).collect();
        json!({
            "inputs": text,
            "parameters": {
                "candidate_labels": labels,
                "multi_label": true,
            }
        })
    }

    /// Classify `text`.
    ///
    /// # Errors
    ///
    /// [`ClientError::Http`] on transport failure or non-2xx status,
    /// [`ClientError::BadResponse`] when the scores cannot be read.
    pub async fn classify_text(&self, text: &str) -> Result<SentimentLabel, ClientError> {
        let mut request = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&Self::request_body(text));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let body: Value = request.send().await?.error_for_status()?.json().await?;
        let label = pick_label(body)?;
        debug!(%label, "utterance classified");
        Ok(label)
    }
}

/// The label with the highest score.
fn pick_label(body: Value) -> Result<SentimentLabel, ClientError> {
    let scored = match serde_json::from_value::<ScoredResponse>(body)
        .map_err(|e| ClientError::BadResponse(e.to_string()))?
    {
        ScoredResponse::Single(s) => s,
        ScoredResponse::Batch(batch) => batch
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::BadResponse("empty result array".into()))?,
    };
    if scored.labels.len() != scored.scores.len() {
        return Err(ClientError::BadResponse(format!(
            "{} labels but {} scores",
            scored.labels.len(),
            scored.scores.len()
        )));
    }

    let (best, _) = scored
        .labels
        .iter()
        .zip(&scored.scores)
        .max_by(|a, b| a.1.total_cmp(b.1))
        .ok_or_else(|| ClientError::BadResponse("no labels".into()))?;
    best.parse()
        .map_err(|_| ClientError::BadResponse(format!("unknown label {best:?}")))
}

#[async_trait]
impl SentimentClassifier for SentimentClient {
    async fn classify(&self, text: &str) -> Result<SentimentLabel, HarmonyError> {
        self.classify_text(text)
            .await
            .map_err(|e| HarmonyError::collaborator("sentiment", e))
    }
}
