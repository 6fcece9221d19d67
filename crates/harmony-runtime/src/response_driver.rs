//! [`ResponseDriver`] – HarmonyBot's voice.
//!
//! Communicates with a vision-capable model server that exposes an
//! OpenAI-compatible `/v1/chat/completions` endpoint.  Each request carries
//! the HarmonyBot persona as the system message and, as the user message,
//! the transcript, the per-person facial readings and the turn's frame,
//! JPEG-encoded and attached as a base64 `data:` URL.
//!
//! # Example
//!
//! ```rust,no_run
//! use harmony_runtime::response_driver::ResponseDriver;
//!
//! let driver = ResponseDriver::new("http://localhost:8080", "llava");
//! // Requires a running model server – skipped in unit tests.
//! // let reply = driver.respond("You never listen!", &readings, &frame).await?;
//! ```

use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use harmony_types::{EmotionReading, Frame, HarmonyError};
use image::ExtendedColorType;
use image::codecs::jpeg::JpegEncoder;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::collaborators::ResponseGenerator;
use crate::error::ClientError;

// ─────────────────────────────────────────────────────────────────────────────
// Persona
// ─────────────────────────────────────────────────────────────────────────────

/// System message sent with every request.
pub const HARMONY_SYSTEM_PROMPT: &str = "\
You are HarmonyBot, an emotion-aware social robot designed for conflict mediation. \
You are a wise, empathetic and friendly robot. \
Your role is to detect the emotional tone of conversations and respond with gentle prompts, \
empathetic language, humor, or subtle tone shifts to de-escalate tension and encourage calm, \
respectful dialogue. Seek to understand the root cause of the conflict and offer creative, \
practical and peaceful solutions. If the participants may not know who you are, introduce \
yourself naturally based on the flow of conversation.";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Quality used when compressing the turn's frame.
pub const JPEG_QUALITY: u8 = 85;

// ─────────────────────────────────────────────────────────────────────────────
// Wire shapes (OpenAI-compatible)
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Content {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
struct OutgoingMessage {
    role: &'static str,
    content: Content,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<OutgoingMessage>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    content: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// ResponseDriver
// ─────────────────────────────────────────────────────────────────────────────

/// Async client for an OpenAI-compatible vision chat endpoint.
pub struct ResponseDriver {
    base_url: String,
    model: String,
    api_key: Option<String>,
    max_tokens: u32,
    temperature: f32,
    timeout: Duration,
    client: reqwest::Client,
}

impl ResponseDriver {
    /// Create a driver for `base_url` (e.g. `"http://localhost:8080"`) using
    /// `model`.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: None,
            max_tokens: 600,
            temperature: 0.7,
            timeout: DEFAULT_TIMEOUT,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_api_key(mut self, key: Option<String>) -> Self {
        self.api_key = key;
        self
    }

    pub fn with_sampling(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Ask the model for HarmonyBot's reply.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Http`] if the request fails, or
    /// [`ClientError::BadResponse`] if the reply has no choices.
    pub async fn respond(
        &self,
        transcript: &str,
        emotions: &EmotionReading,
        frame: &Frame,
    ) -> Result<String, ClientError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = self.request(transcript, emotions, frame)?;

        let mut request = self.client.post(&url).timeout(self.timeout).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response: ChatResponse = request
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let reply = response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ClientError::BadResponse("empty choices array".into()))?;
        debug!(chars = reply.len(), "response generated");
        Ok(reply)
    }

    fn request(
        &self,
        transcript: &str,
        emotions: &EmotionReading,
        frame: &Frame,
    ) -> Result<ChatRequest<'_>, ClientError> {
        Ok(ChatRequest {
            model: &self.model,
            messages: vec![
                OutgoingMessage {
                    role: "system",
                    content: Content::Text(HARMONY_SYSTEM_PROMPT.to_string()),
                },
                OutgoingMessage {
                    role: "user",
                    content: Content::Parts(vec![
                        ContentPart::Text {
                            text: build_prompt(transcript, emotions)?,
                        },
                        ContentPart::ImageUrl {
                            image_url: ImageUrl {
                                url: image_data_url(frame)?,
                            },
                        },
                    ]),
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            stream: false,
        })
    }
}

/// User prompt carrying the conversation and the facial readings.
pub fn build_prompt(transcript: &str, emotions: &EmotionReading) -> Result<String, ClientError> {
    let people = serde_json::to_string(emotions)
        .map_err(|e| ClientError::BadResponse(format!("cannot encode emotion readings: {e}")))?;
    Ok(format!(
        "HarmonyBot emotion-aware social robot for conflict mediation. This is the current situation.\n\
         Inputs:\n\
         - Conversation: {transcript}\n\
         - People emotion labels with face coordinates: {people}\n\
         You also receive an image of the people. Detect the emotions and their reasons in the \
         conversation and the image, and respond in a helpful and emotionally aware manner with \
         gentle prompts, tone shifts, humor or empathy to de-escalate tension and promote calm \
         communication. Keep it short and human. Do not call anyone \"Person 1\" or \"Person 2\"; \
         refer to each person by a characteristic you noticed."
    ))
}

/// Compress a raw RGB24 frame to JPEG.
///
/// # Errors
///
/// [`ClientError::Encode`] when the frame has no pixels or its buffer does
/// not hold exactly `width * height * 3` bytes.
pub fn encode_jpeg(frame: &Frame) -> Result<Vec<u8>, ClientError> {
    let expected = frame
        .rgb_len()
        .ok_or_else(|| ClientError::Encode("frame dimensions overflow".into()))?;
    if expected == 0 {
        return Err(ClientError::Encode("frame has no pixels".into()));
    }
    if frame.data.len() != expected {
        return Err(ClientError::Encode(format!(
            "{}x{} RGB frame needs {expected} bytes, got {}",
            frame.width,
            frame.height,
            frame.data.len()
        )));
    }

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY)
        .encode(&frame.data, frame.width, frame.height, ExtendedColorType::Rgb8)
        .map_err(|e| ClientError::Encode(e.to_string()))?;
    Ok(jpeg)
}

/// `data:` URL carrying the frame as a base64 JPEG.
pub fn image_data_url(frame: &Frame) -> Result<String, ClientError> {
    Ok(format!("data:image/jpeg;base64,{}", BASE64.encode(encode_jpeg(frame)?)))
}

#[async_trait]
impl ResponseGenerator for ResponseDriver {
    async fn generate(
        &self,
        transcript: &str,
        emotions: &EmotionReading,
        frame: &Frame,
    ) -> Result<String, HarmonyError> {
        self.respond(transcript, emotions, frame)
            .await
            .map_err(|e| HarmonyError::collaborator("response", e))
    }
}
