//! Terminal stand-ins for the microphone, the speaker and the face model.
//!
//! Each line typed on stdin is one utterance.  End of input cancels the
//! shared token so both loops wind down.

use async_trait::async_trait;
use colored::Colorize;
use harmony_runtime::{FacialEmotionAnalyzer, SpeechSynthesizer, UtteranceCapture};
use harmony_types::{EmotionReading, Frame, HarmonyError};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Reads utterances line by line from `reader`.
pub struct LineUtterances<R> {
    reader: Mutex<R>,
    cancel: CancellationToken,
}

impl<R: AsyncBufRead + Unpin + Send> LineUtterances<R> {
    pub fn new(reader: R, cancel: CancellationToken) -> Self {
        Self {
            reader: Mutex::new(reader),
            cancel,
        }
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> UtteranceCapture for LineUtterances<R> {
    async fn capture_utterance(&self) -> Result<String, HarmonyError> {
        let mut line = String::new();
        let n = self
            .reader
            .lock()
            .await
            .read_line(&mut line)
            .await
            .map_err(|e| HarmonyError::collaborator("transcription", e))?;
        if n == 0 {
            info!("input closed");
            self.cancel.cancel();
        }
        Ok(line.trim().to_string())
    }
}

/// Prints HarmonyBot's replies.
#[derive(Debug, Default)]
pub struct ConsoleSpeech;

#[async_trait]
impl SpeechSynthesizer for ConsoleSpeech {
    async fn speak(&self, text: &str) -> Result<(), HarmonyError> {
        println!("  {} {}", "HarmonyBot:".bold().magenta(), text);
        Ok(())
    }
}

/// Reports no faces; the text sentiment alone drives the decision.
#[derive(Debug, Default)]
pub struct NoFaceAnalyzer;

#[async_trait]
impl FacialEmotionAnalyzer for NoFaceAnalyzer {
    async fn analyze(&self, _frame: &Frame) -> Result<EmotionReading, HarmonyError> {
        Ok(EmotionReading::new())
    }
}
