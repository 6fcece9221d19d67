//! `harmony-runtime` – The conversational turn engine
//!
//! Sequences one turn of conversation at a time: capture what was said and
//! what the camera sees, analyse both, decide whether the mood calls for a
//! reaction, and if so take the actuator channel away from head tracking
//! for as long as the reaction lasts.
//!
//! # Modules
//!
//! - [`orchestrator`] – [`Orchestrator`][orchestrator::Orchestrator]: the
//!   CAPTURE → ANALYZE → DECIDE → REACT/SKIP state machine and its single
//!   error-recovery boundary.
//! - [`collaborators`] – async traits for the external models and devices
//!   the orchestrator drives (capture, analysis, response generation,
//!   speech).
//! - [`decision`] – [`should_react`][decision::should_react]: the rule that
//!   turns a sentiment and a set of facial readings into a yes/no.
//! - [`sentiment_client`] – [`SentimentClient`][sentiment_client::SentimentClient]:
//!   zero-shot text classification over HTTP.
//! - [`response_driver`] – [`ResponseDriver`][response_driver::ResponseDriver]:
//!   an OpenAI-compatible vision chat client that writes HarmonyBot's reply.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: installs the
//!   global `tracing` subscriber with an optional OTLP span exporter.

pub mod collaborators;
pub mod decision;
pub mod error;
pub mod orchestrator;
pub mod response_driver;
pub mod sentiment_client;
pub mod telemetry;

pub use collaborators::{
    CachedFrameCapture, FacialEmotionAnalyzer, FrameCapture, FrameFilter, IdentityFilter,
    ResponseGenerator, SentimentClassifier, SpeechSynthesizer, UtteranceCapture,
};
pub use decision::should_react;
pub use error::ClientError;
pub use orchestrator::{Collaborators, Orchestrator, OrchestratorConfig, TurnOutcome};
pub use response_driver::{HARMONY_SYSTEM_PROMPT, ResponseDriver};
pub use sentiment_client::SentimentClient;
