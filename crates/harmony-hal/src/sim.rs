//! In-process stand-ins for the actuator controller and the camera.
//!
//! [`SimTransport`] records every call it receives and answers from a
//! scripted queue, falling back to `200 OK`.  [`SimCamera`] produces a
//! blank frame on every capture.  Together they let the whole HarmonyBot
//! stack run in tests and headless demos without a robot attached.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use harmony_hal::actuator_client::{ActuatorClient, ActuatorConfig};
//! use harmony_hal::sim::SimTransport;
//! use harmony_types::ActuatorCommand;
//!
//! let rt = tokio::runtime::Runtime::new().unwrap();
//! rt.block_on(async {
//!     let transport = Arc::new(SimTransport::new());
//!     let client = ActuatorClient::new(transport.clone(), ActuatorConfig::default());
//!     assert!(client.send(ActuatorCommand::Reset).await.is_delivered());
//!     assert_eq!(transport.calls_to("/reset"), 1);
//! });
//! ```

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use harmony_types::{Frame, HarmonyError, rgb_len};
use parking_lot::Mutex;
use serde_json::Value;

use crate::camera::Camera;
use crate::transport::{Transport, TransportError};

// ────────────────────────────────────────────────────────────────────────────
// Simulated transport
// ────────────────────────────────────────────────────────────────────────────

/// One call observed by [`SimTransport`].
#[derive(Debug, Clone)]
pub struct SimCall {
    pub method: &'static str,
    pub path: String,
    /// `None` for `GET`.
    pub body: Option<Value>,
    pub timeout: Duration,
    /// When the call reached the transport.
    pub at: Instant,
}

type Scripted = Result<u16, TransportError>;

#[derive(Default)]
struct SimState {
    calls: Vec<SimCall>,
    script: VecDeque<Scripted>,
    fallback: Option<Scripted>,
}

/// Recording [`Transport`] with scriptable responses.
#[derive(Default)]
pub struct SimTransport {
    state: Mutex<SimState>,
    latency: Duration,
}

impl SimTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency` before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Answer the next unscripted call with `status`.
    pub fn push_status(&self, status: u16) {
        self.state.lock().script.push_back(Ok(status));
    }

    /// Fail the next unscripted call with `error`.
    pub fn push_error(&self, error: TransportError) {
        self.state.lock().script.push_back(Err(error));
    }

    /// Fail every call with `error` once the script is exhausted.
    pub fn fail_always(&self, error: TransportError) {
        self.state.lock().fallback = Some(Err(error));
    }

    /// Answer every call with `status` once the script is exhausted.
    pub fn respond_always(&self, status: u16) {
        self.state.lock().fallback = Some(Ok(status));
    }

    /// Snapshot of all calls in arrival order.
    pub fn calls(&self) -> Vec<SimCall> {
        self.state.lock().calls.clone()
    }

    /// Number of calls made to `path`.
    pub fn calls_to(&self, path: &str) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.path == path)
            .count()
    }

    /// Bodies posted to `path`, in order.
    pub fn bodies_to(&self, path: &str) -> Vec<Value> {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.path == path)
            .filter_map(|c| c.body.clone())
            .collect()
    }

    async fn answer(&self, call: SimCall) -> Scripted {
        let reply = {
            let mut state = self.state.lock();
            state.calls.push(call);
            state
                .script
                .pop_front()
                .or_else(|| state.fallback.clone())
                .unwrap_or(Ok(200))
        };
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        reply
    }
}

#[async_trait]
impl Transport for SimTransport {
    async fn post_json(
        &self,
        path: &str,
        body: &Value,
        timeout: Duration,
    ) -> Result<u16, TransportError> {
        self.answer(SimCall {
            method: "POST",
            path: path.to_string(),
            body: Some(body.clone()),
            timeout,
            at: Instant::now(),
        })
        .await
    }

    async fn get(&self, path: &str, timeout: Duration) -> Result<u16, TransportError> {
        self.answer(SimCall {
            method: "GET",
            path: path.to_string(),
            body: None,
            timeout,
            at: Instant::now(),
        })
        .await
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Simulated camera
// ────────────────────────────────────────────────────────────────────────────

/// A simulated camera that returns a blank RGB frame.
pub struct SimCamera {
    id: String,
    width: u32,
    height: u32,
}

impl SimCamera {
    /// A 4×4 camera with the given identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self::with_resolution(id, 4, 4)
    }

    pub fn with_resolution(id: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            id: id.into(),
            width,
            height,
        }
    }
}

impl Camera for SimCamera {
    fn id(&self) -> &str {
        &self.id
    }

    /// # Errors
    ///
    /// [`HarmonyError::HardwareFault`] if the resolution is too large to
    /// allocate a frame buffer for.
    fn capture(&mut self) -> Result<Frame, HarmonyError> {
        let len = rgb_len(self.width, self.height).ok_or_else(|| HarmonyError::HardwareFault {
            component: self.id.clone(),
            details: format!("{}x{} frame does not fit in memory", self.width, self.height),
        })?;
        Ok(Frame::new(self.width, self.height, vec![0u8; len]))
    }
}
