//! Generic `Camera` trait and the capture pump that keeps the
//! [`FrameCache`] populated.

use std::sync::Arc;
use std::time::Duration;

use harmony_types::{Frame, HarmonyError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::frame_cache::FrameCache;

/// Default capture cadence (≈30 fps).
pub const DEFAULT_CAPTURE_INTERVAL: Duration = Duration::from_millis(33);

/// A camera or image-capture device.
pub trait Camera: Send + Sync {
    /// Stable identifier for this camera, e.g. `"front_rgb"`.
    fn id(&self) -> &str;

    /// Capture and return the next available frame.
    ///
    /// # Errors
    ///
    /// Returns [`HarmonyError::HardwareFault`] if the frame cannot be captured
    /// (e.g. the device is disconnected or the buffer is unavailable).
    fn capture(&mut self) -> Result<Frame, HarmonyError>;
}

/// Run `camera` on a blocking thread, storing every captured frame in
/// `cache` until `cancel` fires.
///
/// Capture errors are logged and skipped; they never stop the pump.
pub fn spawn_capture_pump(
    mut camera: Box<dyn Camera>,
    cache: Arc<FrameCache>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        info!(camera = camera.id(), ?interval, "capture pump started");
        let mut failures: u64 = 0;
        while !cancel.is_cancelled() {
            match camera.capture() {
                Ok(frame) => {
                    if failures > 0 {
                        debug!(camera = camera.id(), failures, "camera recovered");
                        failures = 0;
                    }
                    cache.put(frame);
                }
                Err(e) => {
                    failures += 1;
                    // First failure of a streak only; a dead camera would flood the log.
                    if failures == 1 {
                        warn!(camera = camera.id(), error = %e, "frame capture failed");
                    }
                }
            }
            std::thread::sleep(interval);
        }
        info!(camera = camera.id(), "capture pump stopped");
    })
}
