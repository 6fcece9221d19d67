//! `harmony-hal` – Actuator link & camera plumbing
//!
//! Everything that touches the robot's hardware boundary lives here.
//!
//! # Modules
//!
//! - [`frame_cache`] – [`FrameCache`][frame_cache::FrameCache]: the latest
//!   camera frame, shared by the capture pump and every consumer.
//! - [`camera`] – the [`Camera`][camera::Camera] trait and
//!   [`spawn_capture_pump`][camera::spawn_capture_pump], which keeps the cache
//!   populated from a blocking capture device.
//! - [`rate_limit`] – [`KindLimiter`][rate_limit::KindLimiter]: per-kind
//!   minimum-interval gate.
//! - [`transport`] – the [`Transport`][transport::Transport] seam and its
//!   HTTP implementation.
//! - [`actuator_client`] – [`ActuatorClient`][actuator_client::ActuatorClient]:
//!   priority- and kind-aware sends, bounded retry and the reachability probe.
//! - [`sim`] – in-process transport and camera for tests and headless runs.

pub mod actuator_client;
pub mod camera;
pub mod frame_cache;
pub mod rate_limit;
pub mod sim;
pub mod transport;

pub use actuator_client::{ActuatorClient, ActuatorConfig, SendOutcome, SkipReason};
pub use camera::{Camera, spawn_capture_pump};
pub use frame_cache::FrameCache;
pub use rate_limit::{KindLimiter, KindPolicy};
pub use sim::{SimCamera, SimTransport};
pub use transport::{HttpTransport, Transport, TransportError};
