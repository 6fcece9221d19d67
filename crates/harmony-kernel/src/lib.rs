//! `harmony-kernel` – Actuator channel arbitration
//!
//! Two producers compete for the one actuator link: the perception loop,
//! which wants to keep the head pointed at people, and the conversational
//! orchestrator, which needs the robot's full attention while it reacts.
//!
//! # Modules
//!
//! - [`mode_arbiter`] – [`ModeArbiter`][mode_arbiter::ModeArbiter]: the
//!   `TRACKING` / `RESPONDING` gate.  Perception traffic is forwarded to the
//!   [`ActuatorClient`][harmony_hal::ActuatorClient] only while tracking, and
//!   the mode check and the send happen under one lock.

pub mod mode_arbiter;

pub use mode_arbiter::{ArbiterStats, ModeArbiter};
