//! `harmony-perception` – Continuous people tracking
//!
//! Turns the latest camera frame into a head-tracking update, once per
//! iteration, for as long as the process runs.
//!
//! # Modules
//!
//! - [`detection`] – [`Detection`][detection::Detection] and
//!   [`count_people`][detection::count_people]: confidence-filtered person
//!   counting over raw detector output, plus the
//!   [`PersonDetector`][detection::PersonDetector] seam for the vision model.
//! - [`perception_loop`] – [`PerceptionLoop`][perception_loop::PerceptionLoop]:
//!   reads the [`FrameCache`][harmony_hal::FrameCache], counts people and
//!   submits the count through the
//!   [`ModeArbiter`][harmony_kernel::ModeArbiter].

pub mod detection;
pub mod perception_loop;

pub use detection::{Detection, PERSON_CLASS, PersonDetector, StaticDetector, count_people};
pub use perception_loop::{IterationOutcome, PerceptionConfig, PerceptionLoop};
