//! Camera control plane: serialized hardware jobs gated by readiness state,
//! 3A actions driven by capture results, rotation bookkeeping between
//! coordinate frames, and mapping of UI touches into metering regions.

pub mod actions;
pub mod angles;
pub mod capture;
pub mod config;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod metering;
pub mod orchestrator;
pub mod simulator;
pub mod state_machine;
pub mod worker;

pub use engine::CameraEngine;
pub use error::{CameraError, JobError};
