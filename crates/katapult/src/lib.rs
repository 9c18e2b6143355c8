//! Core library for the Katapult incubator platform.
//!
//! Hosts the candidature lifecycle engine: the multi-section application
//! aggregate, completion-gated submission, jury evaluation capture, admin
//! decisions, and the side-effect dispatch that keeps email, the rendered
//! dossier, and the CRM board in step with every status change.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;

pub use error::AppError;
