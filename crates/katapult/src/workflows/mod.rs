//! Workflow engines exposed by the platform.

pub mod candidature;
