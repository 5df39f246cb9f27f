//! Run orchestration: configuration, stage sequencing and artifact publication.

/// Pipeline configuration and presets.
pub mod config;
/// The stage machine that drives one run end to end.
pub mod orchestrator;
