//! External encode and mux steps.
//!
//! Both steps are synchronous: the pipeline waits for the process to exit, then trusts only the
//! exit status and the existence of a non-empty output file.

/// `ffmpeg` encode/mux jobs and the tool that runs them.
pub mod ffmpeg;
/// Process runner abstraction.
pub mod runner;
