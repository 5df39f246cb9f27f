//! Frame acquisition: bounded parallel tile fetching into the workspace.

/// Fetch scheduling, retries and frame persistence.
pub mod frames;
