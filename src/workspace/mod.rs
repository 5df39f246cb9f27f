//! Per-run scratch storage.

/// Workspace acquisition and best-effort release.
pub mod scratch;
