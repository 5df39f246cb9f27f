//! Zoom schedule construction.
//!
//! A schedule is computed once per run and handed to the frame acquirer unchanged.

/// Schedule types and the builder.
pub mod builder;
