//! Shared value types, cancellation and the error taxonomy.

pub mod cancel;
pub mod core;
pub mod error;
