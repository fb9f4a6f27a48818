//! CLI command implementations.

pub mod resolve;
pub mod serve;
pub mod sync;
