//! # crmsync Testkit
//!
//! Test utilities for crmsync.
//!
//! This crate provides:
//! - Record, operation and repository fixtures
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust
//! use crmsync_testkit::prelude::*;
//!
//! let repo = seeded_repository(3);
//! assert_eq!(repo.all(crmsync_protocol::EntityType::Customer).len(), 3);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
