//! Shared foundational types used across the kiln build engine.
//!
//! This crate provides the content hash used for file snapshots and
//! configuration fingerprints, and the build variant identity type.

#![warn(missing_docs)]

pub mod hash;
pub mod variant;

pub use hash::ContentHash;
pub use variant::BuildVariant;
