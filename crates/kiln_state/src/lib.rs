//! Persisted per-variant build state.
//!
//! Between builds the engine remembers what it last saw and produced: a
//! content-hash snapshot of the project tree, the per-file dependency
//! graph, the configuration fingerprint, and the last build result. The
//! [`BuildStateStore`] persists one [`BuildState`] per build variant,
//! fail-safe on load so corruption costs a rebuild rather than an error,
//! and [`compute_diff`] turns the stored snapshot plus the current tree
//! into the incremental work decision.

#![warn(missing_docs)]

pub mod diff;
pub mod error;
pub mod record;
pub mod snapshot;
pub mod store;

pub use diff::{compute_diff, diff_trees, TreeDiff};
pub use error::StateError;
pub use record::{BuildResult, BuildState};
pub use snapshot::FileSnapshot;
pub use store::BuildStateStore;
