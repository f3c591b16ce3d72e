//! Dependency tracking for incremental builds.
//!
//! This crate provides two graphs: a [`DependencyGraph`] recording which
//! files a compilation unit reads, used to widen a set of changed files to
//! everything affected by them, and a [`WorkspaceRegistry`] recording which
//! library projects an application project links against.

#![warn(missing_docs)]

pub mod graph;
pub mod workspace;

pub use graph::DependencyGraph;
pub use workspace::WorkspaceRegistry;
