//! Snapshot comparison
//!
//! - `tree_diff`: file-level changes between two trees, or between flattened
//!   snapshots such as a tree and the working directory
//!
//! Changes are keyed by full path; directories never appear on their own.

pub mod tree_diff;
