//! Merge algorithms
//!
//! - `merge_base`: breadth-first common ancestor search and ancestry checks
//! - `three_way`: per-path resolution of two change sets against their base

pub mod merge_base;
pub mod three_way;
