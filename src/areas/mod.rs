//! Repository areas
//!
//! - `config`: per-repository settings (`gitdist.toml`)
//! - `database`: content-addressed object store for blobs, trees and commits
//! - `refs`: branches, remote-tracking branches and `HEAD`
//! - `repository`: the handle tying the areas together
//! - `workspace`: working directory scanning and checkout

pub mod config;
pub mod database;
pub mod refs;
pub mod repository;
pub mod workspace;
