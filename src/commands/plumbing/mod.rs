//! Plumbing commands
//!
//! - `cat-file`: decode an object by id, abbreviated id or branch

pub mod cat_file;
