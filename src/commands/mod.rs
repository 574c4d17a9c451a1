//! Repository operations
//!
//! Every command is an `impl Repository` block, split the way git splits its
//! commands:
//!
//! - `plumbing`: direct object access (cat-file)
//! - `porcelain`: user-facing workflows (init, clone, commit, fetch, merge, ...)

pub mod plumbing;
pub mod porcelain;
