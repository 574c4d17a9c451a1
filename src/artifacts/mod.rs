//! Data structures and algorithms
//!
//! - `branch`: branch and reference names
//! - `checkout`: planning of working-directory updates
//! - `database`: tree entry types
//! - `diff`: tree-to-tree and flattened snapshot comparison
//! - `log`: commit history traversal
//! - `merge`: merge base search and three-way resolution
//! - `objects`: blob, tree and commit objects
//! - `transport`: remotes, wire protocol and sync sessions

pub mod branch;
pub mod checkout;
pub mod database;
pub mod diff;
pub mod log;
pub mod merge;
pub mod objects;
pub mod transport;
