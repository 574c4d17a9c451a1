//! Object types and their canonical encoding
//!
//! Every piece of content is an immutable object identified by the SHA-1 hash
//! of its canonical encoding `<kind> <size>\0<payload>`:
//!
//! - **Blob**: file content (raw bytes)
//! - **Tree**: directory listing (names, modes and object IDs)
//! - **Commit**: snapshot with metadata (tree, parents, author, message)

pub mod blob;
pub mod commit;
pub mod entry_mode;
pub mod object;
pub mod object_id;
pub mod object_type;
pub mod tree;
pub mod tree_builder;

/// Length of a SHA-1 hash in hexadecimal format
pub const OBJECT_ID_LENGTH: usize = 40;
