//! Commit history traversal
//!
//! - `rev_list`: first-parent walk from a tip down to the root commit

pub mod rev_list;
