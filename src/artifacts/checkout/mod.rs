//! Checkout of a snapshot onto the working directory
//!
//! Local modifications are checked by the caller before a migration is
//! planned; the migration itself only moves files.

pub mod migration;
