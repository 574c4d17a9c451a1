//! Database entry types
//!
//! Database entries reference objects together with their mode.

pub mod database_entry;
