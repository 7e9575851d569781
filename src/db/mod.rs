//! SQLite storage for rewards, holdings, ledger postings and reference data.
//!
//! This module provides:
//! - Database initialization and the embedded schema
//! - SQLite pragma configuration
//! - The `Repository` used by every other layer

pub mod migrations;
pub mod repo;

pub use migrations::init_db;
pub use repo::{Repository, ReversalCommit};
