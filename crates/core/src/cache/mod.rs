//! SQLite-backed fingerprint cache for completed analyses.
//!
//! This module provides a content-addressed result cache using SQLite
//! with async access via tokio-rusqlite. It supports:
//!
//! - Fingerprint keys using SHA-256 over normalized input text
//! - Automatic schema migrations
//! - TTL expiry with lazy reads and a background sweep
//! - Capacity eviction (expired first, then oldest insertion)

pub mod connection;
pub mod fingerprint;
pub mod migrations;
pub mod store;

pub use crate::Error;

pub use connection::CacheDb;
pub use fingerprint::compute_fingerprint;
pub use store::{CacheStats, ResultCache};
