//! # FestConnect Core
//!
//! Client-side persistence for a contact-exchange app:
//! - Record store: versioned SQLite collections with indexed lookup
//! - Domain repository: festivals, connections, per-festival profiles
//! - Session façade: one-time initialization and current-festival scoping
//! - Legacy import from the old flat key-value store
//! - Duplicate detection for scanned contacts

pub mod config;
pub mod db;
pub mod dedup;
pub mod error;
pub mod legacy;
pub mod repository;
pub mod session;
pub mod time;
pub mod view;

pub use error::{Error, Result};
pub use repository::Repository;
pub use session::{ScanOutcome, Session};
pub use view::SessionView;
