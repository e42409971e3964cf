//! Record store: schema, upgrades and typed collection access

pub mod init;
pub mod migrations;
pub mod models;
pub mod schema;
pub mod store;

pub use init::{open, open_file, open_memory};
pub use migrations::{current_schema_version, CURRENT_SCHEMA_VERSION};
pub use models::*;
pub use store::{Draft, Record, RecordStore, SqlValue, StoreTransaction};
