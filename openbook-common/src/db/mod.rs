//! Database models and initialization

pub mod init;

pub use init::{create_catalog_schema, init_database};
