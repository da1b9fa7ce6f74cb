//! # Storefront - data layer for a small hardware shop
//!
//! Storefront provides:
//! - A query gateway over a single SQLite connection with name-keyed rows
//! - Mutations that report constraint violations as values, never as panics
//! - A schema archiver that backs the whole store up to XML and restores it
//! - Typed shop operations (catalog, accounts, basket, checkout, reviews)

pub mod storage;
pub mod archive;
pub mod shop;
pub mod credentials;
pub mod lock;
pub mod config;
pub mod output;
pub mod ui;

// Re-exports for convenient access
pub use storage::{Gateway, Row, Table, Fetch, MutationFailure, FailureKind, IntegrityKind};
pub use archive::{Archiver, ExportOptions};
pub use shop::Shop;
pub use lock::InstanceLock;

/// Result type alias for Storefront operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Storefront operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Malformed backup document: {0}")]
    Backup(String),

    #[error("Unknown table: {0}")]
    UnknownTable(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Column {column}: {problem}")]
    Column { column: String, problem: String },

    #[error("Mutation failed: {0}")]
    Mutation(#[from] MutationFailure),

    #[error("Another instance is already running (lock file {0})")]
    AlreadyRunning(std::path::PathBuf),
}

impl From<quick_xml::events::attributes::AttrError> for Error {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        Error::Xml(err.into())
    }
}
