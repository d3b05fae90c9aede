use crate::validation::ValidationReport;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InventoryError {
    #[error("Unrecognized address: {0}")]
    UnrecognizedAddress(String),

    #[error("{operation} is not supported for {address}")]
    UnsupportedAddress {
        operation: &'static str,
        address: String,
    },

    #[error("Validation failed: {0}")]
    ValidationFailed(ValidationReport),

    #[error("Failed to insert row for {address}: {reason}")]
    InsertFailed { address: String, reason: String },

    #[error("Backend rejected write to {address}: {reason}")]
    BackendWriteFailed { address: String, reason: String },

    #[error("Product not found: {0}")]
    NotFound(String),

    #[error("Cannot decode row: {0}")]
    Decode(String),

    #[error("Invalid selection: {0}")]
    InvalidSelection(String),

    #[error("Insufficient stock for product {id}: {available} available, {requested} requested")]
    InsufficientStock {
        id: i64,
        available: i64,
        requested: i64,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, InventoryError>;
