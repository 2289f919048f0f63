//! Record store backends for hourly sensor records
//!
//! `DbClient` writes to an existing MySQL schema - NO migrations.
//! `MemoryStore` keeps records in process and backs tests and
//! deployments without a database.

pub mod client;
pub mod memory;
pub mod queries;
pub mod schema;

pub use client::*;
pub use memory::*;
pub use schema::*;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Database connection error: {0}")]
    ConnectionError(#[from] sqlx::Error),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Record not found: {0}")]
    NotFound(sensorhub_core::RecordId),
}

pub type DbResult<T> = Result<T, DbError>;
