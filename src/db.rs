//! Relational repository on SQLite.
//!
//! [`SqliteRepository`] implements the same contract as the in-memory
//! backend. Every write runs inside its own [`UnitOfWork`]: committed on
//! success, rolled back on any error.

mod schema;
mod session;

pub use schema::SqliteRepository;
pub use session::UnitOfWork;

use crate::error::{AppError, Result};
use chrono::{DateTime, Utc};

/// Current timestamp in microseconds.
pub fn now_timestamp_micros() -> i64 {
    Utc::now().timestamp_micros()
}

/// Convert a stored microsecond timestamp to DateTime.
pub fn timestamp_to_datetime(micros: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(micros).unwrap_or_else(Utc::now)
}

/// Convert an entity id to the signed integer SQLite stores.
pub(crate) fn sql_id(id: u64) -> Result<i64> {
    i64::try_from(id).map_err(|_| AppError::Validation(format!("Id {} is out of range", id)))
}

/// Convert a stored integer back to an entity id.
pub(crate) fn entity_id(id: i64) -> Result<u64> {
    u64::try_from(id).map_err(|_| AppError::Storage(format!("Stored id {} is negative", id)))
}

/// Build a mapper from a rusqlite error to a storage error.
pub(crate) fn storage(action: &'static str) -> impl FnOnce(rusqlite::Error) -> AppError {
    move |e| AppError::Storage(format!("Failed to {}: {}", action, e))
}
