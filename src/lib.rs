//! shelf-rs: a book catalog with reviews, reading lists and recommendations.
//!
//! Application code talks to one [`Repository`] contract. Two backends
//! implement it: [`MemoryRepository`], repopulated from the bulk sources on
//! every run, and [`SqliteRepository`], which persists across runs.
//!
//! # Features
//!
//! - Books, authors, publishers, tags, reviews and users
//! - Title, author, tag, publisher and year-range search
//! - Reproducible related-book recommendations
//! - Reading collections with progress tracking
//! - Parallel bulk import of line-delimited JSON sources
//! - Registration and login

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Registration and login.
pub mod auth;
/// Configuration and CLI.
pub mod config;
/// SQLite backend.
pub mod db;
/// Error types.
pub mod error;
/// Bulk import of the catalog sources.
pub mod import;
/// Catalog and user models.
pub mod library;
/// Repository contract and the in-memory backend.
pub mod repository;
/// Catalog search.
pub mod search;

#[cfg(test)]
mod tests;

pub use config::{Cli, Command, Config};
pub use db::SqliteRepository;
pub use error::{AppError, Result};
pub use repository::{MemoryRepository, Repository, RepositoryHandle};
