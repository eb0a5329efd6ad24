//! Catalog entity model.
//!
//! Entities carry their own invariants and know nothing about storage.
//! Shared entities are handed out as `Arc<T>`; users, whose review list and
//! reading collection change after insertion, are shared as [`SharedUser`].

pub mod author;
pub mod book;
pub mod publisher;
pub mod reading;
pub mod review;
pub mod tag;
pub mod user;

pub use author::{Author, AuthorId};
pub use book::{Book, BookId};
pub use publisher::Publisher;
pub use reading::{
    BookEntry, ReadingCollection, STATUS_COMPLETED, STATUS_PLAN_TO_READ, STATUS_READING,
};
pub use review::Review;
pub use tag::Tag;
pub use user::{SharedUser, User};

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};

/// Generate a random 32-byte token, URL-safe base64 encoded.
pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::random();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Trim a string, returning `None` when nothing is left.
pub(crate) fn non_empty_trimmed(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}
