//! Review model.

use super::book::Book;
use crate::error::{AppError, Result};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;

/// Review text used when the source gives none.
pub const MISSING_REVIEW_TEXT: &str = "N/A";

/// A user's review of a book.
///
/// Two reviews are equal only when book, text, rating and creation instant
/// all match, so separately created reviews are practically always distinct.
#[derive(Debug, Clone)]
pub struct Review {
    book: Option<Arc<Book>>,
    user_id: Option<String>,
    review_text: String,
    rating: u8,
    timestamp: DateTime<Utc>,
}

impl Review {
    /// Create a review stamped with the current instant. Fails unless the
    /// rating is within 0..=5.
    pub fn new(
        user_id: Option<&str>,
        book: Option<Arc<Book>>,
        review_text: Option<&str>,
        rating: i64,
    ) -> Result<Self> {
        Self::restore(
            user_id.map(str::to_string),
            book,
            review_text,
            rating,
            Utc::now(),
        )
    }

    /// Rebuild a stored review with its original timestamp.
    pub(crate) fn restore(
        user_id: Option<String>,
        book: Option<Arc<Book>>,
        review_text: Option<&str>,
        rating: i64,
        timestamp: DateTime<Utc>,
    ) -> Result<Self> {
        let rating = check_rating(rating)?;

        Ok(Self {
            book,
            user_id,
            review_text: review_text
                .map(|t| t.trim().to_string())
                .unwrap_or_else(|| MISSING_REVIEW_TEXT.to_string()),
            rating,
            timestamp,
        })
    }

    /// Reviewed book, if it could be resolved.
    pub fn book(&self) -> Option<&Arc<Book>> {
        self.book.as_ref()
    }

    /// Reviewing user's id, if known.
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Review text.
    pub fn review_text(&self) -> &str {
        &self.review_text
    }

    /// Rating in 0..=5.
    pub fn rating(&self) -> u8 {
        self.rating
    }

    /// Creation instant.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Whether this review is about `book`.
    pub fn is_about(&self, book: &Book) -> bool {
        self.book.as_deref() == Some(book)
    }
}

impl PartialEq for Review {
    fn eq(&self, other: &Self) -> bool {
        self.book == other.book
            && self.review_text == other.review_text
            && self.rating == other.rating
            && self.timestamp == other.timestamp
    }
}

/// Validate a review rating, which must be within 0..=5.
pub(crate) fn check_rating(rating: i64) -> Result<u8> {
    u8::try_from(rating)
        .ok()
        .filter(|r| *r <= 5)
        .ok_or_else(|| AppError::Validation(format!("Invalid review rating: {}", rating)))
}

impl fmt::Display for Review {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.book, &self.user_id) {
            (Some(book), Some(user)) => write!(f, "<Review of book {}, by {}>", book, user),
            (Some(book), None) => write!(f, "<Review of book {}>", book),
            (None, _) => write!(f, "<Review>"),
        }
    }
}
