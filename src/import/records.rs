//! Raw records of the catalog sources.
//!
//! The sources are loosely typed: numbers often arrive as strings, empty
//! strings stand for missing values, and a book without shelves carries `""`
//! instead of an empty list.

use crate::error::{AppError, Result};
use serde::Deserialize;
use std::str::FromStr;

/// A scalar that may be encoded as a JSON string, number or boolean.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    /// JSON boolean.
    Bool(bool),
    /// JSON integer.
    Int(i64),
    /// JSON float.
    Float(f64),
    /// JSON string.
    Text(String),
}

impl Default for Scalar {
    fn default() -> Self {
        Scalar::Text(String::new())
    }
}

impl Scalar {
    /// Parse the value, `None` when it is an empty string.
    pub fn parse<T: FromStr>(&self, field: &str) -> Result<Option<T>> {
        let text = match self {
            Scalar::Text(s) if s.trim().is_empty() => return Ok(None),
            Scalar::Text(s) => s.trim().to_string(),
            Scalar::Int(i) => i.to_string(),
            Scalar::Float(f) => f.to_string(),
            Scalar::Bool(b) => b.to_string(),
        };
        text.parse()
            .map(Some)
            .map_err(|_| AppError::Import(format!("Invalid {}: {:?}", field, text)))
    }

    /// Parse a value that must be present.
    pub fn require<T: FromStr>(&self, field: &str) -> Result<T> {
        self.parse(field)?
            .ok_or_else(|| AppError::Import(format!("Missing {}", field)))
    }

    /// Case-insensitive `true`/`false`, anything else is unknown.
    pub fn flag(&self) -> Option<bool> {
        match self {
            Scalar::Bool(b) => Some(*b),
            Scalar::Text(s) if s.trim().eq_ignore_ascii_case("true") => Some(true),
            Scalar::Text(s) if s.trim().eq_ignore_ascii_case("false") => Some(false),
            _ => None,
        }
    }
}

/// A shelf a book was put on by readers.
#[derive(Debug, Clone, Deserialize)]
pub struct Shelf {
    /// Shelf name, becomes a tag.
    pub name: String,
}

/// Shelf list, or an empty string when a book has none.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Shelves {
    /// Shelves present.
    List(Vec<Shelf>),
    /// Placeholder for no shelves.
    Missing(String),
}

impl Default for Shelves {
    fn default() -> Self {
        Shelves::List(Vec::new())
    }
}

impl Shelves {
    /// Non-blank shelf names in source order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        let shelves: &[Shelf] = match self {
            Shelves::List(list) => list,
            Shelves::Missing(_) => &[],
        };
        shelves
            .iter()
            .map(|s| s.name.trim())
            .filter(|name| !name.is_empty())
    }
}

/// Author reference inside a book record.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorRef {
    /// Referenced author id.
    pub author_id: Scalar,
}

/// One line of the books source.
#[derive(Debug, Clone, Deserialize)]
pub struct BookRecord {
    /// Book id.
    pub book_id: Scalar,
    /// Title.
    pub title: String,
    /// Description, empty when unknown.
    #[serde(default)]
    pub description: String,
    /// Publisher name, empty when unknown.
    #[serde(default)]
    pub publisher: String,
    /// Release year.
    #[serde(default)]
    pub publication_year: Scalar,
    /// `"true"` / `"false"`, case-insensitive.
    #[serde(default)]
    pub is_ebook: Scalar,
    /// Page count.
    #[serde(default)]
    pub num_pages: Scalar,
    /// Average reader rating.
    #[serde(default)]
    pub average_rating: Scalar,
    /// Cover image URL.
    #[serde(default)]
    pub image_url: String,
    /// Reader shelves, used as tags.
    #[serde(default)]
    pub popular_shelves: Shelves,
    /// Authors in credit order.
    #[serde(default)]
    pub authors: Vec<AuthorRef>,
}

/// One line of the authors source.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorRecord {
    /// Author id.
    pub author_id: Scalar,
    /// Full name.
    pub name: String,
}

/// One line of the reviews source.
#[derive(Debug, Clone, Deserialize)]
pub struct ReviewRecord {
    /// Id of the reviewing user.
    #[serde(default)]
    pub user_id: String,
    /// Id of the reviewed book.
    pub book_id: Scalar,
    /// Review text.
    #[serde(default)]
    pub review_text: Option<String>,
    /// Rating from 0 to 5.
    pub rating: Scalar,
}
