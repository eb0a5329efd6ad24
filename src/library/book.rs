//! Book metadata model.

use super::author::{Author, AuthorId};
use super::publisher::Publisher;
use super::tag::Tag;
use crate::error::{AppError, Result};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Book identifier.
pub type BookId = u64;

/// A book in the catalog.
///
/// Identity, equality and ordering are by `book_id` only.
#[derive(Debug, Clone)]
pub struct Book {
    book_id: BookId,
    title: String,
    description: Option<String>,
    publisher: Option<Arc<Publisher>>,
    authors: Vec<Arc<Author>>,
    tags: Vec<Arc<Tag>>,
    release_year: Option<u32>,
    ebook: Option<bool>,
    num_pages: u32,
    image_url: Option<String>,
    rating: Option<f64>,
}

impl Book {
    /// Create a book with minimal information. Fails on a negative id or a
    /// blank title.
    pub fn new(book_id: i64, title: &str) -> Result<Self> {
        let book_id = BookId::try_from(book_id)
            .map_err(|_| AppError::Validation(format!("Invalid book id: {}", book_id)))?;

        Ok(Self {
            book_id,
            title: Self::validate_title(title)?,
            description: None,
            publisher: None,
            authors: Vec::new(),
            tags: Vec::new(),
            release_year: None,
            ebook: None,
            num_pages: 0,
            image_url: None,
            rating: None,
        })
    }

    fn validate_title(title: &str) -> Result<String> {
        super::non_empty_trimmed(title)
            .map(str::to_string)
            .ok_or_else(|| AppError::Validation("Book title must not be empty".to_string()))
    }

    /// Book id.
    pub fn book_id(&self) -> BookId {
        self.book_id
    }

    /// Book title.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Change the title. Fails on a blank title.
    pub fn set_title(&mut self, title: &str) -> Result<()> {
        self.title = Self::validate_title(title)?;
        Ok(())
    }

    /// Book description.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Set the description (trimmed).
    pub fn set_description(&mut self, description: &str) {
        self.description = Some(description.trim().to_string());
    }

    /// Publisher, if known.
    pub fn publisher(&self) -> Option<&Arc<Publisher>> {
        self.publisher.as_ref()
    }

    /// Set or clear the publisher.
    pub fn set_publisher(&mut self, publisher: Option<Arc<Publisher>>) {
        self.publisher = publisher;
    }

    /// Authors in insertion order.
    pub fn authors(&self) -> &[Arc<Author>] {
        &self.authors
    }

    /// Add an author. Returns `false` if an author with the same id is
    /// already attached.
    pub fn add_author(&mut self, author: Arc<Author>) -> bool {
        if self.has_author(author.unique_id()) {
            return false;
        }
        self.authors.push(author);
        true
    }

    /// Remove an author by id.
    pub fn remove_author(&mut self, author: &Author) {
        self.authors.retain(|a| a.unique_id() != author.unique_id());
    }

    /// Whether an author with this id is attached.
    pub fn has_author(&self, author_id: AuthorId) -> bool {
        self.authors.iter().any(|a| a.unique_id() == author_id)
    }

    /// Tags in tagging order.
    pub fn tags(&self) -> &[Arc<Tag>] {
        &self.tags
    }

    /// Attach a tag without recording the back-reference. Prefer
    /// [`Tag::tag_book`]. Returns `false` for duplicates.
    pub fn add_tag(&mut self, tag: Arc<Tag>) -> bool {
        if self.has_tag(tag.name()) {
            return false;
        }
        self.tags.push(tag);
        true
    }

    /// Whether the book carries the named tag.
    pub fn has_tag(&self, name: &str) -> bool {
        self.tags.iter().any(|t| t.name() == name)
    }

    /// Release year.
    pub fn release_year(&self) -> Option<u32> {
        self.release_year
    }

    /// Set the release year. Fails on a negative year.
    pub fn set_release_year(&mut self, year: i64) -> Result<()> {
        let year = u32::try_from(year)
            .map_err(|_| AppError::Validation(format!("Invalid release year: {}", year)))?;
        self.release_year = Some(year);
        Ok(())
    }

    /// Ebook flag, if known.
    pub fn ebook(&self) -> Option<bool> {
        self.ebook
    }

    /// Set the ebook flag.
    pub fn set_ebook(&mut self, ebook: bool) {
        self.ebook = Some(ebook);
    }

    /// Number of pages (0 when unknown).
    pub fn num_pages(&self) -> u32 {
        self.num_pages
    }

    /// Set the page count. Negative values are ignored.
    pub fn set_num_pages(&mut self, num_pages: i64) {
        if let Ok(pages) = u32::try_from(num_pages) {
            self.num_pages = pages;
        }
    }

    /// Cover image URL.
    pub fn image_url(&self) -> Option<&str> {
        self.image_url.as_deref()
    }

    /// Set the cover image URL.
    pub fn set_image_url(&mut self, url: impl Into<String>) {
        self.image_url = Some(url.into());
    }

    /// Average rating, strictly between 0 and 5.
    pub fn rating(&self) -> Option<f64> {
        self.rating
    }

    /// Set the rating. Values outside the open interval (0, 5) are dropped.
    pub fn set_rating(&mut self, rating: f64) {
        if rating > 0.0 && rating < 5.0 {
            self.rating = Some(rating);
        }
    }

    /// Get display name for authors.
    pub fn authors_display(&self) -> String {
        if self.authors.is_empty() {
            "Unknown Author".to_string()
        } else {
            self.authors
                .iter()
                .map(|a| a.full_name())
                .collect::<Vec<_>>()
                .join(", ")
        }
    }
}

impl PartialEq for Book {
    fn eq(&self, other: &Self) -> bool {
        self.book_id == other.book_id
    }
}

impl Eq for Book {}

impl Hash for Book {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.book_id.hash(state);
    }
}

impl PartialOrd for Book {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Book {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.book_id.cmp(&other.book_id)
    }
}

impl fmt::Display for Book {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Book {}, book id = {}>", self.title, self.book_id)
    }
}
