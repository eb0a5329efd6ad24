//! Reading collections and per-book progress entries.

use super::book::{Book, BookId};
use crate::error::Result;
use crate::repository::Repository;
use std::fmt;
use std::sync::Arc;

/// Status for a book the user intends to read.
pub const STATUS_PLAN_TO_READ: &str = "Plan to read";
/// Status for a book in progress.
pub const STATUS_READING: &str = "Reading";
/// Status forced once all pages are read.
pub const STATUS_COMPLETED: &str = "Completed";

/// Default name of the collection every user starts with.
pub const DEFAULT_COLLECTION_NAME: &str = "reading list";

/// A user's progress on one book.
///
/// Invariant: whenever `pages_read` equals the book's page count the status
/// is [`STATUS_COMPLETED`]. Page counts beyond the book's length are ignored.
#[derive(Debug, Clone)]
pub struct BookEntry {
    book: Arc<Book>,
    status: String,
    pages_read: u32,
}

impl BookEntry {
    /// Create an entry. `pages_read` past the end of the book is ignored and
    /// the entry starts at page 0.
    pub fn new(book: Arc<Book>, status: &str, pages_read: u32) -> Self {
        let mut entry = Self {
            book,
            status: status.to_string(),
            pages_read: 0,
        };
        entry.update_pages_read(pages_read);
        entry
    }

    /// Referenced book.
    pub fn book(&self) -> &Arc<Book> {
        &self.book
    }

    /// Status text.
    pub fn status(&self) -> &str {
        &self.status
    }

    /// Pages read so far.
    pub fn pages_read(&self) -> u32 {
        self.pages_read
    }

    /// Replace the status text.
    pub fn update_status(&mut self, status: &str) {
        self.status = status.to_string();
    }

    /// Record progress. Values past the last page are ignored. Sitting on
    /// the last page completes the entry, also for a book without pages.
    pub fn update_pages_read(&mut self, pages_read: u32) {
        let total = self.book.num_pages();
        if pages_read <= total {
            self.pages_read = pages_read;
        }
        if self.pages_read == total {
            self.status = STATUS_COMPLETED.to_string();
        }
    }
}

impl fmt::Display for BookEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Entry {} {}>", self.status, self.book.title())
    }
}

/// Ordered list of book entries owned by exactly one user.
#[derive(Debug, Clone)]
pub struct ReadingCollection {
    owner_id: String,
    name: String,
    entries: Vec<BookEntry>,
}

impl ReadingCollection {
    /// Create an empty collection for the user with `owner_id`.
    pub fn new(owner_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            name: name.into(),
            entries: Vec::new(),
        }
    }

    pub(crate) fn with_entries(
        owner_id: impl Into<String>,
        name: impl Into<String>,
        entries: Vec<BookEntry>,
    ) -> Self {
        Self {
            owner_id: owner_id.into(),
            name: name.into(),
            entries,
        }
    }

    /// Owning user's id.
    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// Collection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Entries in insertion order.
    pub fn book_entries(&self) -> &[BookEntry] {
        &self.entries
    }

    /// Add an entry for `book` and persist it through `repo`.
    ///
    /// The entry is only appended once the repository accepted it.
    pub fn add_entry(
        &mut self,
        repo: &mut dyn Repository,
        book: Arc<Book>,
        status: &str,
        pages_read: u32,
    ) -> Result<()> {
        let entry = BookEntry::new(book, status, pages_read);
        repo.add_entry(self, &entry)?;
        self.entries.push(entry);
        Ok(())
    }

    /// Update status and progress of the entry for `book_id`, persisting the
    /// change. Returns `false` when the book is not in the collection.
    pub fn update_entry(
        &mut self,
        repo: &mut dyn Repository,
        book_id: BookId,
        status: &str,
        pages_read: u32,
    ) -> Result<bool> {
        let Some(index) = self.entries.iter().position(|e| e.book.book_id() == book_id) else {
            return Ok(false);
        };

        let mut entry = self.entries[index].clone();
        entry.update_status(status);
        entry.update_pages_read(pages_read);
        repo.update_entry(self, &entry)?;
        self.entries[index] = entry;
        Ok(true)
    }

    /// Entry for `book_id`, if present.
    pub fn find_entry(&self, book_id: BookId) -> Option<&BookEntry> {
        self.entries.iter().find(|e| e.book.book_id() == book_id)
    }
}
