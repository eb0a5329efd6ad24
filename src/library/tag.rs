//! Tag model.

use super::book::{Book, BookId};
use parking_lot::RwLock;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A shelf tag. Books hold the tag, the tag remembers which books carry it.
#[derive(Debug)]
pub struct Tag {
    name: String,
    tagged_books: RwLock<Vec<BookId>>,
}

impl Tag {
    /// Create a tag with no books.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tagged_books: RwLock::new(Vec::new()),
        }
    }

    /// Restore a tag with known back-references (relational loads).
    pub(crate) fn with_books(name: impl Into<String>, books: Vec<BookId>) -> Self {
        Self {
            name: name.into(),
            tagged_books: RwLock::new(books),
        }
    }

    /// Tag text.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ids of the books carrying this tag, in tagging order.
    pub fn tagged_books(&self) -> Vec<BookId> {
        self.tagged_books.read().clone()
    }

    /// Attach this tag to `book` and record the back-reference.
    pub fn tag_book(self: &Arc<Self>, book: &mut Book) {
        if book.add_tag(Arc::clone(self)) {
            let mut books = self.tagged_books.write();
            if !books.contains(&book.book_id()) {
                books.push(book.book_id());
            }
        }
    }
}

impl PartialEq for Tag {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Tag {}

impl Hash for Tag {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_book_records_both_sides_once() {
        let tag = Arc::new(Tag::new("magic"));
        let mut book = Book::new(7, "Spellbook").unwrap();

        tag.tag_book(&mut book);
        tag.tag_book(&mut book);

        assert_eq!(book.tags().len(), 1);
        assert!(book.has_tag("magic"));
        assert_eq!(tag.tagged_books(), vec![7]);
    }
}
