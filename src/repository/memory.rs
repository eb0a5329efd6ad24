//! In-memory repository backed by plain append-only lists.

use super::Repository;
use crate::error::{AppError, Result};
use crate::library::{
    Author, AuthorId, Book, BookEntry, BookId, Publisher, ReadingCollection, Review, SharedUser,
    Tag, User,
};
use crate::search::SearchEngine;
use std::sync::Arc;

/// Repository keeping every entity in process memory.
///
/// Lookups are linear scans keyed by each entity's natural identity. Book
/// queries run through a [`SearchEngine`] over the live lists. There is no
/// internal locking: mutation needs `&mut self`.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    books: Vec<Arc<Book>>,
    authors: Vec<Arc<Author>>,
    publishers: Vec<Arc<Publisher>>,
    reviews: Vec<Arc<Review>>,
    tags: Vec<Arc<Tag>>,
    users: Vec<SharedUser>,
}

impl MemoryRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    fn search(&self) -> SearchEngine<'_> {
        SearchEngine::new(&self.books, &self.reviews)
    }

    fn find_author(&self, author_id: AuthorId) -> Option<&Arc<Author>> {
        self.authors.iter().find(|a| a.unique_id() == author_id)
    }

    fn find_publisher(&self, name: &str) -> Option<&Arc<Publisher>> {
        self.publishers.iter().find(|p| p.name() == name)
    }

    fn find_tag(&self, name: &str) -> Option<&Arc<Tag>> {
        self.tags.iter().find(|t| t.name() == name)
    }
}

impl Repository for MemoryRepository {
    fn books(&self) -> Result<Vec<Arc<Book>>> {
        Ok(self.books.clone())
    }

    fn authors(&self) -> Result<Vec<Arc<Author>>> {
        Ok(self.authors.clone())
    }

    fn publishers(&self) -> Result<Vec<Arc<Publisher>>> {
        Ok(self.publishers.clone())
    }

    fn reviews(&self) -> Result<Vec<Arc<Review>>> {
        Ok(self.reviews.clone())
    }

    fn tags(&self) -> Result<Vec<Arc<Tag>>> {
        Ok(self.tags.clone())
    }

    fn users(&self) -> Result<Vec<SharedUser>> {
        Ok(self.users.clone())
    }

    fn get_book(&self, book_id: BookId) -> Result<Option<Arc<Book>>> {
        Ok(self.books.iter().find(|b| b.book_id() == book_id).cloned())
    }

    fn get_user(&self, user_name: &str) -> Result<Option<SharedUser>> {
        let Some(key) = User::normalize_name(user_name) else {
            return Ok(None);
        };

        let mut matches = self
            .users
            .iter()
            .filter(|u| u.read().user_name() == Some(key.as_str()));
        let first = matches.next().cloned();
        if first.is_some() && matches.next().is_some() {
            tracing::warn!(user = %key, "Several users share this name, using the first");
        }
        Ok(first)
    }

    fn get_user_by_id(&self, user_id: &str) -> Result<Option<SharedUser>> {
        Ok(self
            .users
            .iter()
            .find(|u| u.read().user_id() == user_id)
            .cloned())
    }

    fn get_author(&self, author_id: AuthorId) -> Result<Option<Arc<Author>>> {
        Ok(self.find_author(author_id).cloned())
    }

    fn get_publisher(&self, name: &str) -> Result<Option<Arc<Publisher>>> {
        Ok(self.find_publisher(name).cloned())
    }

    fn get_tag(&self, name: &str) -> Result<Option<Arc<Tag>>> {
        Ok(self.find_tag(name).cloned())
    }

    fn add_book(&mut self, book: Arc<Book>) -> Result<bool> {
        if self.books.iter().any(|b| b.book_id() == book.book_id()) {
            return Ok(false);
        }

        // Cascade like the relational store does.
        if let Some(publisher) = book.publisher() {
            self.add_publisher(Arc::clone(publisher))?;
        }
        for author in book.authors() {
            self.add_author(Arc::clone(author))?;
        }
        for tag in book.tags() {
            self.add_tag(Arc::clone(tag))?;
        }

        self.books.push(book);
        Ok(true)
    }

    fn add_author(&mut self, author: Arc<Author>) -> Result<bool> {
        if self.find_author(author.unique_id()).is_some() {
            return Ok(false);
        }
        self.authors.push(author);
        Ok(true)
    }

    fn add_publisher(&mut self, publisher: Arc<Publisher>) -> Result<bool> {
        if self.find_publisher(publisher.name()).is_some() {
            return Ok(false);
        }
        self.publishers.push(publisher);
        Ok(true)
    }

    fn add_tag(&mut self, tag: Arc<Tag>) -> Result<bool> {
        if self.find_tag(tag.name()).is_some() {
            return Ok(false);
        }
        self.tags.push(tag);
        Ok(true)
    }

    fn add_user(&mut self, user: User) -> Result<bool> {
        if user.user_name().is_none() {
            return Err(AppError::Validation(
                "User must have a non-empty username".to_string(),
            ));
        }
        if self.users.iter().any(|u| u.read().user_id() == user.user_id()) {
            return Ok(false);
        }
        self.users.push(user.into_shared());
        Ok(true)
    }

    // Users are shared, the change is visible already.
    fn update_user(&mut self, user: &SharedUser) -> Result<bool> {
        let user_id = user.read().user_id().to_string();
        Ok(self.users.iter().any(|u| u.read().user_id() == user_id))
    }

    fn add_review(&mut self, review: Arc<Review>) -> Result<bool> {
        if let Some(book) = review.book() {
            self.add_book(Arc::clone(book))?;
        }
        self.reviews.push(review);
        Ok(true)
    }

    // Entries live inside the shared user already.
    fn add_entry(&mut self, _collection: &ReadingCollection, _entry: &BookEntry) -> Result<()> {
        Ok(())
    }

    fn update_entry(&mut self, _collection: &ReadingCollection, _entry: &BookEntry) -> Result<()> {
        Ok(())
    }

    fn get_reviews(&self, book: &Book) -> Result<Vec<Arc<Review>>> {
        Ok(self.search().search_reviews_by_book(book))
    }

    fn get_books_by_tag(&self, tag: &str) -> Result<Vec<Arc<Book>>> {
        Ok(self.search().search_by_tag(tag).to_vec())
    }

    fn get_books_by_author(&self, author: &Author) -> Result<Vec<Arc<Book>>> {
        Ok(self.search().search_by_author(author).to_vec())
    }

    fn get_books_by_title(&self, title: &str) -> Result<Vec<Arc<Book>>> {
        Ok(self.search().search_by_title(title).to_vec())
    }

    fn get_books_by_date_range(&self, start: u32, end: u32) -> Result<Vec<Arc<Book>>> {
        Ok(self.search().search_by_date_range(start, end).to_vec())
    }

    fn get_books_by_publisher(&self, publisher: &Publisher) -> Result<Vec<Arc<Book>>> {
        Ok(self.search().search_by_publisher(publisher).to_vec())
    }

    fn get_related_books(&self, book: &Arc<Book>, seed: u64) -> Result<Vec<Arc<Book>>> {
        Ok(self.search().search_related_books(book, seed))
    }

    fn get_authors_by_name(&self, name: &str) -> Result<Vec<Arc<Author>>> {
        let needle = name.to_lowercase();
        Ok(self
            .authors
            .iter()
            .filter(|a| a.full_name().to_lowercase().contains(&needle))
            .cloned()
            .collect())
    }

    fn get_tags_by_input(&self, input: &str) -> Result<Vec<Arc<Tag>>> {
        Ok(self
            .tags
            .iter()
            .filter(|t| t.name().contains(input))
            .cloned()
            .collect())
    }

    fn get_num_books(&self) -> Result<usize> {
        Ok(self.books.len())
    }

    fn get_num_authors(&self) -> Result<usize> {
        Ok(self.authors.len())
    }

    fn get_num_publishers(&self) -> Result<usize> {
        Ok(self.publishers.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_book_lookup() {
        let mut repo = MemoryRepository::new();
        let book = Arc::new(Book::new(69, "A Book").unwrap());

        assert!(repo.add_book(Arc::clone(&book)).unwrap());
        assert!(!repo.add_book(Arc::new(Book::new(69, "Again").unwrap())).unwrap());

        let found = repo.get_book(69).unwrap().unwrap();
        assert!(Arc::ptr_eq(&found, &book));
        assert!(repo.get_book(21).unwrap().is_none());
        assert_eq!(repo.get_num_books().unwrap(), 1);
    }

    #[test]
    fn test_add_book_cascades_related_entities() {
        let mut repo = MemoryRepository::new();
        let tag = Arc::new(Tag::new("fantasy"));
        let mut book = Book::new(1, "Cascade").unwrap();
        book.set_publisher(Some(Arc::new(Publisher::new("Tor"))));
        book.add_author(Arc::new(Author::new(9, "Author").unwrap()));
        tag.tag_book(&mut book);

        repo.add_book(Arc::new(book)).unwrap();

        assert_eq!(repo.get_num_publishers().unwrap(), 1);
        assert_eq!(repo.get_num_authors().unwrap(), 1);
        assert!(repo.get_tag("fantasy").unwrap().is_some());
    }

    #[test]
    fn test_user_without_name_rejected() {
        let mut repo = MemoryRepository::new();
        let err = repo.add_user(User::new("  ", "password", None)).unwrap_err();
        assert!(err.is_validation());
        assert!(repo.users().unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_usernames_first_found_wins() {
        let mut repo = MemoryRepository::new();
        repo.add_user(User::new("dave", "password1", Some("1"))).unwrap();
        repo.add_user(User::new("Dave", "password2", Some("2"))).unwrap();
        assert!(!repo.add_user(User::new("eve", "password3", Some("2"))).unwrap());

        let user = repo.get_user("DAVE").unwrap().unwrap();
        assert_eq!(user.read().user_id(), "1");
        assert_eq!(repo.users().unwrap().len(), 2);
        assert!(repo.get_user("   ").unwrap().is_none());
    }

    #[test]
    fn test_shared_user_mutations_are_visible() {
        let mut repo = MemoryRepository::new();
        repo.add_user(User::new("reader", "password", Some("u1"))).unwrap();

        let user = repo.get_user("reader").unwrap().unwrap();
        let review = Arc::new(Review::new(Some("u1"), None, Some("fine"), 3).unwrap());
        user.write().add_review(review);

        let again = repo.get_user_by_id("u1").unwrap().unwrap();
        assert_eq!(again.read().reviews().len(), 1);
    }

    #[test]
    fn test_review_stores_its_book() {
        let mut repo = MemoryRepository::new();
        let mut book = Book::new(5, "Reviewed").unwrap();
        book.set_publisher(Some(Arc::new(Publisher::new("Tor"))));
        let book = Arc::new(book);

        let review = Review::new(Some("u1"), Some(Arc::clone(&book)), Some("fine"), 4).unwrap();
        repo.add_review(Arc::new(review)).unwrap();

        assert_eq!(repo.get_num_books().unwrap(), 1);
        assert_eq!(repo.get_num_publishers().unwrap(), 1);
        assert_eq!(repo.get_reviews(&book).unwrap().len(), 1);
    }

    #[test]
    fn test_update_user_requires_stored_user() {
        let mut repo = MemoryRepository::new();
        repo.add_user(User::new("reader", "password", Some("u1"))).unwrap();

        let stored = repo.get_user_by_id("u1").unwrap().unwrap();
        assert!(repo.update_user(&stored).unwrap());

        let stranger = User::new("stranger", "password", Some("u2")).into_shared();
        assert!(!repo.update_user(&stranger).unwrap());
    }

    #[test]
    fn test_search_sees_later_insertions() {
        let mut repo = MemoryRepository::new();
        let tag = Arc::new(Tag::new("magic"));
        assert!(repo.add_tag(Arc::clone(&tag)).unwrap());
        assert!(!repo.add_tag(Arc::new(Tag::new("magic"))).unwrap());

        for id in 0..3 {
            let mut book = Book::new(id, "Magic Tales").unwrap();
            tag.tag_book(&mut book);
            repo.add_book(Arc::new(book)).unwrap();
            assert_eq!(repo.get_books_by_tag("magic").unwrap().len(), (id + 1) as usize);
        }

        assert_eq!(repo.get_tags_by_input("agi").unwrap().len(), 1);
        assert!(repo.get_tags_by_input("MAGIC").unwrap().is_empty());
        assert_eq!(tag.tagged_books(), vec![0, 1, 2]);
    }
}
