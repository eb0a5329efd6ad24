//! Repository contract shared by every storage backend.
//!
//! Application code only talks to [`Repository`]. The composition root
//! builds exactly one backend, wraps it in a [`RepositoryHandle`] and passes
//! that handle to whoever needs it.

mod memory;

pub use memory::MemoryRepository;

use crate::error::Result;
use crate::library::{
    Author, AuthorId, Book, BookEntry, BookId, Publisher, ReadingCollection, Review, SharedUser,
    Tag, User,
};
use parking_lot::Mutex;
use std::sync::Arc;

/// Uniform catalog and user storage operations.
///
/// Point lookups return `Ok(None)` when nothing matches; errors are reserved
/// for storage failures and rejected inserts. Inserts return `Ok(true)` when
/// the entity was stored and `Ok(false)` when an entity with the same
/// identity already existed.
///
/// Writes take `&mut self`. Share a backend between threads through a
/// [`RepositoryHandle`].
///
/// Backends may hand out detached copies: a user changed after a lookup is
/// only guaranteed to keep its changes once passed back through
/// [`Repository::update_user`], [`Repository::add_entry`] or
/// [`Repository::update_entry`].
pub trait Repository: Send {
    /// All books in insertion order.
    fn books(&self) -> Result<Vec<Arc<Book>>>;
    /// All authors in insertion order.
    fn authors(&self) -> Result<Vec<Arc<Author>>>;
    /// All publishers in insertion order.
    fn publishers(&self) -> Result<Vec<Arc<Publisher>>>;
    /// All reviews in insertion order.
    fn reviews(&self) -> Result<Vec<Arc<Review>>>;
    /// All tags in creation order.
    fn tags(&self) -> Result<Vec<Arc<Tag>>>;
    /// All users in insertion order.
    fn users(&self) -> Result<Vec<SharedUser>>;

    /// Book by id.
    fn get_book(&self, book_id: BookId) -> Result<Option<Arc<Book>>>;
    /// User by username, compared after normalization. When several users
    /// share a name the first inserted one wins.
    fn get_user(&self, user_name: &str) -> Result<Option<SharedUser>>;
    /// User by user id.
    fn get_user_by_id(&self, user_id: &str) -> Result<Option<SharedUser>>;
    /// Author by id.
    fn get_author(&self, author_id: AuthorId) -> Result<Option<Arc<Author>>>;
    /// Publisher by exact name.
    fn get_publisher(&self, name: &str) -> Result<Option<Arc<Publisher>>>;
    /// Tag by exact name.
    fn get_tag(&self, name: &str) -> Result<Option<Arc<Tag>>>;

    /// Store a book with its publisher, authors and tags.
    fn add_book(&mut self, book: Arc<Book>) -> Result<bool>;
    /// Store an author.
    fn add_author(&mut self, author: Arc<Author>) -> Result<bool>;
    /// Store a publisher.
    fn add_publisher(&mut self, publisher: Arc<Publisher>) -> Result<bool>;
    /// Store a tag.
    fn add_tag(&mut self, tag: Arc<Tag>) -> Result<bool>;
    /// Store a user. Users without a valid username are rejected. Duplicate
    /// usernames are accepted, a duplicate user id is not stored.
    fn add_user(&mut self, user: User) -> Result<bool>;
    /// Persist the mutable state of a stored user: read books and pages
    /// read. Returns `false` when the user is not stored.
    fn update_user(&mut self, user: &SharedUser) -> Result<bool>;
    /// Store a review, along with its book when that is not stored yet.
    /// Reviews are always distinct.
    fn add_review(&mut self, review: Arc<Review>) -> Result<bool>;
    /// Persist a new entry of `collection`.
    fn add_entry(&mut self, collection: &ReadingCollection, entry: &BookEntry) -> Result<()>;
    /// Persist changes to an existing entry of `collection`.
    fn update_entry(&mut self, collection: &ReadingCollection, entry: &BookEntry) -> Result<()>;

    /// Reviews about `book`.
    fn get_reviews(&self, book: &Book) -> Result<Vec<Arc<Review>>>;
    /// Books carrying exactly this tag.
    fn get_books_by_tag(&self, tag: &str) -> Result<Vec<Arc<Book>>>;
    /// Books written by `author`.
    fn get_books_by_author(&self, author: &Author) -> Result<Vec<Arc<Book>>>;
    /// Books whose title contains `title`, ignoring case.
    fn get_books_by_title(&self, title: &str) -> Result<Vec<Arc<Book>>>;
    /// Books released in `start..=end`.
    fn get_books_by_date_range(&self, start: u32, end: u32) -> Result<Vec<Arc<Book>>>;
    /// Books from `publisher`.
    fn get_books_by_publisher(&self, publisher: &Publisher) -> Result<Vec<Arc<Book>>>;
    /// Up to 20 related books, anchor first, reproducible for a given seed.
    fn get_related_books(&self, book: &Arc<Book>, seed: u64) -> Result<Vec<Arc<Book>>>;
    /// Authors whose name contains `name`, ignoring case.
    fn get_authors_by_name(&self, name: &str) -> Result<Vec<Arc<Author>>>;
    /// Tags containing `input`, case-sensitive, without duplicates.
    fn get_tags_by_input(&self, input: &str) -> Result<Vec<Arc<Tag>>>;

    /// Number of books.
    fn get_num_books(&self) -> Result<usize>;
    /// Number of authors.
    fn get_num_authors(&self) -> Result<usize>;
    /// Number of publishers.
    fn get_num_publishers(&self) -> Result<usize>;
}

/// The one repository instance of a process, shared across components.
pub type RepositoryHandle = Arc<Mutex<Box<dyn Repository>>>;

/// Wrap a backend into a shareable handle.
pub fn into_handle<R: Repository + 'static>(repo: R) -> RepositoryHandle {
    Arc::new(Mutex::new(Box::new(repo)))
}
