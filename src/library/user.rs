//! User model.

use super::book::Book;
use super::reading::{DEFAULT_COLLECTION_NAME, ReadingCollection};
use super::review::Review;
use super::generate_token;
use parking_lot::RwLock;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Minimum accepted password length.
pub const MIN_PASSWORD_LEN: usize = 7;

/// A user shared between the repository and its callers.
pub type SharedUser = Arc<RwLock<User>>;

/// A catalog user.
///
/// Identity is the trimmed, lower-cased username. Invalid usernames and
/// passwords are stored as `None` instead of failing construction.
#[derive(Debug, Clone)]
pub struct User {
    user_name: Option<String>,
    password: Option<String>,
    user_id: String,
    read_books: Vec<Arc<Book>>,
    reviews: Vec<Arc<Review>>,
    pages_read: u64,
    reading_list: ReadingCollection,
}

impl User {
    /// Create a user. A missing or blank `user_id` gets a random 32-byte token.
    pub fn new(user_name: &str, password: &str, user_id: Option<&str>) -> Self {
        let user_id = user_id
            .and_then(super::non_empty_trimmed)
            .map(str::to_string)
            .unwrap_or_else(generate_token);

        Self {
            user_name: Self::normalize_name(user_name),
            password: (password.chars().count() >= MIN_PASSWORD_LEN)
                .then(|| password.to_string()),
            reading_list: ReadingCollection::new(user_id.clone(), DEFAULT_COLLECTION_NAME),
            user_id,
            read_books: Vec::new(),
            reviews: Vec::new(),
            pages_read: 0,
        }
    }

    /// Rebuild a stored user. The name is expected to be normalized already.
    pub(crate) fn restore(
        user_name: String,
        password: Option<String>,
        user_id: String,
        pages_read: u64,
        read_books: Vec<Arc<Book>>,
        reviews: Vec<Arc<Review>>,
        reading_list: ReadingCollection,
    ) -> Self {
        Self {
            user_name: Some(user_name),
            password,
            user_id,
            read_books,
            reviews,
            pages_read,
            reading_list,
        }
    }

    /// Normalized lookup key for a username: trimmed and lower-cased.
    pub fn normalize_name(user_name: &str) -> Option<String> {
        super::non_empty_trimmed(user_name).map(str::to_lowercase)
    }

    /// Wrap the user for sharing.
    pub fn into_shared(self) -> SharedUser {
        Arc::new(RwLock::new(self))
    }

    /// Normalized username, `None` if the input was blank.
    pub fn user_name(&self) -> Option<&str> {
        self.user_name.as_deref()
    }

    /// Password, `None` if shorter than [`MIN_PASSWORD_LEN`].
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// Stable user id.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Books marked as read.
    pub fn read_books(&self) -> &[Arc<Book>] {
        &self.read_books
    }

    /// Reviews written by this user.
    pub fn reviews(&self) -> &[Arc<Review>] {
        &self.reviews
    }

    /// Cumulative pages of all read books.
    pub fn pages_read(&self) -> u64 {
        self.pages_read
    }

    /// The user's reading collection.
    pub fn reading_list(&self) -> &ReadingCollection {
        &self.reading_list
    }

    /// Mutable access to the reading collection.
    pub fn reading_list_mut(&mut self) -> &mut ReadingCollection {
        &mut self.reading_list
    }

    /// Replace the reading collection.
    pub fn add_reading_list(&mut self, reading_list: ReadingCollection) {
        self.reading_list = reading_list;
    }

    /// Mark a book as read and add its pages to the counter.
    pub fn read_a_book(&mut self, book: Arc<Book>) {
        self.pages_read += u64::from(book.num_pages());
        self.read_books.push(book);
    }

    /// Attach a review. Reviews are never de-duplicated.
    pub fn add_review(&mut self, review: Arc<Review>) {
        self.reviews.push(review);
    }
}

impl PartialEq for User {
    fn eq(&self, other: &Self) -> bool {
        self.user_name == other.user_name
    }
}

impl Eq for User {}

impl Hash for User {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.user_name.hash(state);
    }
}

impl PartialOrd for User {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for User {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.user_name.cmp(&other.user_name)
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<User {}>", self.user_name.as_deref().unwrap_or(""))
    }
}
