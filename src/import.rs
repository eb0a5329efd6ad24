//! Bulk import of the catalog sources into a repository.
//!
//! Sources are parsed in parallel on a dedicated worker pool, then wired and
//! persisted sequentially under one repository lock. A malformed line in any
//! source, or a review whose rating is outside 0..=5, fails the whole import
//! before anything is written.
//!
//! Leniency: a book record whose id, title, fields or authors cannot be
//! resolved is skipped with a warning. A review whose book or user is
//! unknown is stored partially linked.

pub mod records;

use crate::config::{ImportConfig, SeedConfig};
use crate::error::{AppError, Result};
use crate::library::author::link_coauthors;
use crate::library::review::check_rating;
use crate::library::{
    Author, AuthorId, Book, BookId, Publisher, ReadingCollection, Review, Tag, User,
};
use crate::repository::{Repository, RepositoryHandle};
use rayon::prelude::*;
use records::{AuthorRecord, BookRecord, ReviewRecord};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Repository totals after an import.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    /// Stored books.
    pub books: usize,
    /// Stored authors.
    pub authors: usize,
    /// Stored publishers.
    pub publishers: usize,
    /// Stored tags.
    pub tags: usize,
    /// Stored reviews.
    pub reviews: usize,
    /// Stored users.
    pub users: usize,
    /// Book records skipped by this import.
    pub skipped_books: usize,
}

impl fmt::Display for ImportReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} books, {} authors, {} publishers, {} tags, {} reviews, {} users ({} skipped)",
            self.books,
            self.authors,
            self.publishers,
            self.tags,
            self.reviews,
            self.users,
            self.skipped_books
        )
    }
}

/// Populates a repository from the bulk sources.
pub struct BulkImporter {
    repo: RepositoryHandle,
    pool: rayon::ThreadPool,
}

impl BulkImporter {
    /// Create an importer parsing on `workers` threads (0 = one per core).
    pub fn new(repo: RepositoryHandle, workers: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|e| AppError::Import(format!("Failed to build worker pool: {}", e)))?;
        Ok(Self { repo, pool })
    }

    /// Import users, then books with their authors, then reviews.
    ///
    /// Every source is parsed and validated before the first write.
    pub fn run(&self, sources: &ImportConfig) -> Result<ImportReport> {
        let users = parse_users(&sources.users)?;
        let catalog = self.parse_catalog(&sources.books, &sources.authors, &sources.reviews)?;

        self.store_users(users)?;
        let skipped = self.store_catalog(&catalog)?;

        let report = ImportReport {
            skipped_books: skipped,
            ..self.report()?
        };
        tracing::info!(
            books = report.books,
            authors = report.authors,
            publishers = report.publishers,
            tags = report.tags,
            reviews = report.reviews,
            users = report.users,
            skipped = report.skipped_books,
            "Import finished"
        );
        Ok(report)
    }

    /// Current repository totals.
    pub fn report(&self) -> Result<ImportReport> {
        let repo = self.repo.lock();
        Ok(ImportReport {
            books: repo.get_num_books()?,
            authors: repo.get_num_authors()?,
            publishers: repo.get_num_publishers()?,
            tags: repo.tags()?.len(),
            reviews: repo.reviews()?.len(),
            users: repo.users()?.len(),
            skipped_books: 0,
        })
    }

    /// Import `id,username,password` lines. Returns the number of users added.
    pub fn import_users(&self, path: &Path) -> Result<usize> {
        let users = parse_users(path)?;
        self.store_users(users)
    }

    /// Import books and reviews. Returns the number of skipped book records.
    pub fn import_catalog(&self, books: &Path, authors: &Path, reviews: &Path) -> Result<usize> {
        let catalog = self.parse_catalog(books, authors, reviews)?;
        self.store_catalog(&catalog)
    }

    fn store_users(&self, users: Vec<User>) -> Result<usize> {
        let mut repo = self.repo.lock();
        let mut added = 0;
        for user in users {
            let user_id = user.user_id().to_string();
            match repo.add_user(user) {
                Ok(true) => added += 1,
                Ok(false) => tracing::debug!(user_id = %user_id, "User id already stored"),
                Err(e) if e.is_validation() => {
                    tracing::warn!(user_id = %user_id, error = %e, "Skipping user record");
                }
                Err(e) => return Err(e),
            }
        }

        tracing::debug!(added, "Imported users");
        Ok(added)
    }

    fn parse_catalog(&self, books: &Path, authors: &Path, reviews: &Path) -> Result<Catalog> {
        let author_records: Vec<AuthorRecord> = self.read_records(authors)?;
        let book_records: Vec<BookRecord> = self.read_records(books)?;
        let review_records: Vec<ReviewRecord> = self.read_records(reviews)?;

        let mut author_names = HashMap::with_capacity(author_records.len());
        for (index, record) in author_records.iter().enumerate() {
            let author_id: AuthorId = record
                .author_id
                .require("author_id")
                .map_err(|e| at_line(authors, index, e))?;
            author_names.insert(author_id, record.name.clone());
        }

        for (index, record) in review_records.iter().enumerate() {
            check_review(record).map_err(|e| at_line(reviews, index, e))?;
        }

        Ok(Catalog {
            books_path: books.to_path_buf(),
            reviews_path: reviews.to_path_buf(),
            author_names,
            books: book_records,
            reviews: review_records,
        })
    }

    fn store_catalog(&self, catalog: &Catalog) -> Result<usize> {
        let mut repo = self.repo.lock();

        let mut skipped = 0;
        for (index, record) in catalog.books.iter().enumerate() {
            // A repeated id must not touch the shared tags and authors.
            if let Ok(Some(book_id)) = record.book_id.parse::<BookId>("book_id")
                && repo.get_book(book_id)?.is_some()
            {
                tracing::debug!(book_id, "Book id already stored, keeping the first");
                continue;
            }

            match build_book(&**repo, record, &catalog.author_names) {
                Ok(book) => {
                    let book_id = book.book_id();
                    if !repo.add_book(Arc::new(book))? {
                        tracing::debug!(book_id, "Book id already stored, keeping the first");
                    }
                }
                Err(e @ (AppError::Validation(_) | AppError::Import(_))) => {
                    tracing::warn!(
                        source = %catalog.books_path.display(),
                        line = index + 1,
                        error = %e,
                        "Skipping book record"
                    );
                    skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }

        for (index, record) in catalog.reviews.iter().enumerate() {
            let review = build_review(&**repo, record).map_err(|e| match e {
                AppError::Validation(msg) | AppError::Import(msg) => {
                    at_line(&catalog.reviews_path, index, AppError::Import(msg))
                }
                other => other,
            })?;
            repo.add_review(review)?;
        }

        tracing::debug!(
            books = catalog.books.len(),
            reviews = catalog.reviews.len(),
            skipped,
            "Imported catalog"
        );
        Ok(skipped)
    }

    /// Give the configured user a reading collection holding the first
    /// catalog books. Returns the number of entries added.
    pub fn seed_reading_collection(&self, seed: &SeedConfig) -> Result<usize> {
        if seed.user.trim().is_empty() || seed.books == 0 {
            return Ok(0);
        }

        let mut repo = self.repo.lock();
        let Some(user) = repo.get_user(&seed.user)? else {
            tracing::warn!(user = %seed.user, "Seed user not found, skipping reading collection");
            return Ok(0);
        };

        let books: Vec<Arc<Book>> = repo.books()?.into_iter().take(seed.books).collect();
        let mut user = user.write();
        let collection = ReadingCollection::new(user.user_id(), seed.collection.as_str());
        user.add_reading_list(collection);

        let count = books.len();
        for book in books {
            user.reading_list_mut()
                .add_entry(&mut **repo, book, &seed.status, seed.pages_read)?;
        }

        tracing::info!(user = %seed.user, entries = count, "Seeded reading collection");
        Ok(count)
    }

    /// Parse every non-blank line of a line-delimited JSON source, in order.
    fn read_records<T>(&self, path: &Path) -> Result<Vec<T>>
    where
        T: DeserializeOwned + Send,
    {
        let content = read_source(path)?;
        let lines: Vec<(usize, &str)> = content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .collect();

        self.pool.install(|| {
            lines
                .par_iter()
                .map(|(index, line)| {
                    serde_json::from_str(line).map_err(|e| {
                        AppError::Import(format!("{}:{}: {}", path.display(), index + 1, e))
                    })
                })
                .collect()
        })
    }
}

/// Parsed and validated catalog sources, ready to be stored.
struct Catalog {
    books_path: PathBuf,
    reviews_path: PathBuf,
    author_names: HashMap<AuthorId, String>,
    books: Vec<BookRecord>,
    reviews: Vec<ReviewRecord>,
}

fn parse_users(path: &Path) -> Result<Vec<User>> {
    let content = read_source(path)?;

    let mut users = Vec::new();
    for (index, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let mut fields = line.splitn(3, ',');
        let (Some(user_id), Some(user_name), Some(password)) =
            (fields.next(), fields.next(), fields.next())
        else {
            return Err(AppError::Import(format!(
                "{}:{}: expected id,username,password",
                path.display(),
                index + 1
            )));
        };
        users.push(User::new(user_name, password.trim(), Some(user_id)));
    }
    Ok(users)
}

/// Reject a review record that could never be stored.
fn check_review(record: &ReviewRecord) -> Result<()> {
    record.book_id.parse::<i64>("book_id")?;
    check_rating(record.rating.require("rating")?)?;
    Ok(())
}

fn read_source(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .map_err(|e| AppError::Import(format!("Failed to read {}: {}", path.display(), e)))
}

fn at_line(path: &Path, index: usize, error: AppError) -> AppError {
    AppError::Import(format!("{}:{}: {}", path.display(), index + 1, error))
}

/// Resolve one book record against the repository.
///
/// Every fallible step runs before shared tags and authors are touched, so
/// a rejected record leaves no trace.
fn build_book(
    repo: &dyn Repository,
    record: &BookRecord,
    author_names: &HashMap<AuthorId, String>,
) -> Result<Book> {
    let mut book = Book::new(record.book_id.require("book_id")?, &record.title)?;

    if let Some(year) = record.publication_year.parse("publication_year")? {
        book.set_release_year(year)?;
    }
    if let Some(ebook) = record.is_ebook.flag() {
        book.set_ebook(ebook);
    }
    book.set_description(&record.description);
    if let Some(pages) = record.num_pages.parse("num_pages")? {
        book.set_num_pages(pages);
    }
    if let Some(rating) = record.average_rating.parse("average_rating")? {
        book.set_rating(rating);
    }
    if !record.image_url.trim().is_empty() {
        book.set_image_url(record.image_url.trim());
    }

    let mut authors = Vec::with_capacity(record.authors.len());
    for reference in &record.authors {
        let author_id: i64 = reference.author_id.require("author_id")?;
        let stored = match AuthorId::try_from(author_id) {
            Ok(id) => repo.get_author(id)?,
            Err(_) => None,
        };
        let author = match stored {
            Some(author) => author,
            None => {
                let name = AuthorId::try_from(author_id)
                    .ok()
                    .and_then(|id| author_names.get(&id))
                    .ok_or_else(|| {
                        AppError::Import(format!("Author {} is not in the authors source", author_id))
                    })?;
                Arc::new(Author::new(author_id, name)?)
            }
        };
        authors.push(author);
    }

    let publisher = Publisher::new(&record.publisher);
    let publisher = repo
        .get_publisher(publisher.name())?
        .unwrap_or_else(|| Arc::new(publisher));
    book.set_publisher(Some(publisher));

    let mut tags = Vec::new();
    for name in record.popular_shelves.names() {
        tags.push(repo.get_tag(name)?.unwrap_or_else(|| Arc::new(Tag::new(name))));
    }

    // Nothing below can fail.
    for tag in &tags {
        tag.tag_book(&mut book);
    }
    for (i, author) in authors.iter().enumerate() {
        for other in &authors[i + 1..] {
            link_coauthors(author, other);
        }
        book.add_author(Arc::clone(author));
    }

    Ok(book)
}

/// Build a review, linking its book and user when they are known.
fn build_review(repo: &dyn Repository, record: &ReviewRecord) -> Result<Arc<Review>> {
    let book = match record.book_id.parse::<i64>("book_id")? {
        Some(id) => match BookId::try_from(id) {
            Ok(id) => repo.get_book(id)?,
            Err(_) => None,
        },
        None => None,
    };
    let user = repo.get_user_by_id(&record.user_id)?;

    let review = Arc::new(Review::new(
        user.as_ref().map(|_| record.user_id.as_str()),
        book,
        record.review_text.as_deref(),
        record.rating.require("rating")?,
    )?);

    if let Some(user) = user {
        user.write().add_review(Arc::clone(&review));
    }
    Ok(review)
}
