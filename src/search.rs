//! Linear-scan search over a snapshot of the catalog.
//!
//! A [`SearchEngine`] borrows the live book and review lists of its owner,
//! so it always sees the latest insertions. Each query overwrites the
//! engine's result buffer; queries take `&mut self`, so a buffer can never be
//! read while another query on the same engine is filling it.

use crate::library::{Author, Book, Publisher, Review};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use std::collections::HashSet;
use std::sync::Arc;

/// Tag whose first book anchors related-book recommendations.
pub const RELATED_ANCHOR_TAG: &str = "read-it";

/// Number of sampled books returned alongside the anchor.
pub const RELATED_SAMPLE_SIZE: usize = 19;

/// Search engine over borrowed book and review lists.
#[derive(Debug)]
pub struct SearchEngine<'a> {
    books: &'a [Arc<Book>],
    reviews: &'a [Arc<Review>],
    found: Vec<Arc<Book>>,
}

impl<'a> SearchEngine<'a> {
    /// Create an engine over the given lists.
    pub fn new(books: &'a [Arc<Book>], reviews: &'a [Arc<Review>]) -> Self {
        Self {
            books,
            reviews,
            found: Vec::new(),
        }
    }

    /// Results of the last book query.
    pub fn found_items(&self) -> &[Arc<Book>] {
        &self.found
    }

    fn scan(&mut self, predicate: impl Fn(&Book) -> bool) -> &[Arc<Book>] {
        self.found = self
            .books
            .iter()
            .filter(|b| predicate(b))
            .cloned()
            .collect();
        &self.found
    }

    /// Books carrying exactly this tag.
    pub fn search_by_tag(&mut self, tag: &str) -> &[Arc<Book>] {
        self.scan(|b| b.has_tag(tag))
    }

    /// Books written by `author`.
    pub fn search_by_author(&mut self, author: &Author) -> &[Arc<Book>] {
        let author_id = author.unique_id();
        self.scan(|b| b.has_author(author_id))
    }

    /// Books whose title contains `title`, ignoring case.
    pub fn search_by_title(&mut self, title: &str) -> &[Arc<Book>] {
        let needle = title.to_lowercase();
        self.scan(|b| b.title().to_lowercase().contains(&needle))
    }

    /// Books released between `start` and `end`, both inclusive.
    ///
    /// An inverted range (`start > end`) matches nothing.
    pub fn search_by_date_range(&mut self, start: u32, end: u32) -> &[Arc<Book>] {
        self.scan(|b| b.release_year().is_some_and(|y| (start..=end).contains(&y)))
    }

    /// Books from `publisher`.
    pub fn search_by_publisher(&mut self, publisher: &Publisher) -> &[Arc<Book>] {
        self.scan(|b| b.publisher().is_some_and(|p| p.as_ref() == publisher))
    }

    /// Reviews about `book`, in insertion order.
    pub fn search_reviews_by_book(&self, book: &Book) -> Vec<Arc<Review>> {
        self.reviews
            .iter()
            .filter(|r| r.is_about(book))
            .cloned()
            .collect()
    }

    /// Related books for `book`, sampled deterministically from `seed`.
    ///
    /// The anchor is the first book tagged [`RELATED_ANCHOR_TAG`], falling
    /// back to `book` itself. The candidate pool is every other book sharing
    /// a tag with the anchor. See [`sample_related`] for the result shape.
    pub fn search_related_books(&mut self, book: &Arc<Book>, seed: u64) -> Vec<Arc<Book>> {
        let anchor = self
            .search_by_tag(RELATED_ANCHOR_TAG)
            .first()
            .cloned()
            .unwrap_or_else(|| Arc::clone(book));

        let mut pool = Vec::new();
        for tag in anchor.tags() {
            pool.extend(self.search_by_tag(tag.name()).iter().cloned());
        }

        sample_related(anchor, pool, RELATED_SAMPLE_SIZE, seed)
    }
}

/// Sample up to `sample_size` books from `pool` and put `anchor` first.
///
/// Duplicates and the anchor itself are removed from the pool before
/// sampling. When the pool is smaller than `sample_size` every candidate is
/// returned. The result holds at most `sample_size + 1` books, always
/// contains the anchor, and is identical for identical inputs and seed.
pub fn sample_related(
    anchor: Arc<Book>,
    pool: Vec<Arc<Book>>,
    sample_size: usize,
    seed: u64,
) -> Vec<Arc<Book>> {
    let mut seen = HashSet::new();
    seen.insert(anchor.book_id());
    let candidates: Vec<Arc<Book>> = pool
        .into_iter()
        .filter(|b| seen.insert(b.book_id()))
        .collect();

    let mut rng = StdRng::seed_from_u64(seed);
    let mut picked: Vec<Arc<Book>> = candidates
        .choose_multiple(&mut rng, sample_size.min(candidates.len()))
        .cloned()
        .collect();

    picked.push(anchor);
    picked.reverse();
    picked
}
