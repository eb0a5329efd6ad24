//! Author model.

use crate::error::{AppError, Result};
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Author identifier.
pub type AuthorId = u64;

/// A book author.
///
/// Co-authorship is recorded by id so that authors shared between many
/// books never form reference cycles.
#[derive(Debug)]
pub struct Author {
    unique_id: AuthorId,
    full_name: String,
    coauthors: RwLock<BTreeSet<AuthorId>>,
}

impl Author {
    /// Create an author. Fails on a negative id or a blank name.
    pub fn new(unique_id: i64, full_name: &str) -> Result<Self> {
        let unique_id = AuthorId::try_from(unique_id)
            .map_err(|_| AppError::Validation(format!("Invalid author id: {}", unique_id)))?;

        Ok(Self {
            unique_id,
            full_name: Self::validate_name(full_name)?,
            coauthors: RwLock::new(BTreeSet::new()),
        })
    }

    fn validate_name(full_name: &str) -> Result<String> {
        super::non_empty_trimmed(full_name)
            .map(str::to_string)
            .ok_or_else(|| AppError::Validation("Author name must not be empty".to_string()))
    }

    /// Author id.
    pub fn unique_id(&self) -> AuthorId {
        self.unique_id
    }

    /// Full name.
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Change the full name. Fails on a blank name, leaving the old one.
    pub fn set_full_name(&mut self, full_name: &str) -> Result<()> {
        self.full_name = Self::validate_name(full_name)?;
        Ok(())
    }

    /// Record a co-author. An author is never its own co-author.
    pub fn add_coauthor(&self, coauthor: &Author) {
        self.add_coauthor_id(coauthor.unique_id);
    }

    pub(crate) fn add_coauthor_id(&self, coauthor_id: AuthorId) {
        if coauthor_id != self.unique_id {
            self.coauthors.write().insert(coauthor_id);
        }
    }

    /// Whether `author` was recorded as a co-author of this one.
    pub fn check_if_this_author_coauthored_with(&self, author: &Author) -> bool {
        self.coauthors.read().contains(&author.unique_id)
    }

    /// Ids of all recorded co-authors, ascending.
    pub fn coauthor_ids(&self) -> Vec<AuthorId> {
        self.coauthors.read().iter().copied().collect()
    }
}

/// Link two authors as co-authors of each other.
pub fn link_coauthors(a: &Author, b: &Author) {
    a.add_coauthor(b);
    b.add_coauthor(a);
}

impl PartialEq for Author {
    fn eq(&self, other: &Self) -> bool {
        self.unique_id == other.unique_id
    }
}

impl Eq for Author {}

impl Hash for Author {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.unique_id.hash(state);
    }
}

impl PartialOrd for Author {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Author {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.unique_id.cmp(&other.unique_id)
    }
}

impl fmt::Display for Author {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<Author {}, author id = {}>",
            self.full_name, self.unique_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_author_construction() {
        let author = Author::new(12948, "  Rumiko Takahashi ").unwrap();
        assert_eq!(author.full_name(), "Rumiko Takahashi");
        assert_eq!(
            author.to_string(),
            "<Author Rumiko Takahashi, author id = 12948>"
        );
    }

    #[test]
    fn test_author_rejects_negative_id_and_blank_name() {
        assert!(Author::new(-1, "Someone").unwrap_err().is_validation());
        assert!(Author::new(3, "   ").is_err());
        assert!(Author::new(0, "Zero").is_ok());
    }

    #[test]
    fn test_set_full_name_keeps_old_value_on_error() {
        let mut author = Author::new(1, "Old Name").unwrap();
        assert!(author.set_full_name("").is_err());
        assert_eq!(author.full_name(), "Old Name");
    }

    #[test]
    fn test_coauthors_are_symmetric_and_exclude_self() {
        let a = Author::new(1, "A").unwrap();
        let b = Author::new(2, "B").unwrap();
        let a_again = Author::new(1, "A clone").unwrap();

        link_coauthors(&a, &b);
        a.add_coauthor(&a_again);

        assert!(a.check_if_this_author_coauthored_with(&b));
        assert!(b.check_if_this_author_coauthored_with(&a));
        assert!(!a.check_if_this_author_coauthored_with(&a_again));
        assert_eq!(a.coauthor_ids(), vec![2]);
    }

    #[test]
    fn test_author_ordering_by_id() {
        let a = Author::new(5, "Zed").unwrap();
        let b = Author::new(7, "Amy").unwrap();
        assert!(a < b);
        assert_eq!(a, Author::new(5, "Other").unwrap());
    }
}
