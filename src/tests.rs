use crate::auth::AuthService;
use crate::config::{Backend, Config, ImportConfig, SeedConfig};
use crate::db::SqliteRepository;
use crate::error::AppError;
use crate::import::{BulkImporter, ImportReport};
use crate::library::{Book, Publisher, Review, STATUS_COMPLETED, STATUS_READING};
use crate::repository::{MemoryRepository, Repository, RepositoryHandle, into_handle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn fixture_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("data")
}

fn fixture_sources() -> ImportConfig {
    ImportConfig {
        books: "books.json".into(),
        authors: "authors.json".into(),
        reviews: "reviews.json".into(),
        users: "users.txt".into(),
        workers: 2,
    }
    .relative_to(&fixture_dir())
}

fn import_into<R: Repository + 'static>(repo: R) -> (RepositoryHandle, ImportReport) {
    let handle = into_handle(repo);
    let importer = BulkImporter::new(Arc::clone(&handle), 2).unwrap();
    let report = importer.run(&fixture_sources()).unwrap();
    (handle, report)
}

/// The fixture imported into every backend.
fn backends() -> Vec<(&'static str, RepositoryHandle, ImportReport)> {
    let (memory, memory_report) = import_into(MemoryRepository::new());
    let (sqlite, sqlite_report) = import_into(SqliteRepository::open_memory().unwrap());
    vec![
        ("memory", memory, memory_report),
        ("sqlite", sqlite, sqlite_report),
    ]
}

fn ids(books: &[Arc<Book>]) -> Vec<u64> {
    books.iter().map(|b| b.book_id()).collect()
}

const GOLDEN: ImportReport = ImportReport {
    books: 6,
    authors: 5,
    publishers: 4,
    tags: 5,
    reviews: 5,
    users: 3,
    skipped_books: 1,
};

// ============================================================================
// Import
// ============================================================================

#[test]
fn test_fixture_golden_counts() {
    for (name, repo, report) in backends() {
        assert_eq!(report, GOLDEN, "{}", name);

        let repo = repo.lock();
        assert_eq!(repo.get_num_books().unwrap(), 6, "{}", name);
        assert_eq!(repo.get_num_authors().unwrap(), 5, "{}", name);
        assert_eq!(repo.get_num_publishers().unwrap(), 4, "{}", name);
        assert_eq!(ids(&repo.books().unwrap()), vec![101, 102, 103, 104, 106, 107], "{}", name);
    }
}

#[test]
fn test_duplicate_book_keeps_first_record() {
    for (name, repo, _) in backends() {
        let repo = repo.lock();
        let book = repo.get_book(103).unwrap().unwrap();
        assert_eq!(book.title(), "Good Omens", "{}", name);
        assert_eq!(book.release_year(), Some(1990), "{}", name);
        assert_eq!(book.publisher().map(|p| p.name()), Some("Gollancz"), "{}", name);
        assert!(repo.get_publisher("Orbit").unwrap().is_none(), "{}", name);
        assert!(repo.get_tag("orphaned").unwrap().is_none(), "{}", name);
    }
}

#[test]
fn test_book_fields_are_imported() {
    for (name, repo, _) in backends() {
        let repo = repo.lock();

        let shadow = repo.get_book(101).unwrap().unwrap();
        assert_eq!(shadow.num_pages(), 487, "{}", name);
        assert_eq!(shadow.rating(), Some(4.26), "{}", name);
        assert_eq!(shadow.ebook(), Some(false), "{}", name);
        assert_eq!(
            shadow.image_url(),
            Some("https://images.example.org/101.jpg"),
            "{}",
            name
        );
        assert_eq!(shadow.authors_display(), "Carlos Ruiz Zafón", "{}", name);

        let comic = repo.get_book(106).unwrap().unwrap();
        assert_eq!(comic.ebook(), Some(true), "{}", name);
        assert_eq!(comic.release_year(), None, "{}", name);
        assert_eq!(comic.num_pages(), 0, "{}", name);
        assert_eq!(comic.publisher().map(|p| p.name()), Some("N/A"), "{}", name);

        // Ratings outside (0, 5) are dropped.
        assert_eq!(repo.get_book(104).unwrap().unwrap().rating(), None, "{}", name);
        assert_eq!(repo.get_book(107).unwrap().unwrap().rating(), None, "{}", name);
    }
}

#[test]
fn test_coauthors_are_symmetric() {
    for (name, repo, _) in backends() {
        let repo = repo.lock();
        let pratchett = repo.get_author(2).unwrap().unwrap();
        let gaiman = repo.get_author(3).unwrap().unwrap();
        let kirby = repo.get_author(5).unwrap().unwrap();

        assert!(pratchett.check_if_this_author_coauthored_with(&gaiman), "{}", name);
        assert!(gaiman.check_if_this_author_coauthored_with(&pratchett), "{}", name);
        assert!(kirby.check_if_this_author_coauthored_with(&pratchett), "{}", name);
        assert!(!gaiman.check_if_this_author_coauthored_with(&kirby), "{}", name);
        assert!(!pratchett.check_if_this_author_coauthored_with(&pratchett), "{}", name);
    }
}

// ============================================================================
// Queries
// ============================================================================

#[test]
fn test_book_queries() {
    for (name, repo, _) in backends() {
        let repo = repo.lock();

        assert_eq!(
            ids(&repo.get_books_by_tag("fantasy").unwrap()),
            vec![101, 103, 104, 107],
            "{}",
            name
        );
        assert!(repo.get_books_by_tag("Fantasy").unwrap().is_empty(), "{}", name);
        assert_eq!(
            ids(&repo.get_books_by_title("the").unwrap()),
            vec![101, 107],
            "{}",
            name
        );
        assert_eq!(
            ids(&repo.get_books_by_date_range(1990, 2000).unwrap()),
            vec![102, 103, 104],
            "{}",
            name
        );
        assert!(repo.get_books_by_date_range(2000, 1990).unwrap().is_empty(), "{}", name);
        assert_eq!(
            ids(&repo.get_books_by_publisher(&Publisher::new("Penguin")).unwrap()),
            vec![101, 102],
            "{}",
            name
        );
        assert_eq!(
            ids(&repo.get_books_by_publisher(&Publisher::new("")).unwrap()),
            vec![106],
            "{}",
            name
        );

        let pratchett = repo.get_author(2).unwrap().unwrap();
        assert_eq!(
            ids(&repo.get_books_by_author(&pratchett).unwrap()),
            vec![103, 104, 107],
            "{}",
            name
        );
    }
}

#[test]
fn test_author_and_tag_lookups() {
    for (name, repo, _) in backends() {
        let repo = repo.lock();

        let found: Vec<u64> = repo
            .get_authors_by_name("J")
            .unwrap()
            .iter()
            .map(|a| a.unique_id())
            .collect();
        assert_eq!(found, vec![4, 5], "{}", name);
        assert_eq!(repo.get_authors_by_name("terry").unwrap().len(), 1, "{}", name);

        let tags: Vec<String> = repo
            .get_tags_by_input("m")
            .unwrap()
            .iter()
            .map(|t| t.name().to_string())
            .collect();
        assert_eq!(tags, vec!["mystery", "humor", "comics"], "{}", name);
        assert!(repo.get_tags_by_input("M").unwrap().is_empty(), "{}", name);

        let humor = repo.get_tag("humor").unwrap().unwrap();
        assert_eq!(humor.tagged_books(), vec![103, 104, 107], "{}", name);
    }
}

#[test]
fn test_related_books_agree_across_backends() {
    let backends = backends();

    for seed in [0, 7, 42] {
        let mut results = Vec::new();
        for (name, repo, _) in &backends {
            let repo = repo.lock();
            let book = repo.get_book(104).unwrap().unwrap();
            let related = ids(&repo.get_related_books(&book, seed).unwrap());

            assert_eq!(related[0], 101, "{} anchors on the read-it book", name);
            let mut sorted = related.clone();
            sorted.sort_unstable();
            assert_eq!(sorted, vec![101, 102, 103, 104, 107], "{}", name);
            results.push(related);
        }
        assert_eq!(results[0], results[1], "seed {}", seed);
    }
}

// ============================================================================
// Users and reviews
// ============================================================================

#[test]
fn test_users_and_reviews() {
    for (name, repo, _) in backends() {
        let repo = repo.lock();

        let samuel = repo.get_user(" SAMUEL ").unwrap().unwrap();
        let samuel = samuel.read();
        assert_eq!(samuel.user_id(), "u1", "{}", name);
        assert_eq!(samuel.reviews().len(), 2, "{}", name);
        assert!(samuel.reviews()[1].book().is_none(), "{}", name);
        assert_eq!(samuel.reviews()[1].review_text(), "N/A", "{}", name);

        let alice = repo.get_user_by_id("u2").unwrap().unwrap();
        assert_eq!(alice.read().password(), None, "{}", name);

        let shadow = repo.get_book(101).unwrap().unwrap();
        let reviews = repo.get_reviews(&shadow).unwrap();
        assert_eq!(reviews.len(), 2, "{}", name);
        assert_eq!(reviews[0].user_id(), Some("u1"), "{}", name);
        assert_eq!(reviews[0].rating(), 5, "{}", name);
        assert_eq!(reviews[1].user_id(), None, "{}", name);

        let third = &repo.reviews().unwrap()[2];
        assert_eq!(third.review_text(), "Good start.", "{}", name);
    }
}

#[test]
fn test_review_of_new_book_stores_the_book() {
    for (name, repo, _) in backends() {
        let mut repo = repo.lock();
        let book = Arc::new(Book::new(500, "Fresh").unwrap());
        let review = Review::new(None, Some(Arc::clone(&book)), Some("new"), 3).unwrap();

        repo.add_review(Arc::new(review)).unwrap();
        assert_eq!(repo.get_num_books().unwrap(), GOLDEN.books + 1, "{}", name);
        assert_eq!(repo.get_num_publishers().unwrap(), GOLDEN.publishers, "{}", name);
        assert_eq!(repo.get_reviews(&book).unwrap().len(), 1, "{}", name);
    }
}

#[test]
fn test_read_books_persist_through_update_user() {
    for (name, repo, _) in backends() {
        let mut repo = repo.lock();
        let shadow = repo.get_book(101).unwrap().unwrap();
        let samuel = repo.get_user("samuel").unwrap().unwrap();

        samuel.write().read_a_book(shadow);
        assert!(repo.update_user(&samuel).unwrap(), "{}", name);

        let again = repo.get_user("samuel").unwrap().unwrap();
        let again = again.read();
        assert_eq!(again.pages_read(), 487, "{}", name);
        assert_eq!(ids(again.read_books()), vec![101], "{}", name);
        assert_eq!(again.reviews().len(), 2, "{}", name);
    }
}

#[test]
fn test_seeded_reading_collection() {
    for (name, repo, _) in backends() {
        let importer = BulkImporter::new(Arc::clone(&repo), 1).unwrap();
        let added = importer.seed_reading_collection(&SeedConfig::default()).unwrap();
        assert_eq!(added, 5, "{}", name);

        let user = repo.lock().get_user("samuel").unwrap().unwrap();
        let user = user.read();
        let list = user.reading_list();
        assert_eq!(list.name(), "currently reading", "{}", name);
        assert_eq!(list.book_entries().len(), 5, "{}", name);

        let marina = list.find_entry(102).unwrap();
        assert_eq!(marina.pages_read(), 146, "{}", name);
        assert_eq!(marina.status(), STATUS_COMPLETED, "{}", name);

        let shadow = list.find_entry(101).unwrap();
        assert_eq!(shadow.pages_read(), 146, "{}", name);
        assert_eq!(shadow.status(), STATUS_READING, "{}", name);

        // Past the last page: progress ignored.
        let small_gods = list.find_entry(104).unwrap();
        assert_eq!(small_gods.pages_read(), 0, "{}", name);
        assert_eq!(small_gods.status(), STATUS_READING, "{}", name);

        // No page count: always on the last page.
        let comic = list.find_entry(106).unwrap();
        assert_eq!(comic.pages_read(), 0, "{}", name);
        assert_eq!(comic.status(), STATUS_COMPLETED, "{}", name);
        assert!(list.find_entry(107).is_none(), "{}", name);
    }
}

#[test]
fn test_auth_against_imported_users() {
    for (name, repo, _) in backends() {
        let auth = AuthService::new(Arc::clone(&repo));

        let user = auth.login("Samuel", "password1").unwrap();
        assert_eq!(user.read().user_id(), "u1", "{}", name);
        assert!(matches!(auth.login("samuel", "secret99"), Err(AppError::Auth(_))), "{}", name);
        assert!(
            matches!(auth.register("samuel", "password9", "password9"), Err(AppError::Auth(_))),
            "{}",
            name
        );

        auth.register("newcomer", "password9", "password9").unwrap();
        assert_eq!(repo.lock().users().unwrap().len(), 4, "{}", name);
    }
}

// ============================================================================
// On-disk database and configuration
// ============================================================================

#[test]
fn test_sqlite_file_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("shelf.db");

    let (_, report) = import_into(SqliteRepository::open(&path, Duration::from_secs(1)).unwrap());
    assert_eq!(report, GOLDEN);

    let repo = SqliteRepository::open(&path, Duration::from_secs(1)).unwrap();
    assert_eq!(repo.get_num_books().unwrap(), GOLDEN.books);
    assert_eq!(repo.get_num_authors().unwrap(), GOLDEN.authors);
    assert_eq!(repo.get_num_publishers().unwrap(), GOLDEN.publishers);
    assert_eq!(repo.reviews().unwrap().len(), GOLDEN.reviews);
    assert_eq!(repo.get_books_by_tag("humor").unwrap().len(), 3);
}

#[test]
fn test_config_file_selects_backend_and_sources() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("config.toml");
    let data = fixture_dir();
    std::fs::write(
        &config_path,
        format!(
            r#"
[repository]
backend = "sqlite"

[database]
path = "{db}"

[import]
books = "{data}/books.json"
authors = "{data}/authors.json"
reviews = "{data}/reviews.json"
users = "{data}/users.txt"
workers = 1
"#,
            db = dir.path().join("catalog.db").display(),
            data = data.display(),
        ),
    )
    .unwrap();

    let config = Config::load(&config_path).unwrap();
    assert_eq!(config.repository.backend, Backend::Sqlite);

    let repo = SqliteRepository::open(&config.database.path, config.database.busy_timeout()).unwrap();
    let importer = BulkImporter::new(into_handle(repo), config.import.workers).unwrap();
    let report = importer.run(&config.import).unwrap();
    assert_eq!(report, GOLDEN);
    assert!(config.database.path.exists());
}
