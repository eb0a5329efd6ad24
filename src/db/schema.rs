use super::session::UnitOfWork;
use super::{entity_id, sql_id, storage, timestamp_to_datetime};
use crate::error::{AppError, Result};
use crate::library::reading::DEFAULT_COLLECTION_NAME;
use crate::library::{
    Author, AuthorId, Book, BookEntry, BookId, Publisher, ReadingCollection, Review, SharedUser,
    Tag, User,
};
use crate::repository::Repository;
use crate::search::{RELATED_ANCHOR_TAG, RELATED_SAMPLE_SIZE, sample_related};
use rusqlite::types::FromSql;
use rusqlite::{Connection, OptionalExtension, Params, Row, params};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const REVIEW_COLUMNS: &str =
    "SELECT user_id, book_id, review_text, rating, timestamp_us FROM reviews";

const BOOKS_BY_TAG: &str = "SELECT b.id FROM books b
     JOIN book_tags bt ON bt.book_id = b.id
     JOIN tags t ON t.id = bt.tag_id
     WHERE t.name = ?1
     ORDER BY b.seq";

/// SQLite-backed repository.
///
/// Entities are rebuilt from rows on every read, so two lookups of the same
/// book return equal but distinct values. Returned users are detached
/// copies: changes to them persist only through [`Repository::update_user`]
/// and the reading-entry operations.
pub struct SqliteRepository {
    conn: Connection,
}

impl SqliteRepository {
    /// Open or create the database at the given path.
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self> {
        // Create parent directories if needed
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path).map_err(storage("open database"))?;
        conn.busy_timeout(busy_timeout).map_err(storage("set busy timeout"))?;

        let repo = Self { conn };
        repo.initialize_schema()?;
        tracing::debug!(path = %path.display(), "Opened database");
        Ok(repo)
    }

    /// Open an in-memory database (for testing).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(storage("open database"))?;
        let repo = Self { conn };
        repo.initialize_schema()?;
        Ok(repo)
    }

    /// Initialize database schema.
    fn initialize_schema(&self) -> Result<()> {
        self.conn
            .execute_batch(
                r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS publishers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT UNIQUE NOT NULL
            );

            CREATE TABLE IF NOT EXISTS authors (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id INTEGER UNIQUE NOT NULL,
                full_name TEXT NOT NULL
            );

            -- Directed pairs, both directions are stored
            CREATE TABLE IF NOT EXISTS author_coauthors (
                author_id INTEGER NOT NULL,
                coauthor_id INTEGER NOT NULL,
                PRIMARY KEY (author_id, coauthor_id)
            );

            CREATE TABLE IF NOT EXISTS books (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id INTEGER UNIQUE NOT NULL,
                title TEXT NOT NULL,
                description TEXT,
                publisher_id INTEGER,
                release_year INTEGER,
                ebook INTEGER,
                num_pages INTEGER NOT NULL DEFAULT 0,
                image_url TEXT,
                rating REAL,
                FOREIGN KEY (publisher_id) REFERENCES publishers(id)
            );

            CREATE TABLE IF NOT EXISTS book_authors (
                book_id INTEGER NOT NULL,
                author_id INTEGER NOT NULL,
                position INTEGER NOT NULL,
                PRIMARY KEY (book_id, author_id),
                FOREIGN KEY (book_id) REFERENCES books(id) ON DELETE CASCADE,
                FOREIGN KEY (author_id) REFERENCES authors(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS tags (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT UNIQUE NOT NULL
            );

            CREATE TABLE IF NOT EXISTS book_tags (
                book_id INTEGER NOT NULL,
                tag_id INTEGER NOT NULL,
                position INTEGER NOT NULL,
                PRIMARY KEY (book_id, tag_id),
                FOREIGN KEY (book_id) REFERENCES books(id) ON DELETE CASCADE,
                FOREIGN KEY (tag_id) REFERENCES tags(id) ON DELETE CASCADE
            );

            -- Usernames are not unique, lookups take the oldest row
            CREATE TABLE IF NOT EXISTS users (
                user_id TEXT PRIMARY KEY,
                user_name TEXT NOT NULL,
                password TEXT,
                pages_read INTEGER NOT NULL DEFAULT 0
            );

            -- Books a user finished, repeats allowed
            CREATE TABLE IF NOT EXISTS user_read_books (
                user_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                book_id INTEGER NOT NULL,
                PRIMARY KEY (user_id, position),
                FOREIGN KEY (user_id) REFERENCES users(user_id) ON DELETE CASCADE,
                FOREIGN KEY (book_id) REFERENCES books(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS reviews (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT,
                book_id INTEGER,
                review_text TEXT NOT NULL,
                rating INTEGER NOT NULL,
                timestamp_us INTEGER NOT NULL,
                FOREIGN KEY (book_id) REFERENCES books(id) ON DELETE SET NULL
            );

            CREATE TABLE IF NOT EXISTS reading_lists (
                user_id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(user_id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS book_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                book_id INTEGER NOT NULL,
                status TEXT NOT NULL,
                pages_read INTEGER NOT NULL DEFAULT 0,
                UNIQUE(user_id, book_id),
                FOREIGN KEY (user_id) REFERENCES reading_lists(user_id) ON DELETE CASCADE,
                FOREIGN KEY (book_id) REFERENCES books(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_users_name ON users(user_name);
            CREATE INDEX IF NOT EXISTS idx_reviews_book ON reviews(book_id);
            CREATE INDEX IF NOT EXISTS idx_reviews_user ON reviews(user_id);
            CREATE INDEX IF NOT EXISTS idx_book_tags_tag ON book_tags(tag_id);
            CREATE INDEX IF NOT EXISTS idx_book_authors_author ON book_authors(author_id);
            CREATE INDEX IF NOT EXISTS idx_books_release_year ON books(release_year);
            "#,
            )
            .map_err(storage("initialize schema"))?;

        Ok(())
    }

    /// Start a unit of work on this connection.
    pub fn unit_of_work(&mut self, operation: &'static str) -> Result<UnitOfWork<'_>> {
        UnitOfWork::begin(&mut self.conn, operation)
    }

    /// Run `f` in its own unit of work, committing only if it succeeds.
    fn write<T>(
        &mut self,
        operation: &'static str,
        f: impl FnOnce(&Connection) -> Result<T>,
    ) -> Result<T> {
        let uow = self.unit_of_work(operation)?;
        let value = f(uow.connection()?)?;
        uow.commit()?;
        Ok(value)
    }

    fn books_where<P: Params>(
        &self,
        sql: &str,
        params: P,
        action: &'static str,
    ) -> Result<Vec<Arc<Book>>> {
        let ids = query_column::<i64, _>(&self.conn, sql, params, action)?;
        load_books(&self.conn, ids)
    }

    fn count(&self, sql: &str, action: &'static str) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row(sql, [], |row| row.get(0))
            .map_err(storage(action))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

impl Repository for SqliteRepository {
    fn books(&self) -> Result<Vec<Arc<Book>>> {
        self.books_where("SELECT id FROM books ORDER BY seq", [], "list books")
    }

    fn authors(&self) -> Result<Vec<Arc<Author>>> {
        let ids = query_column::<i64, _>(
            &self.conn,
            "SELECT id FROM authors ORDER BY seq",
            [],
            "list authors",
        )?;
        load_all(ids, |id| load_author(&self.conn, id))
    }

    fn publishers(&self) -> Result<Vec<Arc<Publisher>>> {
        let names = query_column::<String, _>(
            &self.conn,
            "SELECT name FROM publishers ORDER BY id",
            [],
            "list publishers",
        )?;
        Ok(names
            .iter()
            .map(|name| Arc::new(Publisher::new(name)))
            .collect())
    }

    fn reviews(&self) -> Result<Vec<Arc<Review>>> {
        load_reviews(
            &self.conn,
            &format!("{} ORDER BY id", REVIEW_COLUMNS),
            [],
            &mut HashMap::new(),
        )
    }

    fn tags(&self) -> Result<Vec<Arc<Tag>>> {
        let names = query_column::<String, _>(
            &self.conn,
            "SELECT name FROM tags ORDER BY id",
            [],
            "list tags",
        )?;
        load_all(names, |name| load_tag(&self.conn, &name))
    }

    fn users(&self) -> Result<Vec<SharedUser>> {
        let ids = query_column::<String, _>(
            &self.conn,
            "SELECT user_id FROM users ORDER BY rowid",
            [],
            "list users",
        )?;
        load_all(ids, |id| load_user(&self.conn, &id))
    }

    fn get_book(&self, book_id: BookId) -> Result<Option<Arc<Book>>> {
        load_book(&self.conn, sql_id(book_id)?)
    }

    fn get_user(&self, user_name: &str) -> Result<Option<SharedUser>> {
        let Some(key) = User::normalize_name(user_name) else {
            return Ok(None);
        };

        let ids = query_column::<String, _>(
            &self.conn,
            "SELECT user_id FROM users WHERE user_name = ?1 ORDER BY rowid LIMIT 2",
            params![key],
            "get user",
        )?;
        if ids.len() > 1 {
            tracing::warn!(user = %key, "Several users share this name, using the first");
        }
        match ids.first() {
            Some(user_id) => load_user(&self.conn, user_id),
            None => Ok(None),
        }
    }

    fn get_user_by_id(&self, user_id: &str) -> Result<Option<SharedUser>> {
        load_user(&self.conn, user_id)
    }

    fn get_author(&self, author_id: AuthorId) -> Result<Option<Arc<Author>>> {
        load_author(&self.conn, sql_id(author_id)?)
    }

    fn get_publisher(&self, name: &str) -> Result<Option<Arc<Publisher>>> {
        let name: Option<String> = self
            .conn
            .query_row(
                "SELECT name FROM publishers WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()
            .map_err(storage("get publisher"))?;
        Ok(name.map(|n| Arc::new(Publisher::new(&n))))
    }

    fn get_tag(&self, name: &str) -> Result<Option<Arc<Tag>>> {
        load_tag(&self.conn, name)
    }

    fn add_book(&mut self, book: Arc<Book>) -> Result<bool> {
        self.write("add book", |conn| insert_book(conn, &book))
    }

    fn add_author(&mut self, author: Arc<Author>) -> Result<bool> {
        self.write("add author", |conn| insert_author(conn, &author))
    }

    fn add_publisher(&mut self, publisher: Arc<Publisher>) -> Result<bool> {
        self.write("add publisher", |conn| {
            insert_publisher(conn, &publisher).map(|(inserted, _)| inserted)
        })
    }

    fn add_tag(&mut self, tag: Arc<Tag>) -> Result<bool> {
        self.write("add tag", |conn| {
            insert_tag(conn, tag.name()).map(|(inserted, _)| inserted)
        })
    }

    fn add_user(&mut self, user: User) -> Result<bool> {
        let Some(user_name) = user.user_name() else {
            return Err(AppError::Validation(
                "User must have a non-empty username".to_string(),
            ));
        };

        self.write("add user", |conn| {
            let inserted = conn
                .execute(
                    "INSERT OR IGNORE INTO users (user_id, user_name, password, pages_read)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![
                        user.user_id(),
                        user_name,
                        user.password(),
                        i64::try_from(user.pages_read()).unwrap_or(i64::MAX),
                    ],
                )
                .map_err(storage("add user"))?
                > 0;

            if inserted {
                save_read_books(conn, &user)?;
                let list = user.reading_list();
                conn.execute(
                    "INSERT OR IGNORE INTO reading_lists (user_id, name) VALUES (?1, ?2)",
                    params![user.user_id(), list.name()],
                )
                .map_err(storage("add reading list"))?;
                for entry in list.book_entries() {
                    upsert_entry(conn, list, entry)?;
                }
            }
            Ok(inserted)
        })
    }

    fn update_user(&mut self, user: &SharedUser) -> Result<bool> {
        let user = user.read();
        self.write("update user", |conn| {
            let updated = conn
                .execute(
                    "UPDATE users SET pages_read = ?2 WHERE user_id = ?1",
                    params![
                        user.user_id(),
                        i64::try_from(user.pages_read()).unwrap_or(i64::MAX)
                    ],
                )
                .map_err(storage("update user"))?
                > 0;
            if updated {
                save_read_books(conn, &user)?;
            }
            Ok(updated)
        })
    }

    fn add_review(&mut self, review: Arc<Review>) -> Result<bool> {
        self.write("add review", |conn| {
            let book_id = match review.book() {
                Some(book) => {
                    insert_book(conn, book)?;
                    Some(sql_id(book.book_id())?)
                }
                None => None,
            };

            conn.execute(
                "INSERT INTO reviews (user_id, book_id, review_text, rating, timestamp_us)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    review.user_id(),
                    book_id,
                    review.review_text(),
                    review.rating(),
                    review.timestamp().timestamp_micros(),
                ],
            )
            .map_err(storage("add review"))?;
            Ok(true)
        })
    }

    fn add_entry(&mut self, collection: &ReadingCollection, entry: &BookEntry) -> Result<()> {
        self.write("add entry", |conn| upsert_entry(conn, collection, entry))
    }

    fn update_entry(&mut self, collection: &ReadingCollection, entry: &BookEntry) -> Result<()> {
        self.write("update entry", |conn| upsert_entry(conn, collection, entry))
    }

    fn get_reviews(&self, book: &Book) -> Result<Vec<Arc<Review>>> {
        load_reviews(
            &self.conn,
            &format!("{} WHERE book_id = ?1 ORDER BY id", REVIEW_COLUMNS),
            params![sql_id(book.book_id())?],
            &mut HashMap::new(),
        )
    }

    fn get_books_by_tag(&self, tag: &str) -> Result<Vec<Arc<Book>>> {
        self.books_where(BOOKS_BY_TAG, params![tag], "get books by tag")
    }

    fn get_books_by_author(&self, author: &Author) -> Result<Vec<Arc<Book>>> {
        self.books_where(
            "SELECT b.id FROM books b
             JOIN book_authors ba ON ba.book_id = b.id
             WHERE ba.author_id = ?1
             ORDER BY b.seq",
            params![sql_id(author.unique_id())?],
            "get books by author",
        )
    }

    fn get_books_by_title(&self, title: &str) -> Result<Vec<Arc<Book>>> {
        self.books_where(
            "SELECT id FROM books WHERE instr(lower(title), lower(?1)) > 0 ORDER BY seq",
            params![title],
            "get books by title",
        )
    }

    fn get_books_by_date_range(&self, start: u32, end: u32) -> Result<Vec<Arc<Book>>> {
        self.books_where(
            "SELECT id FROM books WHERE release_year BETWEEN ?1 AND ?2 ORDER BY seq",
            params![start, end],
            "get books by date range",
        )
    }

    fn get_books_by_publisher(&self, publisher: &Publisher) -> Result<Vec<Arc<Book>>> {
        self.books_where(
            "SELECT b.id FROM books b
             JOIN publishers p ON p.id = b.publisher_id
             WHERE p.name = ?1
             ORDER BY b.seq",
            params![publisher.name()],
            "get books by publisher",
        )
    }

    fn get_related_books(&self, book: &Arc<Book>, seed: u64) -> Result<Vec<Arc<Book>>> {
        let anchor_id: Option<i64> = self
            .conn
            .query_row(
                &format!("{} LIMIT 1", BOOKS_BY_TAG),
                params![RELATED_ANCHOR_TAG],
                |row| row.get(0),
            )
            .optional()
            .map_err(storage("get related books"))?;

        let anchor = match anchor_id {
            Some(id) => load_book(&self.conn, id)?,
            None => None,
        }
        .unwrap_or_else(|| Arc::clone(book));

        let mut pool = Vec::new();
        for tag in anchor.tags() {
            pool.extend(self.get_books_by_tag(tag.name())?);
        }

        Ok(sample_related(anchor, pool, RELATED_SAMPLE_SIZE, seed))
    }

    fn get_authors_by_name(&self, name: &str) -> Result<Vec<Arc<Author>>> {
        let ids = query_column::<i64, _>(
            &self.conn,
            "SELECT id FROM authors WHERE instr(lower(full_name), lower(?1)) > 0 ORDER BY seq",
            params![name],
            "get authors by name",
        )?;
        load_all(ids, |id| load_author(&self.conn, id))
    }

    fn get_tags_by_input(&self, input: &str) -> Result<Vec<Arc<Tag>>> {
        let names = query_column::<String, _>(
            &self.conn,
            "SELECT name FROM tags WHERE instr(name, ?1) > 0 ORDER BY id",
            params![input],
            "get tags by input",
        )?;
        load_all(names, |name| load_tag(&self.conn, &name))
    }

    fn get_num_books(&self) -> Result<usize> {
        self.count("SELECT COUNT(*) FROM books", "count books")
    }

    fn get_num_authors(&self) -> Result<usize> {
        self.count("SELECT COUNT(*) FROM authors", "count authors")
    }

    fn get_num_publishers(&self) -> Result<usize> {
        self.count("SELECT COUNT(*) FROM publishers", "count publishers")
    }
}

fn query_rows<T, P, F>(
    conn: &Connection,
    sql: &str,
    params: P,
    action: &'static str,
    f: F,
) -> Result<Vec<T>>
where
    P: Params,
    F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
{
    let mut stmt = conn.prepare(sql).map_err(storage("prepare query"))?;
    let rows = stmt
        .query_map(params, f)
        .map_err(storage(action))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(storage(action))?;
    Ok(rows)
}

fn query_column<T: FromSql, P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
    action: &'static str,
) -> Result<Vec<T>> {
    query_rows(conn, sql, params, action, |row| row.get(0))
}

/// Load each key, skipping rows that vanished in between.
fn load_all<K, T>(keys: Vec<K>, mut load: impl FnMut(K) -> Result<Option<T>>) -> Result<Vec<T>> {
    let mut loaded = Vec::with_capacity(keys.len());
    for key in keys {
        if let Some(value) = load(key)? {
            loaded.push(value);
        }
    }
    Ok(loaded)
}

fn load_books(conn: &Connection, ids: Vec<i64>) -> Result<Vec<Arc<Book>>> {
    load_all(ids, |id| load_book(conn, id))
}

struct BookRow {
    id: i64,
    title: String,
    description: Option<String>,
    publisher: Option<String>,
    release_year: Option<i64>,
    ebook: Option<bool>,
    num_pages: i64,
    image_url: Option<String>,
    rating: Option<f64>,
}

fn load_book(conn: &Connection, book_id: i64) -> Result<Option<Arc<Book>>> {
    let row = conn
        .query_row(
            "SELECT b.id, b.title, b.description, p.name, b.release_year, b.ebook,
                    b.num_pages, b.image_url, b.rating
             FROM books b LEFT JOIN publishers p ON p.id = b.publisher_id
             WHERE b.id = ?1",
            params![book_id],
            |row| {
                Ok(BookRow {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    description: row.get(2)?,
                    publisher: row.get(3)?,
                    release_year: row.get(4)?,
                    ebook: row.get(5)?,
                    num_pages: row.get(6)?,
                    image_url: row.get(7)?,
                    rating: row.get(8)?,
                })
            },
        )
        .optional()
        .map_err(storage("get book"))?;
    let Some(row) = row else {
        return Ok(None);
    };

    let mut book = Book::new(row.id, &row.title)?;
    if let Some(description) = row.description.as_deref() {
        book.set_description(description);
    }
    book.set_publisher(row.publisher.map(|name| Arc::new(Publisher::new(&name))));
    if let Some(year) = row.release_year {
        book.set_release_year(year)?;
    }
    if let Some(ebook) = row.ebook {
        book.set_ebook(ebook);
    }
    book.set_num_pages(row.num_pages);
    if let Some(url) = row.image_url {
        book.set_image_url(url);
    }
    if let Some(rating) = row.rating {
        book.set_rating(rating);
    }

    let author_ids = query_column::<i64, _>(
        conn,
        "SELECT author_id FROM book_authors WHERE book_id = ?1 ORDER BY position",
        params![book_id],
        "get book authors",
    )?;
    for author in load_all(author_ids, |id| load_author(conn, id))? {
        book.add_author(author);
    }

    let tag_names = query_column::<String, _>(
        conn,
        "SELECT t.name FROM book_tags bt
         JOIN tags t ON t.id = bt.tag_id
         WHERE bt.book_id = ?1
         ORDER BY bt.position",
        params![book_id],
        "get book tags",
    )?;
    for tag in load_all(tag_names, |name| load_tag(conn, &name))? {
        book.add_tag(tag);
    }

    Ok(Some(Arc::new(book)))
}

fn load_author(conn: &Connection, author_id: i64) -> Result<Option<Arc<Author>>> {
    let row: Option<(i64, String)> = conn
        .query_row(
            "SELECT id, full_name FROM authors WHERE id = ?1",
            params![author_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .map_err(storage("get author"))?;
    let Some((id, full_name)) = row else {
        return Ok(None);
    };

    let author = Author::new(id, &full_name)?;
    let coauthors = query_column::<i64, _>(
        conn,
        "SELECT coauthor_id FROM author_coauthors WHERE author_id = ?1 ORDER BY coauthor_id",
        params![id],
        "get coauthors",
    )?;
    for coauthor in coauthors {
        author.add_coauthor_id(entity_id(coauthor)?);
    }
    Ok(Some(Arc::new(author)))
}

fn load_tag(conn: &Connection, name: &str) -> Result<Option<Arc<Tag>>> {
    let tag_id: Option<i64> = conn
        .query_row(
            "SELECT id FROM tags WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )
        .optional()
        .map_err(storage("get tag"))?;
    let Some(tag_id) = tag_id else {
        return Ok(None);
    };

    let books = query_column::<i64, _>(
        conn,
        "SELECT bt.book_id FROM book_tags bt
         JOIN books b ON b.id = bt.book_id
         WHERE bt.tag_id = ?1
         ORDER BY b.seq",
        params![tag_id],
        "get tagged books",
    )?
    .into_iter()
    .map(entity_id)
    .collect::<Result<Vec<BookId>>>()?;

    Ok(Some(Arc::new(Tag::with_books(name, books))))
}

struct ReviewRow {
    user_id: Option<String>,
    book_id: Option<i64>,
    review_text: String,
    rating: i64,
    timestamp_us: i64,
}

type BookCache = HashMap<i64, Option<Arc<Book>>>;

fn cached_book(conn: &Connection, cache: &mut BookCache, book_id: i64) -> Result<Option<Arc<Book>>> {
    if let Some(book) = cache.get(&book_id) {
        return Ok(book.clone());
    }
    let book = load_book(conn, book_id)?;
    cache.insert(book_id, book.clone());
    Ok(book)
}

fn load_reviews<P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
    cache: &mut BookCache,
) -> Result<Vec<Arc<Review>>> {
    let rows = query_rows(conn, sql, params, "get reviews", |row| {
        Ok(ReviewRow {
            user_id: row.get(0)?,
            book_id: row.get(1)?,
            review_text: row.get(2)?,
            rating: row.get(3)?,
            timestamp_us: row.get(4)?,
        })
    })?;

    let mut reviews = Vec::with_capacity(rows.len());
    for row in rows {
        let book = match row.book_id {
            Some(id) => cached_book(conn, cache, id)?,
            None => None,
        };
        reviews.push(Arc::new(Review::restore(
            row.user_id,
            book,
            Some(&row.review_text),
            row.rating,
            timestamp_to_datetime(row.timestamp_us),
        )?));
    }
    Ok(reviews)
}

fn load_user(conn: &Connection, user_id: &str) -> Result<Option<SharedUser>> {
    let row: Option<(String, String, Option<String>, i64)> = conn
        .query_row(
            "SELECT user_id, user_name, password, pages_read FROM users WHERE user_id = ?1",
            params![user_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .optional()
        .map_err(storage("get user"))?;
    let Some((user_id, user_name, password, pages_read)) = row else {
        return Ok(None);
    };

    let mut cache = BookCache::new();
    let reviews = load_reviews(
        conn,
        &format!("{} WHERE user_id = ?1 ORDER BY id", REVIEW_COLUMNS),
        params![user_id],
        &mut cache,
    )?;

    let list_name: Option<String> = conn
        .query_row(
            "SELECT name FROM reading_lists WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )
        .optional()
        .map_err(storage("get reading list"))?;

    let entry_rows: Vec<(i64, String, i64)> = query_rows(
        conn,
        "SELECT book_id, status, pages_read FROM book_entries WHERE user_id = ?1 ORDER BY id",
        params![user_id],
        "get book entries",
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )?;
    let mut entries = Vec::with_capacity(entry_rows.len());
    for (book_id, status, pages) in entry_rows {
        if let Some(book) = cached_book(conn, &mut cache, book_id)? {
            entries.push(BookEntry::new(book, &status, u32::try_from(pages).unwrap_or(0)));
        }
    }

    let read_ids = query_column::<i64, _>(
        conn,
        "SELECT book_id FROM user_read_books WHERE user_id = ?1 ORDER BY position",
        params![user_id],
        "get read books",
    )?;
    let mut read_books = Vec::with_capacity(read_ids.len());
    for book_id in read_ids {
        if let Some(book) = cached_book(conn, &mut cache, book_id)? {
            read_books.push(book);
        }
    }

    let reading_list = ReadingCollection::with_entries(
        user_id.clone(),
        list_name.unwrap_or_else(|| DEFAULT_COLLECTION_NAME.to_string()),
        entries,
    );
    let user = User::restore(
        user_name,
        password,
        user_id,
        u64::try_from(pages_read).unwrap_or(0),
        read_books,
        reviews,
        reading_list,
    );
    Ok(Some(user.into_shared()))
}

fn insert_publisher(conn: &Connection, publisher: &Publisher) -> Result<(bool, i64)> {
    let inserted = conn
        .execute(
            "INSERT OR IGNORE INTO publishers (name) VALUES (?1)",
            params![publisher.name()],
        )
        .map_err(storage("add publisher"))?
        > 0;
    let id = conn
        .query_row(
            "SELECT id FROM publishers WHERE name = ?1",
            params![publisher.name()],
            |row| row.get(0),
        )
        .map_err(storage("get publisher"))?;
    Ok((inserted, id))
}

fn insert_tag(conn: &Connection, name: &str) -> Result<(bool, i64)> {
    let inserted = conn
        .execute("INSERT OR IGNORE INTO tags (name) VALUES (?1)", params![name])
        .map_err(storage("add tag"))?
        > 0;
    let id = conn
        .query_row("SELECT id FROM tags WHERE name = ?1", params![name], |row| {
            row.get(0)
        })
        .map_err(storage("get tag"))?;
    Ok((inserted, id))
}

/// Insert the author row if missing, then record its co-author links.
fn insert_author(conn: &Connection, author: &Author) -> Result<bool> {
    let author_id = sql_id(author.unique_id())?;
    let inserted = conn
        .execute(
            "INSERT OR IGNORE INTO authors (id, full_name) VALUES (?1, ?2)",
            params![author_id, author.full_name()],
        )
        .map_err(storage("add author"))?
        > 0;

    for coauthor_id in author.coauthor_ids() {
        conn.execute(
            "INSERT OR IGNORE INTO author_coauthors (author_id, coauthor_id) VALUES (?1, ?2)",
            params![author_id, sql_id(coauthor_id)?],
        )
        .map_err(storage("add coauthor"))?;
    }
    Ok(inserted)
}

fn insert_book(conn: &Connection, book: &Book) -> Result<bool> {
    let book_id = sql_id(book.book_id())?;
    let exists: bool = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM books WHERE id = ?1)",
            params![book_id],
            |row| row.get(0),
        )
        .map_err(storage("get book"))?;
    if exists {
        return Ok(false);
    }

    let publisher_id = match book.publisher() {
        Some(publisher) => Some(insert_publisher(conn, publisher)?.1),
        None => None,
    };
    for author in book.authors() {
        insert_author(conn, author)?;
    }

    conn.execute(
        "INSERT INTO books (id, title, description, publisher_id, release_year, ebook,
                            num_pages, image_url, rating)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            book_id,
            book.title(),
            book.description(),
            publisher_id,
            book.release_year(),
            book.ebook(),
            book.num_pages(),
            book.image_url(),
            book.rating(),
        ],
    )
    .map_err(storage("add book"))?;

    for (position, author) in book.authors().iter().enumerate() {
        conn.execute(
            "INSERT INTO book_authors (book_id, author_id, position) VALUES (?1, ?2, ?3)",
            params![book_id, sql_id(author.unique_id())?, position as i64],
        )
        .map_err(storage("add book author"))?;
    }

    for (position, tag) in book.tags().iter().enumerate() {
        let (_, tag_id) = insert_tag(conn, tag.name())?;
        conn.execute(
            "INSERT INTO book_tags (book_id, tag_id, position) VALUES (?1, ?2, ?3)",
            params![book_id, tag_id, position as i64],
        )
        .map_err(storage("add book tag"))?;
    }

    Ok(true)
}

/// Replace the stored read books of `user`. Each book must be stored.
fn save_read_books(conn: &Connection, user: &User) -> Result<()> {
    conn.execute(
        "DELETE FROM user_read_books WHERE user_id = ?1",
        params![user.user_id()],
    )
    .map_err(storage("clear read books"))?;

    for (position, book) in user.read_books().iter().enumerate() {
        conn.execute(
            "INSERT INTO user_read_books (user_id, position, book_id) VALUES (?1, ?2, ?3)",
            params![user.user_id(), position as i64, sql_id(book.book_id())?],
        )
        .map_err(storage("save read book"))?;
    }
    Ok(())
}

fn upsert_entry(conn: &Connection, collection: &ReadingCollection, entry: &BookEntry) -> Result<()> {
    conn.execute(
        "INSERT INTO reading_lists (user_id, name) VALUES (?1, ?2)
         ON CONFLICT(user_id) DO UPDATE SET name = excluded.name",
        params![collection.owner_id(), collection.name()],
    )
    .map_err(storage("save reading list"))?;

    conn.execute(
        "INSERT INTO book_entries (user_id, book_id, status, pages_read)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(user_id, book_id) DO UPDATE SET
            status = excluded.status,
            pages_read = excluded.pages_read",
        params![
            collection.owner_id(),
            sql_id(entry.book().book_id())?,
            entry.status(),
            entry.pages_read(),
        ],
    )
    .map_err(storage("save book entry"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::STATUS_READING;
    use tempfile::TempDir;

    fn book_with(id: i64, title: &str, tags: &[&str]) -> Book {
        let mut book = Book::new(id, title).unwrap();
        for name in tags {
            Arc::new(Tag::new(*name)).tag_book(&mut book);
        }
        book
    }

    #[test]
    fn test_book_round_trip() {
        let mut repo = SqliteRepository::open_memory().unwrap();
        let mut book = book_with(7, "Persisted", &["fantasy", "read-it"]);
        book.set_description("  A description  ");
        book.set_publisher(Some(Arc::new(Publisher::new("Tor"))));
        book.set_release_year(2012).unwrap();
        book.set_ebook(true);
        book.set_num_pages(321);
        book.set_rating(4.5);
        book.add_author(Arc::new(Author::new(3, "Writer").unwrap()));

        assert!(repo.add_book(Arc::new(book)).unwrap());
        assert!(!repo.add_book(Arc::new(Book::new(7, "Other").unwrap())).unwrap());

        let loaded = repo.get_book(7).unwrap().unwrap();
        assert_eq!(loaded.title(), "Persisted");
        assert_eq!(loaded.description(), Some("A description"));
        assert_eq!(loaded.publisher().map(|p| p.name()), Some("Tor"));
        assert_eq!(loaded.release_year(), Some(2012));
        assert_eq!(loaded.ebook(), Some(true));
        assert_eq!(loaded.num_pages(), 321);
        assert_eq!(loaded.rating(), Some(4.5));
        assert!(loaded.has_author(3));
        assert!(loaded.has_tag("fantasy"));
        assert_eq!(repo.get_tag("fantasy").unwrap().unwrap().tagged_books(), vec![7]);
        assert_eq!(repo.get_num_publishers().unwrap(), 1);
        assert_eq!(repo.get_num_authors().unwrap(), 1);
    }

    #[test]
    fn test_data_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("shelf.db");

        {
            let mut repo = SqliteRepository::open(&path, Duration::from_secs(1)).unwrap();
            let mut stays = book_with(1, "Stays", &["kept"]);
            stays.set_num_pages(250);
            repo.add_book(Arc::new(stays)).unwrap();
            repo.add_user(User::new("Keeper", "password", Some("k1"))).unwrap();

            let keeper = repo.get_user("keeper").unwrap().unwrap();
            let book = repo.get_book(1).unwrap().unwrap();
            keeper.write().read_a_book(book);
            assert!(repo.update_user(&keeper).unwrap());
        }

        let repo = SqliteRepository::open(&path, Duration::from_secs(1)).unwrap();
        assert_eq!(repo.get_num_books().unwrap(), 1);
        assert_eq!(repo.get_books_by_tag("kept").unwrap().len(), 1);
        let user = repo.get_user("keeper").unwrap().unwrap();
        let user = user.read();
        assert_eq!(user.user_id(), "k1");
        assert_eq!(user.pages_read(), 250);
        assert_eq!(user.read_books().len(), 1);
        assert_eq!(user.read_books()[0].title(), "Stays");
    }

    #[test]
    fn test_review_cascades_book_and_keeps_timestamp() {
        let mut repo = SqliteRepository::open_memory().unwrap();
        let book = Arc::new(book_with(5, "Reviewed", &[]));
        let review = Review::new(Some("u1"), Some(Arc::clone(&book)), Some("fine"), 4).unwrap();
        let micros = review.timestamp().timestamp_micros();

        repo.add_review(Arc::new(review)).unwrap();

        assert_eq!(repo.get_num_books().unwrap(), 1);
        let reviews = repo.get_reviews(&book).unwrap();
        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0].timestamp().timestamp_micros(), micros);
        assert_eq!(reviews[0].user_id(), Some("u1"));
        assert_eq!(reviews[0].rating(), 4);
    }

    #[test]
    fn test_duplicate_usernames_oldest_wins() {
        let mut repo = SqliteRepository::open_memory().unwrap();
        assert!(repo.add_user(User::new("dave", "password1", Some("1"))).unwrap());
        assert!(repo.add_user(User::new("DAVE", "password2", Some("2"))).unwrap());
        assert!(!repo.add_user(User::new("other", "password3", Some("1"))).unwrap());

        let user = repo.get_user(" Dave ").unwrap().unwrap();
        assert_eq!(user.read().user_id(), "1");
        assert_eq!(repo.users().unwrap().len(), 2);
        assert!(repo.add_user(User::new("", "password", None)).unwrap_err().is_validation());
    }

    #[test]
    fn test_entries_persist_and_failed_write_rolls_back() {
        let mut repo = SqliteRepository::open_memory().unwrap();
        let mut stored = book_with(1, "Stored", &[]);
        stored.set_num_pages(100);
        let stored = Arc::new(stored);
        repo.add_book(Arc::clone(&stored)).unwrap();
        repo.add_user(User::new("reader", "password", Some("r1"))).unwrap();

        let user = repo.get_user("reader").unwrap().unwrap();
        let mut list = user.read().reading_list().clone();
        list.add_entry(&mut repo, stored, STATUS_READING, 10).unwrap();
        assert!(list.update_entry(&mut repo, 1, STATUS_READING, 20).unwrap());

        let mut renamed = ReadingCollection::new("r1", "wishlist");
        let unstored = Arc::new(Book::new(99, "Unstored").unwrap());
        let err = renamed
            .add_entry(&mut repo, unstored, STATUS_READING, 0)
            .unwrap_err();
        assert!(matches!(err, AppError::Storage(_)));
        assert!(renamed.book_entries().is_empty());

        let reloaded = repo.get_user_by_id("r1").unwrap().unwrap();
        let reloaded = reloaded.read();
        assert_eq!(reloaded.reading_list().name(), DEFAULT_COLLECTION_NAME);
        assert_eq!(reloaded.reading_list().book_entries().len(), 1);
        assert_eq!(reloaded.reading_list().find_entry(1).unwrap().pages_read(), 20);
    }

    #[test]
    fn test_queries_match_memory_semantics() {
        let mut repo = SqliteRepository::open_memory().unwrap();
        let author = Arc::new(Author::new(1, "Ursula Le Guin").unwrap());
        for id in 0..4 {
            let mut book = book_with(id, &format!("Earthsea {}", id), &["magic"]);
            book.set_release_year(1968 + id).unwrap();
            if id < 2 {
                book.add_author(Arc::clone(&author));
            }
            repo.add_book(Arc::new(book)).unwrap();
        }

        assert_eq!(repo.get_books_by_title("EARTHSEA").unwrap().len(), 4);
        assert_eq!(repo.get_books_by_date_range(1969, 1970).unwrap().len(), 2);
        assert!(repo.get_books_by_date_range(1970, 1969).unwrap().is_empty());
        assert_eq!(repo.get_books_by_author(&author).unwrap().len(), 2);
        assert_eq!(repo.get_authors_by_name("le guin").unwrap().len(), 1);
        assert_eq!(repo.get_tags_by_input("ag").unwrap().len(), 1);
        assert!(repo.get_tags_by_input("Mag").unwrap().is_empty());

        let first = repo.get_book(0).unwrap().unwrap();
        let related = repo.get_related_books(&first, 1).unwrap();
        assert_eq!(related.len(), 4);
        assert_eq!(related[0].book_id(), 0);
    }
}
