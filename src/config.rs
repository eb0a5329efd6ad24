use crate::error::{AppError, Result};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Book catalog with reviews, reading lists and recommendations.
#[derive(Parser, Debug, Clone)]
#[command(name = "shelf-rs")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file.
    #[arg(short, long, env = "SHELF_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Write a default config and provision the database.
    Init {
        /// Force overwrite existing config.
        #[arg(short, long)]
        force: bool,
    },

    /// Import the configured catalog files.
    Import,

    /// Print catalog counts.
    Stats,

    /// Search the catalog.
    Search {
        /// Search kind.
        #[command(subcommand)]
        query: SearchCommand,
    },

    /// Recommend books related to a book.
    Related {
        /// Book id.
        book_id: u64,
        /// Sampling seed (defaults to `recommend.seed`).
        #[arg(short, long)]
        seed: Option<u64>,
    },

    /// User management commands.
    User {
        /// User subcommand action.
        #[command(subcommand)]
        action: UserCommand,
    },
}

/// Search subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum SearchCommand {
    /// Books whose title contains the text, ignoring case.
    Title {
        /// Text to look for.
        text: String,
    },
    /// Books by authors whose name contains the text, ignoring case.
    Author {
        /// Text to look for.
        name: String,
    },
    /// Books carrying a tag exactly.
    Tag {
        /// Tag name.
        name: String,
    },
    /// Books from a publisher.
    Publisher {
        /// Publisher name.
        name: String,
    },
    /// Books released between two years, inclusive.
    Years {
        /// First year.
        start: u32,
        /// Last year.
        end: u32,
    },
}

/// User management subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum UserCommand {
    /// Register a new user.
    Add {
        /// Username.
        username: String,
        /// Password (will prompt if not provided).
        #[arg(short, long)]
        password: Option<String>,
    },

    /// Check a user's credentials.
    Check {
        /// Username.
        username: String,
        /// Password (will prompt if not provided).
        #[arg(short, long)]
        password: Option<String>,
    },
}

/// Main configuration from TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Repository selection.
    #[serde(default)]
    pub repository: RepositoryConfig,

    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Import sources.
    #[serde(default)]
    pub import: ImportConfig,

    /// Sample reading collection created after import.
    #[serde(default)]
    pub seed: SeedConfig,

    /// Recommendation settings.
    #[serde(default)]
    pub recommend: RecommendConfig,
}

/// Storage backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Process memory, repopulated by every run.
    #[default]
    Memory,
    /// SQLite database file.
    Sqlite,
}

/// Repository configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Backend to use.
    #[serde(default)]
    pub backend: Backend,
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    /// How long a storage operation waits on a locked database.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl DatabaseConfig {
    /// Busy timeout as a duration.
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Resolve a relative database path against `base`.
    pub fn relative_to(&self, base: &Path) -> Self {
        Self {
            path: resolve(base, &self.path),
            busy_timeout_ms: self.busy_timeout_ms,
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/shelf.db")
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

/// Import configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Line-delimited JSON book records.
    #[serde(default = "default_books_file")]
    pub books: PathBuf,

    /// Line-delimited JSON author records.
    #[serde(default = "default_authors_file")]
    pub authors: PathBuf,

    /// Line-delimited JSON review records.
    #[serde(default = "default_reviews_file")]
    pub reviews: PathBuf,

    /// Comma-delimited `id,username,password` lines.
    #[serde(default = "default_users_file")]
    pub users: PathBuf,

    /// Number of parallel workers for record parsing (0 = one per core).
    #[serde(default = "default_import_workers")]
    pub workers: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            books: default_books_file(),
            authors: default_authors_file(),
            reviews: default_reviews_file(),
            users: default_users_file(),
            workers: default_import_workers(),
        }
    }
}

impl ImportConfig {
    /// Resolve relative source paths against `base`.
    pub fn relative_to(&self, base: &Path) -> Self {
        Self {
            books: resolve(base, &self.books),
            authors: resolve(base, &self.authors),
            reviews: resolve(base, &self.reviews),
            users: resolve(base, &self.users),
            workers: self.workers,
        }
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_relative() {
        base.join(path)
    } else {
        path.to_path_buf()
    }
}

fn default_books_file() -> PathBuf {
    PathBuf::from("data/books.json")
}

fn default_authors_file() -> PathBuf {
    PathBuf::from("data/authors.json")
}

fn default_reviews_file() -> PathBuf {
    PathBuf::from("data/reviews.json")
}

fn default_users_file() -> PathBuf {
    PathBuf::from("data/users.txt")
}

fn default_import_workers() -> usize {
    0
}

/// Sample reading collection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedConfig {
    /// User receiving the collection (empty to skip seeding).
    #[serde(default = "default_seed_user")]
    pub user: String,

    /// Collection name.
    #[serde(default = "default_seed_collection")]
    pub collection: String,

    /// Status of each seeded entry.
    #[serde(default = "default_seed_status")]
    pub status: String,

    /// Pages read of each seeded entry.
    #[serde(default = "default_seed_pages")]
    pub pages_read: u32,

    /// Number of leading catalog books to add.
    #[serde(default = "default_seed_books")]
    pub books: usize,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            user: default_seed_user(),
            collection: default_seed_collection(),
            status: default_seed_status(),
            pages_read: default_seed_pages(),
            books: default_seed_books(),
        }
    }
}

fn default_seed_user() -> String {
    "samuel".to_string()
}

fn default_seed_collection() -> String {
    "currently reading".to_string()
}

fn default_seed_status() -> String {
    crate::library::STATUS_READING.to_string()
}

fn default_seed_pages() -> u32 {
    146
}

fn default_seed_books() -> usize {
    5
}

/// Recommendation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendConfig {
    /// Default sampling seed for related books.
    #[serde(default = "default_recommend_seed")]
    pub seed: u64,
}

impl Default for RecommendConfig {
    fn default() -> Self {
        Self {
            seed: default_recommend_seed(),
        }
    }
}

fn default_recommend_seed() -> u64 {
    42
}

impl Config {
    /// Load configuration from file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| AppError::Config(format!("Failed to parse config file: {}", e)))
    }

    /// Find config file in default locations.
    pub fn find_config_file() -> Option<PathBuf> {
        let candidates = [
            PathBuf::from("config.toml"),
            PathBuf::from("shelf-rs.toml"),
            dirs::config_dir()
                .map(|p| p.join("shelf-rs").join("config.toml"))
                .unwrap_or_default(),
            PathBuf::from("/etc/shelf-rs/config.toml"),
        ];

        candidates.into_iter().find(|p| p.exists())
    }

    /// Generate default config file content.
    pub fn generate_default() -> String {
        r#"# shelf-rs configuration

[repository]
# Backend: "memory" (re-imported on every run) or "sqlite"
backend = "memory"

[database]
# path = "/var/lib/shelf-rs/shelf.db"
# Milliseconds a storage operation waits on a locked database
busy_timeout_ms = 5000

[import]
books = "data/books.json"
authors = "data/authors.json"
reviews = "data/reviews.json"
users = "data/users.txt"
# Parallel parse workers (0 = one per core)
workers = 0

[seed]
# User receiving a sample reading collection after import ("" to skip)
user = "samuel"
collection = "currently reading"
status = "Reading"
pages_read = 146
books = 5

[recommend]
# Default seed for related-book sampling
seed = 42
"#
        .to_string()
    }
}
