//! shelf-rs entry point.

use clap::Parser;
use shelf_rs::{
    auth::AuthService,
    config::{Backend, Cli, Command, Config, SearchCommand, UserCommand},
    db::SqliteRepository,
    import::{BulkImporter, ImportReport},
    library::{Book, Publisher},
    repository::{MemoryRepository, Repository, RepositoryHandle, into_handle},
};
use std::collections::HashSet;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shelf_rs=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    // Find or load config
    let config_path = cli.config.clone().or_else(Config::find_config_file);

    let mut config = if let Some(ref path) = config_path {
        Config::load(path)?
    } else {
        Config::default()
    };

    // Import sources and the database are resolved next to the config file
    let base = config_path
        .as_deref()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .unwrap_or_default();
    config.database = config.database.relative_to(&base);

    match cli.command {
        Command::Init { force } => cmd_init(force, &config),
        Command::Import => cmd_import(&config, &base),
        Command::Stats => cmd_stats(&config, &base),
        Command::Search { query } => cmd_search(query, &config, &base),
        Command::Related { book_id, seed } => cmd_related(book_id, seed, &config, &base),
        Command::User { action } => cmd_user(action, &config, &base),
    }
}

/// Build the configured backend. The memory backend is populated from the
/// import sources right away.
fn open_repository(
    config: &Config,
    base: &Path,
) -> anyhow::Result<(RepositoryHandle, Option<ImportReport>)> {
    match config.repository.backend {
        Backend::Memory => {
            let repo = into_handle(MemoryRepository::new());
            let report = populate(&repo, config, base)?;
            Ok((repo, Some(report)))
        }
        Backend::Sqlite => {
            let repo =
                SqliteRepository::open(&config.database.path, config.database.busy_timeout())?;
            Ok((into_handle(repo), None))
        }
    }
}

/// Run the bulk importer, then seed the sample reading collection.
fn populate(
    repo: &RepositoryHandle,
    config: &Config,
    base: &Path,
) -> anyhow::Result<ImportReport> {
    let importer = BulkImporter::new(Arc::clone(repo), config.import.workers)?;
    let report = importer.run(&config.import.relative_to(base))?;
    importer.seed_reading_collection(&config.seed)?;
    Ok(report)
}

/// Initialize config and database.
fn cmd_init(force: bool, config: &Config) -> anyhow::Result<()> {
    let config_path = PathBuf::from("config.toml");

    if config_path.exists() && !force {
        anyhow::bail!(
            "Config file already exists: {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    // Write default config
    std::fs::write(&config_path, Config::generate_default())?;
    println!("Created config file: {}", config_path.display());

    if config.repository.backend == Backend::Sqlite {
        let _db = SqliteRepository::open(&config.database.path, config.database.busy_timeout())?;
        println!("Initialized database: {}", config.database.path.display());
    }

    println!("\nEdit config.toml to point [import] at your catalog files.");
    println!("Then run: shelf-rs import");

    Ok(())
}

/// Import the configured sources into the configured backend.
fn cmd_import(config: &Config, base: &Path) -> anyhow::Result<()> {
    let (repo, report) = open_repository(config, base)?;
    let report = match report {
        Some(report) => {
            tracing::warn!("Memory backend selected, the import lasts for this run only");
            report
        }
        None => populate(&repo, config, base)?,
    };

    println!("Imported {}", report);
    Ok(())
}

/// Print catalog counts.
fn cmd_stats(config: &Config, base: &Path) -> anyhow::Result<()> {
    let (repo, _) = open_repository(config, base)?;
    let repo = repo.lock();

    println!("{:<12} {}", "Books", repo.get_num_books()?);
    println!("{:<12} {}", "Authors", repo.get_num_authors()?);
    println!("{:<12} {}", "Publishers", repo.get_num_publishers()?);
    println!("{:<12} {}", "Tags", repo.tags()?.len());
    println!("{:<12} {}", "Reviews", repo.reviews()?.len());
    println!("{:<12} {}", "Users", repo.users()?.len());

    Ok(())
}

/// Search the catalog.
fn cmd_search(query: SearchCommand, config: &Config, base: &Path) -> anyhow::Result<()> {
    let (repo, _) = open_repository(config, base)?;
    let repo = repo.lock();

    let books = match query {
        SearchCommand::Title { text } => repo.get_books_by_title(&text)?,
        SearchCommand::Author { name } => books_by_author_name(&**repo, &name)?,
        SearchCommand::Tag { name } => repo.get_books_by_tag(&name)?,
        SearchCommand::Publisher { name } => {
            repo.get_books_by_publisher(&Publisher::new(&name))?
        }
        SearchCommand::Years { start, end } => repo.get_books_by_date_range(start, end)?,
    };

    print_books(&books);
    Ok(())
}

/// Books of every author whose name matches, without duplicates.
fn books_by_author_name(repo: &dyn Repository, name: &str) -> anyhow::Result<Vec<Arc<Book>>> {
    let mut seen = HashSet::new();
    let mut books = Vec::new();
    for author in repo.get_authors_by_name(name)? {
        for book in repo.get_books_by_author(&author)? {
            if seen.insert(book.book_id()) {
                books.push(book);
            }
        }
    }
    Ok(books)
}

/// Recommend books related to a book.
fn cmd_related(
    book_id: u64,
    seed: Option<u64>,
    config: &Config,
    base: &Path,
) -> anyhow::Result<()> {
    let (repo, _) = open_repository(config, base)?;
    let repo = repo.lock();

    let Some(book) = repo.get_book(book_id)? else {
        anyhow::bail!("Book not found: {}", book_id);
    };

    let related = repo.get_related_books(&book, seed.unwrap_or(config.recommend.seed))?;
    print_books(&related);
    Ok(())
}

/// User management commands.
fn cmd_user(action: UserCommand, config: &Config, base: &Path) -> anyhow::Result<()> {
    let (repo, report) = open_repository(config, base)?;
    let auth = AuthService::new(repo);

    match action {
        UserCommand::Add { username, password } => {
            let (password, confirm) = match password {
                Some(p) => (p.clone(), p),
                None => (
                    prompt_password("Password: ")?,
                    prompt_password("Confirm password: ")?,
                ),
            };

            let user = auth.register(&username, &password, &confirm)?;
            let user = user.read();
            println!(
                "Created user: {} (id: {})",
                user.user_name().unwrap_or_default(),
                user.user_id()
            );
            if report.is_some() {
                tracing::warn!("Memory backend selected, the user lasts for this run only");
            }
        }

        UserCommand::Check { username, password } => {
            let password = match password {
                Some(p) => p,
                None => prompt_password("Password: ")?,
            };

            let user = auth.login(&username, &password)?;
            let user = user.read();
            println!(
                "Credentials valid: {} (id: {}, {} reviews, {} pages read)",
                user.user_name().unwrap_or_default(),
                user.user_id(),
                user.reviews().len(),
                user.pages_read()
            );
        }
    }

    Ok(())
}

fn print_books(books: &[Arc<Book>]) {
    if books.is_empty() {
        println!("No books found.");
        return;
    }

    println!("{:<12} {:<6} {:<40} AUTHORS", "ID", "YEAR", "TITLE");
    println!("{}", "-".repeat(80));
    for book in books {
        let year = book
            .release_year()
            .map(|y| y.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<12} {:<6} {:<40} {}",
            book.book_id(),
            year,
            book.title(),
            book.authors_display()
        );
    }
}

/// Prompt for password input.
fn prompt_password(prompt: &str) -> anyhow::Result<String> {
    print!("{}", prompt);
    io::stdout().flush()?;

    let mut password = String::new();
    io::stdin().read_line(&mut password)?;

    Ok(password.trim().to_string())
}
