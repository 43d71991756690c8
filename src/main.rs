mod catalog;
mod fetch;
mod http;
mod listing;
mod rdf;
mod segment;
mod store;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};

use crate::catalog::Catalog;
use crate::fetch::DedupPolicy;
use crate::http::HttpSource;
use crate::rdf::MetadataMap;
use crate::store::{Artifact, BookFormat, Store};

const DEFAULT_LANGUAGE: &str = "en";

#[derive(Parser)]
#[command(name = "gutenberg", about = "Project Gutenberg harvester and chapter segmenter")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download pg_catalog.csv and keep the texts of one language
    Catalog {
        /// Language code to keep
        #[arg(short, long, default_value = DEFAULT_LANGUAGE)]
        language: String,
    },
    /// Enrich the catalog from the RDF corpus (builds the catalog if absent)
    Metadata {
        #[arg(short, long, default_value = DEFAULT_LANGUAGE)]
        language: String,
    },
    /// List subjects, optionally filtered by substring
    Subjects {
        #[arg(short, long)]
        filter: Option<String>,
    },
    /// List books having a matching subject
    Books {
        #[arg(short, long)]
        filter: Option<String>,
    },
    /// Download book assets
    Fetch {
        #[command(flatten)]
        args: FetchArgs,
    },
    /// Split downloaded assets into chapters (or trimmed text)
    Segment {
        #[arg(short = 'F', long, value_enum, default_value_t = BookFormat::Epub)]
        format: BookFormat,
    },
    /// Fetch + segment in one pipeline
    Parse {
        #[command(flatten)]
        args: FetchArgs,
    },
    /// Show what is on disk
    Stats,
}

#[derive(clap::Args)]
struct FetchArgs {
    /// Book list written by `books` (default: every book in the metadata)
    #[arg(short, long)]
    book_list: Option<PathBuf>,
    #[arg(short = 'F', long, value_enum, default_value_t = BookFormat::Epub)]
    format: BookFormat,
    /// Download books whose (author, title) was already fetched this run
    #[arg(long)]
    keep_duplicates: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let store = Store::open_default()?;

    let result = match cli.command {
        Commands::Catalog { language } => {
            let source = HttpSource::new()?;
            let catalog = catalog::prepare(&source, &store, &language).await?;
            if catalog.is_empty() {
                println!("No '{}' texts in the catalog.", language);
            }
            Ok(())
        }
        Commands::Metadata { language } => {
            let source = HttpSource::new()?;
            let metadata = rdf::prepare(&source, &store, &language).await?;
            println!("Metadata for {} books", metadata.len());
            Ok(())
        }
        Commands::Subjects { filter } => {
            let Some(metadata) = load_metadata(&store)? else {
                println!("No metadata. Run 'metadata' first.");
                return Ok(());
            };
            let subjects = listing::list_subjects(&metadata, filter.as_deref());
            println!("Found {} subjects", subjects.len());
            store.write_json(&Artifact::SubjectList, &subjects)?;
            Ok(())
        }
        Commands::Books { filter } => {
            let Some(metadata) = load_metadata(&store)? else {
                println!("No metadata. Run 'metadata' first.");
                return Ok(());
            };
            let books = listing::list_books(&metadata, filter.as_deref());
            println!("Found {} books", books.len());
            store.write_json(&Artifact::BookList, &books)?;
            Ok(())
        }
        Commands::Fetch { args } => fetch(&store, &args).await,
        Commands::Segment { format } => {
            let stats = segment::segment_books(&store, format)?;
            stats.print();
            Ok(())
        }
        Commands::Parse { args } => {
            // Phase 1: Fetch
            let t_fetch = Instant::now();
            fetch(&store, &args).await?;
            println!("Fetched in {}", elapsed(t_fetch));

            // Phase 2: Segment
            let t_segment = Instant::now();
            let stats = segment::segment_books(&store, args.format)?;
            println!("Segmented in {}", elapsed(t_segment));
            stats.print();
            Ok(())
        }
        Commands::Stats => {
            let catalog = if store.exists(&Artifact::Catalog) {
                store.read_json::<Catalog>(&Artifact::Catalog)?.len()
            } else {
                0
            };
            let metadata = load_metadata(&store)?.map_or(0, |m| m.len());
            println!("Data dir:  {}", store.root().display());
            println!("Catalog:   {}", catalog);
            println!("Metadata:  {}", metadata);
            for format in [BookFormat::Epub, BookFormat::Txt] {
                println!(
                    "{:<5} downloaded {}, segmented {}",
                    format,
                    store.assets(format)?.len(),
                    store.contents(format)?.len()
                );
            }
            Ok(())
        }
    };

    if t0.elapsed().as_secs() >= 1 {
        println!("\nDone in {}", elapsed(t0));
    }

    result
}

fn load_metadata(store: &Store) -> anyhow::Result<Option<MetadataMap>> {
    if !store.exists(&Artifact::Metadata) {
        return Ok(None);
    }
    Ok(Some(store.read_json(&Artifact::Metadata)?))
}

async fn fetch(store: &Store, args: &FetchArgs) -> anyhow::Result<()> {
    let source = HttpSource::new()?;
    let metadata = rdf::prepare(&source, store, DEFAULT_LANGUAGE).await?;

    let ids = match &args.book_list {
        Some(path) => fetch::read_book_list(path)?,
        None => metadata.keys().copied().collect(),
    };
    let policy = if args.keep_duplicates {
        DedupPolicy::Advisory
    } else {
        DedupPolicy::Enforce
    };

    println!("Fetching {} {} books...", ids.len(), args.format);
    let stats = fetch::fetch_books(&source, store, &metadata, &ids, args.format, policy).await?;
    stats.print();
    Ok(())
}

fn elapsed(since: Instant) -> String {
    clock(since.elapsed())
}

/// `4.2s`, `3m07s`, `2h05m`.
fn clock(d: Duration) -> String {
    match d.as_secs() {
        0..=59 => format!("{:.1}s", d.as_secs_f64()),
        s @ 60..=3599 => format!("{}m{:02}s", s / 60, s % 60),
        s => format!("{}h{:02}m", s / 3600, s % 3600 / 60),
    }
}

// ── Tests ──
