use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use tracing::{info, warn};

use crate::http::Source;
use crate::rdf::{BookMetadata, MetadataMap};
use crate::store::{Artifact, BookFormat, Store};

/// What to do with a book whose (contributor, title) pair was already
/// downloaded earlier in the same run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupPolicy {
    /// Skip it as a likely duplicate edition.
    Enforce,
    /// Log it and download anyway.
    Advisory,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ContributorKey {
    Id(u64),
    Alias(String),
}

/// (contributor, title) pairs downloaded during this run. Never evicted,
/// never persisted; books already on disk at start are not in it.
#[derive(Debug, Default)]
pub struct DedupCache {
    seen: HashSet<(ContributorKey, String)>,
}

impl DedupCache {
    fn keys(book: &BookMetadata) -> Vec<(ContributorKey, String)> {
        let Some(title) = &book.title else {
            return Vec::new();
        };
        book.authors
            .iter()
            .flat_map(|author| {
                std::iter::once(ContributorKey::Id(author.id))
                    .chain(author.aliases.iter().cloned().map(ContributorKey::Alias))
            })
            .map(|key| (key, title.clone()))
            .collect()
    }

    /// The already-seen pair this book collides with, if any.
    pub fn duplicate_of(&self, book: &BookMetadata) -> Option<String> {
        Self::keys(book)
            .into_iter()
            .find(|key| self.seen.contains(key))
            .map(|(contributor, title)| match contributor {
                ContributorKey::Id(id) => format!("{} - {}", id, title),
                ContributorKey::Alias(alias) => format!("{} - {}", alias, title),
            })
    }

    pub fn record(&mut self, book: &BookMetadata) {
        self.seen.extend(Self::keys(book));
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct FetchStats {
    pub downloaded: usize,
    pub existing: usize,
    pub unknown: usize,
    pub no_link: usize,
    pub duplicates: usize,
    pub failed: usize,
}

impl FetchStats {
    pub fn print(&self) {
        println!(
            "Downloaded {} books ({} already on disk, {} without link, {} duplicates, {} failed, {} unknown ids).",
            self.downloaded, self.existing, self.no_link, self.duplicates, self.failed, self.unknown,
        );
    }
}

#[derive(Deserialize)]
struct ListedBook {
    id: u64,
}

/// Ids from a book list written by `books` (or any JSON array of objects
/// carrying an `id`).
pub fn read_book_list(path: &Path) -> Result<Vec<u64>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open book list {}", path.display()))?;
    let books: Vec<ListedBook> = serde_json::from_reader(std::io::BufReader::new(file))
        .with_context(|| format!("Failed to parse book list {}", path.display()))?;
    Ok(books.into_iter().map(|b| b.id).collect())
}

/// Download the `format` asset of every book in `ids` that is not on disk
/// yet. A failed download is counted and the batch moves on.
pub async fn fetch_books<S: Source>(
    source: &S,
    store: &Store,
    metadata: &MetadataMap,
    ids: &[u64],
    format: BookFormat,
    policy: DedupPolicy,
) -> Result<FetchStats> {
    let mut stats = FetchStats::default();
    let mut dedup = DedupCache::default();

    let pb = ProgressBar::new(ids.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    for &id in ids {
        pb.inc(1);
        let artifact = Artifact::Asset(id, format);
        if store.exists(&artifact) {
            stats.existing += 1;
            continue;
        }

        let Some(book) = metadata.get(&id) else {
            warn!("Book {} is not in the metadata", id);
            stats.unknown += 1;
            continue;
        };

        if let Some(pair) = dedup.duplicate_of(book) {
            match policy {
                DedupPolicy::Enforce => {
                    info!("Already downloaded {}, skipping {}", pair, id);
                    stats.duplicates += 1;
                    continue;
                }
                DedupPolicy::Advisory => info!("Already downloaded {}, fetching {} anyway", pair, id),
            }
        }

        let Some(link) = book.link(format) else {
            warn!("No {} link for {}", format, id);
            stats.no_link += 1;
            continue;
        };

        let body = match source.get(link).await {
            Ok(body) => body,
            Err(e) => {
                warn!("Failed to download {}: {:#}", id, e);
                stats.failed += 1;
                continue;
            }
        };
        store.write_bytes(&artifact, &body)?;
        info!("Downloaded {}", store.path(&artifact).display());

        dedup.record(book);
        stats.downloaded += 1;
    }

    pb.finish_and_clear();
    Ok(stats)
}

// ── Tests ──
