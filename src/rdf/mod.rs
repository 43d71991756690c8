pub mod agents;
pub mod corpus;
pub mod document;
pub mod xml;

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::catalog::{self, Catalog};
use crate::http::Source;
use crate::store::{Artifact, Store};
use agents::ContributorCache;
pub use document::BookMetadata;

/// Enriched metadata keyed by book id.
pub type MetadataMap = BTreeMap<u64, BookMetadata>;

#[derive(Debug, Default, PartialEq)]
pub struct EnrichStats {
    pub enriched: usize,
    pub missing: usize,
    pub malformed: usize,
}

/// Load the metadata mapping, building the catalog, fetching the RDF
/// corpus and enriching every catalog entry first when needed.
pub async fn prepare<S: Source>(source: &S, store: &Store, language: &str) -> Result<MetadataMap> {
    if store.exists(&Artifact::Metadata) {
        let metadata: MetadataMap = store.read_json(&Artifact::Metadata)?;
        info!("Loaded metadata for {} books", metadata.len());
        return Ok(metadata);
    }

    let catalog = catalog::prepare(source, store, language).await?;
    corpus::ensure_corpus(source, store).await?;

    let (metadata, stats) = enrich(store, &catalog)?;
    println!(
        "Enriched {} books ({} without RDF, {} malformed)",
        stats.enriched, stats.missing, stats.malformed
    );

    store.write_json(&Artifact::Metadata, &metadata)?;
    Ok(metadata)
}

/// Parse the RDF document of every catalog entry, in ascending id order so
/// contributor back-references resolve against earlier books.
pub fn enrich(store: &Store, catalog: &Catalog) -> Result<(MetadataMap, EnrichStats)> {
    let mut ids: Vec<u64> = catalog.ids().collect();
    ids.sort_unstable();
    println!("Found {} books", ids.len());

    let pb = ProgressBar::new(ids.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    let mut agents = ContributorCache::default();
    let mut metadata = MetadataMap::new();
    let mut stats = EnrichStats::default();

    for id in ids {
        pb.inc(1);
        let path = store.path(&Artifact::RdfDocument(id));
        if !path.exists() {
            warn!("Could not find {} in rdf-files but found in catalog metadata", path.display());
            stats.missing += 1;
            continue;
        }

        let parsed = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))
            .and_then(|rdf| document::parse_book(&rdf, &mut agents));
        match parsed {
            Ok((rdf_id, _)) if rdf_id != id => {
                warn!("{} describes ebook {}, skipping", path.display(), rdf_id);
                stats.malformed += 1;
            }
            Ok((_, book)) => {
                metadata.insert(id, book);
                stats.enriched += 1;
            }
            Err(e) => {
                warn!("Skipping book {}: {:#}", id, e);
                stats.malformed += 1;
            }
        }
    }

    pb.finish_and_clear();
    info!(
        "Enriched {} books, {} agents cached",
        stats.enriched,
        agents.len()
    );
    Ok((metadata, stats))
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn store_with_rdf(ids: &[u64]) -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        for id in ids {
            let dest = store.path(&Artifact::RdfDocument(*id));
            fs::create_dir_all(dest.parent().unwrap()).unwrap();
            fs::copy(format!("tests/fixtures/rdf/pg{}.rdf", id), dest).unwrap();
        }
        (dir, store)
    }

    fn catalog() -> Catalog {
        let file = fs::File::open("tests/fixtures/pg_catalog.csv").unwrap();
        catalog::parse_catalog(file, "en").unwrap()
    }

    #[test]
    fn enriches_in_ascending_id_order() {
        // Catalog file order is 11, 12, 2, 84; 12 back-references agent 7
        // declared by 11, which only works if 11 is processed first.
        let (_dir, store) = store_with_rdf(&[2, 11, 12, 84]);
        let (metadata, stats) = enrich(&store, &catalog()).unwrap();

        assert_eq!(
            stats,
            EnrichStats {
                enriched: 3,
                missing: 0,
                malformed: 1,
            }
        );
        assert_eq!(metadata.keys().copied().collect::<Vec<_>>(), vec![2, 11, 12]);
        assert_eq!(metadata[&12].authors[0].name, "Carroll, Lewis");
    }

    #[test]
    fn missing_documents_are_skipped() {
        let (_dir, store) = store_with_rdf(&[12]);
        let (metadata, stats) = enrich(&store, &catalog()).unwrap();

        assert_eq!(stats.missing, 3);
        assert_eq!(metadata.len(), 1);
        // Without pg11 the back-reference has nothing to resolve against
        assert!(metadata[&12].authors.is_empty());
    }

    #[test]
    fn document_for_another_ebook_is_rejected() {
        let (_dir, store) = store_with_rdf(&[]);
        let dest = store.path(&Artifact::RdfDocument(84));
        fs::create_dir_all(dest.parent().unwrap()).unwrap();
        fs::copy("tests/fixtures/rdf/pg2.rdf", dest).unwrap();

        let (metadata, stats) = enrich(&store, &catalog()).unwrap();
        assert!(metadata.is_empty());
        assert_eq!(stats.malformed, 1);
    }

    #[test]
    fn metadata_map_round_trips_through_json() {
        let (_dir, store) = store_with_rdf(&[2, 11, 12]);
        let (metadata, _) = enrich(&store, &catalog()).unwrap();
        store.write_json(&Artifact::Metadata, &metadata).unwrap();

        let loaded: MetadataMap = store.read_json(&Artifact::Metadata).unwrap();
        assert_eq!(loaded, metadata);
    }
}
