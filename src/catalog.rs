use std::collections::HashMap;
use std::fmt;
use std::io::Read;

use anyhow::{Context, Result};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{info, warn};

use crate::http::{self, Source};
use crate::store::{Artifact, Store};

const CATALOG_URL: &str = "https://www.gutenberg.org/cache/epub/feeds/pg_catalog.csv";

/// One text edition from the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Carried as the key of the persisted mapping.
    #[serde(skip)]
    pub id: u64,
    pub issued_date: String,
    pub title: String,
    pub language: String,
    pub authors: Vec<String>,
    pub subjects: Vec<String>,
}

/// Catalog entries keyed by id, in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.entries.iter().map(|e| e.id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.iter()
    }
}

impl Serialize for Catalog {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for entry in &self.entries {
            map.serialize_entry(&entry.id.to_string(), entry)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Catalog {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CatalogVisitor;

        impl<'de> Visitor<'de> for CatalogVisitor {
            type Value = Catalog;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of catalog entries keyed by book id")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Catalog, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((key, mut entry)) = map.next_entry::<String, CatalogEntry>()? {
                    entry.id = key.parse().map_err(serde::de::Error::custom)?;
                    entries.push(entry);
                }
                Ok(Catalog { entries })
            }
        }

        deserializer.deserialize_map(CatalogVisitor)
    }
}

#[derive(Debug, Deserialize)]
struct CatalogRow {
    #[serde(rename = "Text#")]
    id: String,
    #[serde(rename = "Type")]
    kind: String,
    #[serde(rename = "Issued")]
    issued: String,
    #[serde(rename = "Title")]
    title: String,
    #[serde(rename = "Language")]
    language: String,
    #[serde(rename = "Authors")]
    authors: String,
    #[serde(rename = "Subjects")]
    subjects: String,
}

/// Parse the catalog CSV, keeping text editions in `language`.
/// Any malformed row fails the whole parse.
pub fn parse_catalog<R: Read>(reader: R, language: &str) -> Result<Catalog> {
    let mut rows = csv::Reader::from_reader(reader);
    let mut entries: Vec<CatalogEntry> = Vec::new();
    let mut positions: HashMap<u64, usize> = HashMap::new();

    for (i, row) in rows.deserialize::<CatalogRow>().enumerate() {
        // +2: header line, 1-based
        let row = row.with_context(|| format!("Malformed catalog row at line {}", i + 2))?;
        if row.kind != "Text" || row.language != language {
            continue;
        }
        let id = row
            .id
            .trim()
            .parse::<u64>()
            .with_context(|| format!("Invalid Text# {:?} at line {}", row.id, i + 2))?;

        let entry = CatalogEntry {
            id,
            issued_date: row.issued,
            title: row.title,
            language: row.language,
            authors: split_field(&row.authors),
            subjects: split_field(&row.subjects),
        };

        // A repeated id replaces the earlier row but keeps its position
        match positions.get(&id) {
            Some(&at) => {
                warn!("Duplicate Text# {} at line {}, keeping the later row", id, i + 2);
                entries[at] = entry;
            }
            None => {
                positions.insert(id, entries.len());
                entries.push(entry);
            }
        }
    }

    Ok(Catalog { entries })
}

/// Split a `;`-delimited multi-valued field into trimmed, non-empty parts.
pub fn split_field(value: &str) -> Vec<String> {
    value
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Load the catalog mapping, building it from the (downloaded on demand)
/// catalog CSV when it has not been persisted yet.
pub async fn prepare<S: Source>(source: &S, store: &Store, language: &str) -> Result<Catalog> {
    if store.exists(&Artifact::Catalog) {
        let catalog: Catalog = store.read_json(&Artifact::Catalog)?;
        if let Some(entry) = catalog.iter().find(|e| e.language != language) {
            warn!(
                "Cached catalog holds language {:?}, not {:?}; delete {} to rebuild",
                entry.language,
                language,
                store.path(&Artifact::Catalog).display()
            );
        }
        info!("Loaded {} catalog entries", catalog.len());
        return Ok(catalog);
    }

    http::download_once(source, store, &Artifact::CatalogCsv, CATALOG_URL).await?;

    let path = store.path(&Artifact::CatalogCsv);
    let file = std::fs::File::open(&path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let catalog = parse_catalog(file, language)?;
    println!("Found {} books in {}", catalog.len(), language);

    store.write_json(&Artifact::Catalog, &catalog)?;
    Ok(catalog)
}

// ── Tests ──
