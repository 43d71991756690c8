use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

const DATA_DIR: &str = "data";
const DATA_DIR_ENV: &str = "GUTENBERG_DATA_DIR";

/// Asset formats a book can be fetched and segmented in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BookFormat {
    /// EPUB without images, segmented into chapters
    Epub,
    /// UTF-8 plain text, trimmed to the body
    Txt,
}

impl BookFormat {
    pub fn extension(self) -> &'static str {
        match self {
            BookFormat::Epub => "epub",
            BookFormat::Txt => "txt",
        }
    }
}

impl fmt::Display for BookFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.extension())
    }
}

/// Everything the pipeline persists, keyed by stage and (where relevant)
/// book id and format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact {
    CatalogCsv,
    Catalog,
    RdfArchive,
    RdfTarball,
    RdfDir,
    RdfDocument(u64),
    Metadata,
    BookList,
    SubjectList,
    Asset(u64, BookFormat),
    Content(u64, BookFormat),
}

/// Checkpoint store rooted at the data directory.
///
/// An artifact that exists is complete: every write lands in a `.part`
/// sibling first and is renamed into place only on success, so a step
/// whose artifact exists can always be skipped.
pub struct Store {
    root: PathBuf,
}

impl Store {
    /// Open the store at `$GUTENBERG_DATA_DIR`, or `data/` when unset.
    pub fn open_default() -> Result<Self> {
        let root = std::env::var_os(DATA_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DATA_DIR));
        Self::open(root)
    }

    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create data directory {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, artifact: &Artifact) -> PathBuf {
        match *artifact {
            Artifact::CatalogCsv => self.root.join("pg_catalog.csv"),
            Artifact::Catalog => self.root.join("catalog_metadata.json"),
            Artifact::RdfArchive => self.root.join("rdf-files.tar.zip"),
            Artifact::RdfTarball => self.root.join("rdf-files.tar"),
            Artifact::RdfDir => self.root.join("rdf-files"),
            Artifact::RdfDocument(id) => self
                .root
                .join("rdf-files/cache/epub")
                .join(id.to_string())
                .join(format!("pg{}.rdf", id)),
            Artifact::Metadata => self.root.join("rdf_metadata.json"),
            Artifact::BookList => self.root.join("book_list.json"),
            Artifact::SubjectList => self.root.join("subject_list.json"),
            Artifact::Asset(id, format) => self
                .asset_dir(format)
                .join(format!("{}.{}", id, format.extension())),
            Artifact::Content(id, format) => {
                let ext = match format {
                    BookFormat::Epub => "json",
                    BookFormat::Txt => "txt",
                };
                self.root.join("contents").join(format!("{}.{}", id, ext))
            }
        }
    }

    pub fn exists(&self, artifact: &Artifact) -> bool {
        self.path(artifact).exists()
    }

    pub fn read_bytes(&self, artifact: &Artifact) -> Result<Vec<u8>> {
        let path = self.path(artifact);
        fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))
    }

    pub fn read_json<T: DeserializeOwned>(&self, artifact: &Artifact) -> Result<T> {
        let path = self.path(artifact);
        let file = File::open(&path).with_context(|| format!("Failed to open {}", path.display()))?;
        serde_json::from_reader(std::io::BufReader::new(file))
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn write_bytes(&self, artifact: &Artifact, bytes: &[u8]) -> Result<()> {
        self.write_with(artifact, |file| Ok(file.write_all(bytes)?))
    }

    pub fn write_json<T: Serialize + ?Sized>(&self, artifact: &Artifact, value: &T) -> Result<()> {
        self.write_with(artifact, |file| {
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, value)?;
            writer.flush()?;
            Ok(())
        })
    }

    /// Stream an artifact through `write`, committing it only if `write`
    /// returns `Ok`.
    pub fn write_with<F>(&self, artifact: &Artifact, write: F) -> Result<()>
    where
        F: FnOnce(&mut File) -> Result<()>,
    {
        let path = self.path(artifact);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let part = part_path(&path);
        let mut file =
            File::create(&part).with_context(|| format!("Failed to create {}", part.display()))?;

        if let Err(e) = write(&mut file).and_then(|_| Ok(file.sync_all()?)) {
            drop(file);
            let _ = fs::remove_file(&part);
            return Err(e.context(format!("Failed to write {}", path.display())));
        }

        fs::rename(&part, &path)
            .with_context(|| format!("Failed to move {} into place", path.display()))
    }

    /// Populate a directory artifact through `fill`, committing it only if
    /// `fill` returns `Ok`.
    pub fn write_dir_with<F>(&self, artifact: &Artifact, fill: F) -> Result<()>
    where
        F: FnOnce(&Path) -> Result<()>,
    {
        let path = self.path(artifact);
        let part = part_path(&path);
        if part.exists() {
            fs::remove_dir_all(&part)?;
        }
        fs::create_dir_all(&part)?;

        if let Err(e) = fill(&part) {
            let _ = fs::remove_dir_all(&part);
            return Err(e.context(format!("Failed to populate {}", path.display())));
        }

        fs::rename(&part, &path)
            .with_context(|| format!("Failed to move {} into place", path.display()))
    }

    /// Ids of every materialised asset of `format`, ascending.
    pub fn assets(&self, format: BookFormat) -> Result<Vec<u64>> {
        numeric_stems(&self.asset_dir(format), format.extension())
    }

    /// Ids of every written content artifact of `format`, ascending.
    pub fn contents(&self, format: BookFormat) -> Result<Vec<u64>> {
        let ext = match format {
            BookFormat::Epub => "json",
            BookFormat::Txt => "txt",
        };
        numeric_stems(&self.root.join("contents"), ext)
    }

    fn asset_dir(&self, format: BookFormat) -> PathBuf {
        self.root.join(format!("{}s", format.extension()))
    }
}

fn part_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

fn numeric_stems(dir: &Path, ext: &str) -> Result<Vec<u64>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut ids = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("Failed to list {}", dir.display()))? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some(ext) {
            continue;
        }
        if let Some(id) = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse::<u64>().ok())
        {
            ids.push(id);
        }
    }
    ids.sort_unstable();
    Ok(ids)
}

// ── Tests ──
