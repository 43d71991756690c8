use std::fs::File;
use std::io;

use anyhow::{Context, Result};
use tracing::info;
use zip::ZipArchive;

use crate::http::{self, Source};
use crate::store::{Artifact, Store};

const RDF_ARCHIVE_URL: &str = "https://www.gutenberg.org/cache/epub/feeds/rdf-files.tar.zip";

/// Make sure `rdf-files/` is on disk: download the archive, unzip the
/// tarball out of it, untar it. Each step is skipped when its output
/// already exists.
pub async fn ensure_corpus<S: Source>(source: &S, store: &Store) -> Result<()> {
    if store.exists(&Artifact::RdfDir) {
        info!("rdf-files directory already exists");
        return Ok(());
    }

    http::download_once(source, store, &Artifact::RdfArchive, RDF_ARCHIVE_URL).await?;
    unzip_tarball(store)?;
    untar(store)
}

fn unzip_tarball(store: &Store) -> Result<()> {
    if store.exists(&Artifact::RdfTarball) {
        info!("rdf-files.tar already exists");
        return Ok(());
    }

    info!("Unzipping rdf-files.tar.zip...");
    let archive_path = store.path(&Artifact::RdfArchive);
    let file = File::open(&archive_path)
        .with_context(|| format!("Failed to open {}", archive_path.display()))?;
    let mut archive = ZipArchive::new(file).context("rdf-files.tar.zip is not a zip archive")?;

    let index = (0..archive.len())
        .find(|&i| {
            archive
                .name_for_index(i)
                .is_some_and(|name| name.ends_with(".tar"))
        })
        .context("No tarball inside rdf-files.tar.zip")?;

    store.write_with(&Artifact::RdfTarball, |out| {
        let mut entry = archive.by_index(index)?;
        io::copy(&mut entry, out)?;
        Ok(())
    })?;
    info!("Unzipped rdf-files.tar");
    Ok(())
}

fn untar(store: &Store) -> Result<()> {
    info!("Untarring rdf-files.tar...");
    let tar_path = store.path(&Artifact::RdfTarball);
    store.write_dir_with(&Artifact::RdfDir, |dir| {
        let file = File::open(&tar_path)
            .with_context(|| format!("Failed to open {}", tar_path.display()))?;
        tar::Archive::new(file).unpack(dir)?;
        Ok(())
    })?;
    info!("Untarred rdf-files.tar");
    Ok(())
}

// ── Tests ──
