use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::agents::{Contributor, ContributorCache, Role};
use super::xml::{self, Element, DCTERMS, MARCREL, PGTERMS, RDF};
use crate::store::BookFormat;

static EBOOK_ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^ebooks/(\d+)$").unwrap());

const EPUB_SUFFIX: &str = ".epub.noimages";
const TXT_SUFFIX: &str = ".txt.utf-8";

/// Per-book metadata extracted from its RDF document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookMetadata {
    pub publisher: String,
    pub license: String,
    pub issued_date: String,
    pub rights: String,
    pub downloads: u64,
    pub authors: Vec<Contributor>,
    pub editors: Vec<Contributor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub language: String,
    pub subjects: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bookshelf: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub epub_noimages_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub txt_link: Option<String>,
}

impl BookMetadata {
    pub fn link(&self, format: BookFormat) -> Option<&str> {
        match format {
            BookFormat::Epub => self.epub_noimages_link.as_deref(),
            BookFormat::Txt => self.txt_link.as_deref(),
        }
    }
}

/// Parse one `pgN.rdf` document. Returns the ebook id the document
/// declares alongside its metadata.
///
/// Every required field is read before any contributor is resolved, so a
/// rejected document leaves `agents` untouched.
pub fn parse_book(rdf: &str, agents: &mut ContributorCache) -> Result<(u64, BookMetadata)> {
    let root = xml::parse(rdf)?;
    let ebook = root.find(PGTERMS, "ebook").context("Missing pgterms:ebook")?;

    let about = ebook.attr(RDF, "about").context("Missing ebook rdf:about")?;
    let id: u64 = EBOOK_ID_RE
        .captures(about)
        .and_then(|c| c[1].parse().ok())
        .with_context(|| format!("Unrecognised ebook id {:?}", about))?;

    let publisher = required_text(ebook, DCTERMS, "publisher")?;
    let license = ebook
        .find(DCTERMS, "license")
        .and_then(|l| l.attr(RDF, "resource"))
        .context("Missing dcterms:license")?
        .to_string();
    let issued_date = required_text(ebook, DCTERMS, "issued")?;
    let rights = required_text(ebook, DCTERMS, "rights")?;
    let downloads_raw = required_text(ebook, PGTERMS, "downloads")?;
    let downloads = downloads_raw
        .parse()
        .with_context(|| format!("Invalid pgterms:downloads {:?}", downloads_raw))?;
    let language = ebook
        .path(&[(DCTERMS, "language"), (RDF, "Description"), (RDF, "value")])
        .and_then(Element::text)
        .context("Missing dcterms:language")?
        .to_string();

    let title = ebook
        .find(DCTERMS, "title")
        .and_then(Element::text)
        .map(str::to_string);
    if title.is_none() {
        warn!("Could not find title in {}", id);
    }

    let subjects = ebook
        .find_all(DCTERMS, "subject")
        .filter_map(described_value)
        .map(str::to_string)
        .collect();
    let bookshelf = ebook
        .find(PGTERMS, "bookshelf")
        .and_then(described_value)
        .map(str::to_string);

    let (epub_noimages_link, txt_link) = format_links(ebook);

    let editors = ebook
        .find_all(MARCREL, "edt")
        .filter_map(|e| agents.resolve(e, id, Role::Editor))
        .collect();
    let authors = ebook
        .find_all(DCTERMS, "creator")
        .filter_map(|c| agents.resolve(c, id, Role::Creator))
        .collect();

    Ok((
        id,
        BookMetadata {
            publisher,
            license,
            issued_date,
            rights,
            downloads,
            authors,
            editors,
            title,
            language,
            subjects,
            bookshelf,
            epub_noimages_link,
            txt_link,
        },
    ))
}

fn required_text(el: &Element, ns: &str, name: &str) -> Result<String> {
    el.find(ns, name)
        .and_then(Element::text)
        .map(str::to_string)
        .with_context(|| format!("Missing {}", name))
}

/// `<x><rdf:Description><rdf:value>…` as used by subjects and bookshelves.
fn described_value(el: &Element) -> Option<&str> {
    el.path(&[(RDF, "Description"), (RDF, "value")])
        .and_then(Element::text)
}

/// First EPUB-without-images and first UTF-8 text link, scanning no further
/// than needed.
fn format_links(ebook: &Element) -> (Option<String>, Option<String>) {
    let mut epub = None;
    let mut txt = None;

    for has_format in ebook.find_all(DCTERMS, "hasFormat") {
        let Some(link) = has_format
            .find(PGTERMS, "file")
            .and_then(|f| f.attr(RDF, "about"))
        else {
            continue;
        };
        if epub.is_none() && link.ends_with(EPUB_SUFFIX) {
            epub = Some(link.to_string());
        } else if txt.is_none() && link.ends_with(TXT_SUFFIX) {
            txt = Some(link.to_string());
        }
        if epub.is_some() && txt.is_some() {
            break;
        }
    }

    (epub, txt)
}

// ── Tests ──
