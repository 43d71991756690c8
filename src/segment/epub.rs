use std::io::{Cursor, Read, Seek};

use anyhow::{bail, Context, Result};
use percent_encoding::percent_decode_str;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use zip::ZipArchive;

const CONTAINER_PATH: &str = "META-INF/container.xml";
const XHTML_MEDIA_TYPE: &str = "application/xhtml+xml";

/// One XHTML content document of an EPUB.
#[derive(Debug)]
pub struct ContentDocument {
    pub path: String,
    pub markup: String,
}

#[derive(Debug, Default)]
struct ManifestItem {
    href: String,
    media_type: String,
    properties: Option<String>,
}

/// The XHTML documents of an EPUB in manifest order, navigation document
/// excluded. Anything that does not look like a readable EPUB container is
/// an error.
pub fn content_documents(bytes: &[u8]) -> Result<Vec<ContentDocument>> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).context("Not a zip archive")?;

    let container = read_entry(&mut archive, CONTAINER_PATH)?;
    let package_path = rootfile_path(&container)?;
    let package_dir = match package_path.rfind('/') {
        Some(i) => &package_path[..i],
        None => "",
    };

    let package = read_entry(&mut archive, &package_path)?;
    let manifest = parse_manifest(&package)
        .with_context(|| format!("Malformed package document {}", package_path))?;

    manifest
        .iter()
        .filter(|item| item.media_type == XHTML_MEDIA_TYPE && !is_nav(item))
        .map(|item| -> Result<ContentDocument> {
            let path = resolve_href(package_dir, &item.href)?;
            let markup = read_entry(&mut archive, &path)?;
            Ok(ContentDocument { path, markup })
        })
        .collect()
}

fn is_nav(item: &ManifestItem) -> bool {
    item.properties
        .as_deref()
        .is_some_and(|p| p.split_whitespace().any(|prop| prop == "nav"))
}

fn read_entry<R: Read + Seek>(archive: &mut ZipArchive<R>, path: &str) -> Result<String> {
    let mut entry = archive
        .by_name(path)
        .with_context(|| format!("Missing {} in EPUB", path))?;
    let mut bytes = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut bytes)?;
    let mut text = String::from_utf8(bytes).with_context(|| format!("{} is not valid UTF-8", path))?;
    if text.starts_with('\u{feff}') {
        text.drain(..'\u{feff}'.len_utf8());
    }
    Ok(text)
}

fn rootfile_path(container: &str) -> Result<String> {
    let mut reader = Reader::from_str(container);
    reader.config_mut().trim_text(true);

    loop {
        match reader.read_event().context("Malformed container.xml")? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"rootfile" => {
                if let Some(path) = attribute(&e, b"full-path")? {
                    return Ok(path);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    bail!("No rootfile found in container.xml")
}

fn parse_manifest(package: &str) -> Result<Vec<ManifestItem>> {
    let mut reader = Reader::from_str(package);
    reader.config_mut().trim_text(true);

    let mut items = Vec::new();
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"item" => {
                items.push(ManifestItem {
                    href: attribute(&e, b"href")?.context("Manifest item without href")?,
                    media_type: attribute(&e, b"media-type")?.unwrap_or_default(),
                    properties: attribute(&e, b"properties")?,
                });
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(items)
}

fn attribute(e: &BytesStart, name: &[u8]) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.local_name().as_ref() == name {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

/// Resolve a manifest href against the package directory into an archive
/// path: fragment dropped, percent-escapes decoded, `.`/`..` folded.
fn resolve_href(base: &str, href: &str) -> Result<String> {
    let href = href.split('#').next().unwrap_or(href);
    let href = percent_decode_str(href)
        .decode_utf8()
        .with_context(|| format!("Invalid href {:?}", href))?;

    let mut parts: Vec<&str> = if href.starts_with('/') {
        Vec::new()
    } else {
        base.split('/').filter(|p| !p.is_empty()).collect()
    };
    for segment in href.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if parts.pop().is_none() {
                    bail!("href {:?} escapes the archive", href);
                }
            }
            s => parts.push(s),
        }
    }
    Ok(parts.join("/"))
}

// ── Test support ──

#[cfg(test)]
pub mod build {
    use std::io::{Cursor, Write};

    use zip::write::SimpleFileOptions;
    use zip::{CompressionMethod, ZipWriter};

    /// Minimal EPUB with the package in `OEBPS/`, a nav document, and the
    /// given XHTML documents in manifest order.
    pub fn epub(documents: &[&str]) -> Vec<u8> {
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

        zip.start_file("mimetype", options).unwrap();
        zip.write_all(b"application/epub+zip").unwrap();

        zip.start_file("META-INF/container.xml", options).unwrap();
        zip.write_all(
            br#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#,
        )
        .unwrap();

        let mut manifest = String::from(
            r#"<item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>
    <item id="css" href="style.css" media-type="text/css"/>"#,
        );
        for i in 0..documents.len() {
            manifest.push_str(&format!(
                "\n    <item id=\"item{i}\" href=\"text/part%20{i}.xhtml\" media-type=\"application/xhtml+xml\"/>"
            ));
        }
        zip.start_file("OEBPS/content.opf", options).unwrap();
        zip.write_all(
            format!(
                r#"<?xml version="1.0" encoding="utf-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="id">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/"><dc:title>Test</dc:title></metadata>
  <manifest>
    {manifest}
  </manifest>
  <spine></spine>
</package>"#
            )
            .as_bytes(),
        )
        .unwrap();

        zip.start_file("OEBPS/nav.xhtml", options).unwrap();
        zip.write_all(b"<html><body><nav><h1>Contents</h1><p>Start</p></nav></body></html>")
            .unwrap();
        zip.start_file("OEBPS/style.css", options).unwrap();
        zip.write_all(b"h1 { color: black }").unwrap();

        for (i, doc) in documents.iter().enumerate() {
            zip.start_file(format!("OEBPS/text/part {i}.xhtml"), options).unwrap();
            zip.write_all(doc.as_bytes()).unwrap();
        }

        zip.finish().unwrap().into_inner()
    }
}
