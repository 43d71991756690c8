pub mod chapters;
pub mod epub;
pub mod text;

use std::io::Write;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

use crate::store::{Artifact, BookFormat, Store};
pub use chapters::Chapter;

/// What segmentation extracts from one asset.
#[derive(Debug, Clone, PartialEq)]
pub enum BookContent {
    /// Heading-delimited chapters of an EPUB, possibly none.
    Chapters(Vec<Chapter>),
    /// Plain-text body between the licence banners.
    FullText(String),
}

impl BookContent {
    fn describe(&self) -> String {
        match self {
            BookContent::Chapters(chapters) => format!("{} chapters", chapters.len()),
            BookContent::FullText(text) => format!("{} bytes of text", text.len()),
        }
    }
}

/// Segment one raw asset.
pub fn segment(format: BookFormat, bytes: &[u8]) -> Result<BookContent> {
    match format {
        BookFormat::Epub => {
            let documents = epub::content_documents(bytes)?;
            let mut segmenter = chapters::Segmenter::default();
            for doc in &documents {
                debug!("Reading {}", doc.path);
                segmenter.feed(&doc.markup);
                if segmenter.is_done() {
                    break;
                }
            }
            if !segmenter.started() {
                warn!("No start separator in any of {} documents", documents.len());
            }
            Ok(BookContent::Chapters(segmenter.finish()))
        }
        BookFormat::Txt => {
            let content = std::str::from_utf8(bytes).context("Text asset is not valid UTF-8")?;
            if !text::has_start_banner(content) {
                warn!("No START banner in text asset");
            }
            Ok(BookContent::FullText(text::strip_boilerplate(content)))
        }
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct SegmentStats {
    pub segmented: usize,
    pub existing: usize,
    pub chapters: usize,
    pub empty: usize,
    pub failed: usize,
}

impl SegmentStats {
    pub fn print(&self) {
        println!(
            "Segmented {} books into {} chapters ({} already done, {} empty, {} failed).",
            self.segmented, self.chapters, self.existing, self.empty, self.failed,
        );
    }
}

/// Segment every downloaded asset of `format` that has no content artifact
/// yet. A book that fails is logged and counted; the others go on.
pub fn segment_books(store: &Store, format: BookFormat) -> Result<SegmentStats> {
    let ids = store.assets(format)?;
    info!("Found {} {} assets", ids.len(), format);

    let pb = ProgressBar::new(ids.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    let mut stats = SegmentStats::default();
    for id in ids {
        pb.inc(1);
        let target = Artifact::Content(id, format);
        if store.exists(&target) {
            stats.existing += 1;
            continue;
        }

        let content = store
            .read_bytes(&Artifact::Asset(id, format))
            .and_then(|bytes| segment(format, &bytes));
        let content = match content {
            Ok(content) => content,
            Err(e) => {
                warn!("Failed to segment {}: {:#}", id, e);
                stats.failed += 1;
                continue;
            }
        };

        debug!("Found {} in {}", content.describe(), id);
        match &content {
            BookContent::Chapters(chapters) => {
                if chapters.is_empty() {
                    stats.empty += 1;
                }
                stats.chapters += chapters.len();
                store.write_json(&target, chapters)?;
            }
            BookContent::FullText(text) => {
                if text.is_empty() {
                    stats.empty += 1;
                }
                store.write_with(&target, |file| Ok(file.write_all(text.as_bytes())?))?;
            }
        }
        stats.segmented += 1;
    }

    pb.finish_and_clear();
    Ok(stats)
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    const START: &str = r#"<div id="pg-start-separator">*** START ***</div>"#;

    fn xhtml(body: &str) -> String {
        format!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
             <html xmlns=\"http://www.w3.org/1999/xhtml\"><head><title>t</title></head><body>{}</body></html>",
            body
        )
    }

    #[test]
    fn epub_asset_to_chapters() {
        let first = xhtml(&format!("<p>Licence</p>{START}<h2>Intro</h2><p>Hello</p>"));
        let second = xhtml("<h2>Ch1</h2><p>World</p>");
        let bytes = epub::build::epub(&[&first, &second]);

        let content = segment(BookFormat::Epub, &bytes).unwrap();
        assert_eq!(
            content,
            BookContent::Chapters(vec![
                Chapter {
                    title: "Intro".into(),
                    text: "Hello".into()
                },
                Chapter {
                    title: "Ch1".into(),
                    text: "World".into()
                },
            ])
        );
    }

    #[test]
    fn text_asset_trimmed() {
        let bytes = b"Licence\n*** START OF THE PROJECT GUTENBERG EBOOK X ***\nBODY\n*** END OF THE PROJECT GUTENBERG EBOOK X ***\n";
        assert_eq!(
            segment(BookFormat::Txt, bytes).unwrap(),
            BookContent::FullText("BODY".into())
        );
    }

    #[test]
    fn broken_asset_is_an_error() {
        assert!(segment(BookFormat::Epub, b"not a zip").is_err());
        assert!(segment(BookFormat::Txt, &[0xff, 0xfe, 0x00]).is_err());
    }

    #[test]
    fn segment_stage_writes_contents_and_skips_done() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();

        let good = epub::build::epub(&[&xhtml(&format!("{START}<h1>One</h1><p>a</p>"))]);
        store.write_bytes(&Artifact::Asset(1, BookFormat::Epub), &good).unwrap();
        store.write_bytes(&Artifact::Asset(2, BookFormat::Epub), b"garbage").unwrap();
        let plain = epub::build::epub(&[&xhtml("<h1>One</h1><p>a</p>")]);
        store.write_bytes(&Artifact::Asset(3, BookFormat::Epub), &plain).unwrap();

        let stats = segment_books(&store, BookFormat::Epub).unwrap();
        assert_eq!(
            stats,
            SegmentStats {
                segmented: 2,
                existing: 0,
                chapters: 1,
                empty: 1,
                failed: 1,
            }
        );

        let chapters: Vec<Chapter> = store.read_json(&Artifact::Content(1, BookFormat::Epub)).unwrap();
        assert_eq!(chapters[0].title, "One");
        let empty: Vec<Chapter> = store.read_json(&Artifact::Content(3, BookFormat::Epub)).unwrap();
        assert!(empty.is_empty());
        assert!(!store.exists(&Artifact::Content(2, BookFormat::Epub)));

        let again = segment_books(&store, BookFormat::Epub).unwrap();
        assert_eq!(again.existing, 2);
        assert_eq!(again.failed, 1);
        assert_eq!(again.segmented, 0);
    }

    #[test]
    fn segment_stage_for_text() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        store
            .write_bytes(
                &Artifact::Asset(84, BookFormat::Txt),
                b"*** START OF THE PROJECT GUTENBERG EBOOK FRANKENSTEIN ***\n\nLetter 1\n\n*** END OF THE PROJECT GUTENBERG EBOOK FRANKENSTEIN ***",
            )
            .unwrap();

        segment_books(&store, BookFormat::Txt).unwrap();
        assert_eq!(
            store.read_bytes(&Artifact::Content(84, BookFormat::Txt)).unwrap(),
            b"Letter 1"
        );
    }
}
