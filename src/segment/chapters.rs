use std::sync::LazyLock;

use scraper::{ElementRef, Html, Node, Selector};
use serde::{Deserialize, Serialize};

static START_MARKER: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div#pg-start-separator").unwrap());
static END_MARKER: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div#pg-end-separator").unwrap());
static HEADINGS: LazyLock<Vec<(&'static str, Selector)>> = LazyLock::new(|| {
    ["h1", "h2", "h3", "h4", "h5", "h6"]
        .into_iter()
        .map(|tag| (tag, Selector::parse(tag).unwrap()))
        .collect()
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub title: String,
    pub text: String,
}

/// Walks a book's content documents in order, splitting them into chapters
/// at headings.
///
/// Nothing is collected until the start separator has been seen, and no
/// document after the one holding the end separator is looked at. Both
/// flags span the whole book.
#[derive(Debug, Default)]
pub struct Segmenter {
    started: bool,
    ended: bool,
    chapters: Vec<Chapter>,
}

impl Segmenter {
    pub fn started(&self) -> bool {
        self.started
    }

    /// True once the end separator has been handled.
    pub fn is_done(&self) -> bool {
        self.ended
    }

    pub fn feed(&mut self, markup: &str) {
        let html = Html::parse_document(markup);
        let mut trimmed = Trimmed::default();

        if !self.started {
            if let Some(marker) = html.select(&START_MARKER).next() {
                self.started = true;
                trimmed.drop_before(marker);
            }
        }

        if self.started && !self.ended {
            if let Some(marker) = html.select(&END_MARKER).find(|m| !trimmed.contains(*m)) {
                self.ended = true;
                trimmed.drop_after(marker);
            }
        }

        if self.started {
            self.collect(&html, &trimmed);
        }
    }

    pub fn finish(self) -> Vec<Chapter> {
        self.chapters
    }

    /// Chapters at the most significant heading level present in this
    /// document. Less significant headings are body text.
    fn collect(&mut self, html: &Html, trimmed: &Trimmed<'_>) {
        for (tag, selector) in HEADINGS.iter() {
            let headings: Vec<ElementRef> = html
                .select(selector)
                .filter(|h| !trimmed.contains(*h))
                .collect();
            if headings.is_empty() {
                continue;
            }

            for heading in headings {
                let mut text = String::new();
                for sibling in heading.next_siblings().filter_map(ElementRef::wrap) {
                    if sibling.value().name() == *tag || trimmed.contains(sibling) {
                        break;
                    }
                    text.push_str(trimmed.text_of(sibling).trim());
                }
                if text.is_empty() {
                    continue;
                }
                self.chapters.push(Chapter {
                    title: trimmed.text_of(heading).trim().to_string(),
                    text,
                });
            }
            break;
        }
    }
}

/// Sibling ranges cut away by the boundary markers. The markers themselves
/// stay. The tree itself is never modified; a node is out of bounds when it
/// or an ancestor is one of the dropped elements.
#[derive(Debug, Default)]
struct Trimmed<'a> {
    dropped: Vec<ElementRef<'a>>,
}

impl<'a> Trimmed<'a> {
    fn drop_before(&mut self, marker: ElementRef<'a>) {
        self.dropped
            .extend(marker.prev_siblings().filter_map(ElementRef::wrap));
    }

    fn drop_after(&mut self, marker: ElementRef<'a>) {
        self.dropped
            .extend(marker.next_siblings().filter_map(ElementRef::wrap));
    }

    fn contains(&self, el: ElementRef) -> bool {
        if self.dropped.is_empty() {
            return false;
        }
        self.dropped.contains(&el)
            || el
                .ancestors()
                .filter_map(ElementRef::wrap)
                .any(|a| self.dropped.contains(&a))
    }

    /// Text content of `el` with dropped descendants left out.
    fn text_of(&self, el: ElementRef) -> String {
        let mut out = String::new();
        self.push_text(el, &mut out);
        out
    }

    fn push_text(&self, el: ElementRef, out: &mut String) {
        for child in el.children() {
            match child.value() {
                Node::Text(text) => out.push_str(text),
                Node::Element(_) => {
                    if let Some(child) = ElementRef::wrap(child) {
                        if !self.dropped.contains(&child) {
                            self.push_text(child, out);
                        }
                    }
                }
                _ => {}
            }
        }
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(body: &str) -> String {
        format!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
             <html xmlns=\"http://www.w3.org/1999/xhtml\"><head><title>Book</title></head>\
             <body>{}</body></html>",
            body
        )
    }

    const START: &str = r#"<div id="pg-start-separator"><span>*** START OF THE PROJECT GUTENBERG EBOOK X ***</span></div>"#;
    const END: &str = r#"<div id="pg-end-separator"><span>*** END OF THE PROJECT GUTENBERG EBOOK X ***</span></div>"#;

    fn chapter(title: &str, text: &str) -> Chapter {
        Chapter {
            title: title.into(),
            text: text.into(),
        }
    }

    fn segmenter(docs: &[String]) -> Segmenter {
        let mut segmenter = Segmenter::default();
        for doc in docs {
            if segmenter.is_done() {
                break;
            }
            segmenter.feed(doc);
        }
        segmenter
    }

    fn chapters(docs: &[String]) -> Vec<Chapter> {
        segmenter(docs).finish()
    }

    #[test]
    fn intro_and_first_chapter() {
        let book = doc(&format!(
            "<p>Front matter</p>{START}<h2>Intro</h2><p>Hello</p><h2>Ch1</h2><p>World</p>"
        ));
        assert_eq!(
            chapters(&[book]),
            vec![chapter("Intro", "Hello"), chapter("Ch1", "World")]
        );
    }

    #[test]
    fn front_matter_headings_ignored() {
        let book = doc(&format!(
            "<h2>The Project Gutenberg eBook</h2><p>License</p>{START}<h2>One</h2><p>Text</p>"
        ));
        assert_eq!(chapters(&[book]), vec![chapter("One", "Text")]);
    }

    #[test]
    fn no_start_marker_yields_nothing() {
        let book = doc("<h1>Title</h1><p>Body</p>");
        let segmenter = segmenter(&[book]);
        assert!(!segmenter.started());
        assert!(segmenter.finish().is_empty());
    }

    #[test]
    fn sibling_texts_concatenated_without_separator() {
        let book = doc(&format!("{START}<h2>One</h2><p> First. </p><p>Second.</p><div><p>Third.</p></div>"));
        assert_eq!(chapters(&[book]), vec![chapter("One", "First.Second.Third.")]);
    }

    #[test]
    fn empty_chapters_dropped() {
        let book = doc(&format!("{START}<h2>Contents</h2><p>  </p><h2>One</h2><p>Text</p><h2>Empty</h2>"));
        let found = chapters(&[book]);
        assert_eq!(found, vec![chapter("One", "Text")]);
        assert!(found.iter().all(|c| !c.text.is_empty()));
    }

    #[test]
    fn most_significant_level_wins_per_document() {
        let first = doc(&format!(
            "{START}<h2>Part I</h2><h3>Section A</h3><p>Alpha</p><h2>Part II</h2><p>Beta</p>"
        ));
        let second = doc("<h3>Section C</h3><p>Gamma</p><h4>Note</h4><p>Delta</p>");
        assert_eq!(
            chapters(&[first, second]),
            vec![
                chapter("Part I", "Section AAlpha"),
                chapter("Part II", "Beta"),
                chapter("Section C", "GammaNoteDelta"),
            ]
        );
    }

    #[test]
    fn flags_persist_across_documents() {
        let license = doc(&format!("<h1>License</h1><p>Terms</p>{START}"));
        let body = doc("<h2>Chapter 1</h2><p>Once</p>");
        let back = doc(&format!("<h2>Chapter 2</h2><p>Upon</p>{END}<h2>Licence</h2><p>Full terms</p>"));
        let after = doc("<h2>Colophon</h2><p>Never read</p>");

        assert_eq!(
            chapters(&[license, body, back, after]),
            vec![
                chapter("Chapter 1", "Once"),
                chapter("Chapter 2", "Upon*** END OF THE PROJECT GUTENBERG EBOOK X ***"),
            ]
        );
    }

    #[test]
    fn end_marker_trims_following_siblings() {
        let book = doc(&format!("{START}<h2>Last</h2><p>Words</p>{END}<p>Small print</p>"));
        assert_eq!(
            chapters(&[book]),
            vec![chapter("Last", "Words*** END OF THE PROJECT GUTENBERG EBOOK X ***")]
        );
    }

    #[test]
    fn footer_licence_around_nested_end_marker_left_out() {
        let book = doc(&format!(
            "{START}<h2>Last</h2><p>Words</p>\
             <section id=\"pg-footer\">{END}<div><p>FULL LICENSE TERMS</p></div></section>"
        ));
        assert_eq!(
            chapters(&[book]),
            vec![chapter("Last", "Words*** END OF THE PROJECT GUTENBERG EBOOK X ***")]
        );
    }

    #[test]
    fn header_licence_around_nested_start_marker_left_out() {
        let book = doc(&format!(
            "<h1>Book Title</h1><section><p>HEADER LICENSE</p>{START}</section><p>Body</p>"
        ));
        assert_eq!(
            chapters(&[book]),
            vec![chapter(
                "Book Title",
                "*** START OF THE PROJECT GUTENBERG EBOOK X ***Body"
            )]
        );
    }

    #[test]
    fn end_marker_before_start_is_ignored() {
        let early_end = doc(&format!("{END}<h2>Ignored</h2><p>x</p>"));
        let book = doc(&format!("{START}<h2>Kept</h2><p>y</p>"));
        assert_eq!(chapters(&[early_end, book]), vec![chapter("Kept", "y")]);
    }

    #[test]
    fn nested_wrapper_containers() {
        let book = doc(&format!(
            "<section id=\"pg-header\"><p>Header</p>{START}</section>\
             <div class=\"chapter\"><h2>One</h2><p>First</p></div>\
             <div class=\"chapter\"><h2>Two</h2><p>Second</p></div>"
        ));
        assert_eq!(
            chapters(&[book]),
            vec![chapter("One", "First"), chapter("Two", "Second")]
        );
    }

    #[test]
    fn title_never_in_its_own_text() {
        let book = doc(&format!("{START}<h2>Alpha</h2><p>beta</p><h2>Gamma</h2><p>delta</p>"));
        for c in chapters(&[book]) {
            assert!(!c.text.contains(&c.title));
        }
    }

    #[test]
    fn segmentation_is_idempotent() {
        let docs = vec![
            doc(&format!("{START}<h2>One</h2><p>a</p>")),
            doc(&format!("<h2>Two</h2><p>b</p>{END}")),
        ];
        assert_eq!(chapters(&docs), chapters(&docs));
    }
}
