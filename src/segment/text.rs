use std::sync::LazyLock;

use regex::Regex;

static START_BANNER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*\* START OF THE PROJECT GUTENBERG EBOOK .* \*\*\*").unwrap());
static END_BANNER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*\* END OF THE PROJECT GUTENBERG EBOOK .* \*\*\*").unwrap());

/// Whether the text carries a START banner at all.
pub fn has_start_banner(content: &str) -> bool {
    START_BANNER.is_match(content)
}

/// Cut a plain-text book down to what lies between its START and END
/// banners. A missing banner leaves that side as is.
pub fn strip_boilerplate(content: &str) -> String {
    let body = match START_BANNER.find(content) {
        Some(m) => &content[m.end()..],
        None => content,
    };
    let body = match END_BANNER.find(body) {
        Some(m) => &body[..m.start()],
        None => body,
    };
    body.trim().to_string()
}

// ── Tests ──
