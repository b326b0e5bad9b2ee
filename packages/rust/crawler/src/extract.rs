//! Main-content text and link extraction.
//!
//! Content extraction uses readability heuristics: prefer a dedicated
//! content container (`main`, `article`, `[role="main"]`, `.content`),
//! fall back to `body`, and strip navigation chrome either way.

use scraper::{Html, Selector};
use url::Url;

/// Extract readability-filtered main-content text from an HTML document.
///
/// Returns `None` when the page carries no visible text.
pub fn main_text(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);

    // Readability heuristics: try <main>, <article>, then known content blocks
    let selectors = ["main", "article", r#"[role="main"]"#, ".content"];

    for sel_str in selectors {
        let sel = Selector::parse(sel_str).unwrap();
        if let Some(el) = doc.select(&sel).next() {
            return collapse_text(&strip_chrome(&el.inner_html()));
        }
    }

    // Last resort: use the body, stripping nav/header/footer/script/style/aside
    let body_sel = Selector::parse("body").unwrap();
    let body = doc.select(&body_sel).next()?;
    collapse_text(&strip_chrome(&body.inner_html()))
}

/// Strip common navigation/chrome elements from HTML content.
fn strip_chrome(html: &str) -> String {
    let doc = Html::parse_fragment(html);
    let chrome_sel =
        Selector::parse("nav, header, footer, aside, script, style, .sidebar, .nav").unwrap();

    let mut result = html.to_string();
    for el in doc.select(&chrome_sel) {
        let outer = el.html();
        result = result.replace(&outer, "");
    }
    result
}

/// Collect the visible text of an HTML fragment, whitespace-collapsed.
fn collapse_text(html: &str) -> Option<String> {
    let doc = Html::parse_fragment(html);
    let text = doc
        .root_element()
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ");

    if text.is_empty() { None } else { Some(text) }
}

/// Extract all followable links from a document, resolved against `base`.
///
/// Fragment-only (`#...`), `javascript:` and `mailto:` hrefs are skipped
/// without resolution; fragments are stripped from resolved URLs.
pub fn links(html: &str, base: &Url) -> Vec<Url> {
    let doc = Html::parse_document(html);
    let link_sel = Selector::parse("a[href]").unwrap();
    let mut links = Vec::new();

    for el in doc.select(&link_sel) {
        if let Some(href) = el.value().attr("href") {
            if href.starts_with('#')
                || href.starts_with("javascript:")
                || href.starts_with("mailto:")
            {
                continue;
            }

            if let Ok(mut resolved) = base.join(href) {
                resolved.set_fragment(None);
                links.push(resolved);
            }
        }
    }

    links
}
