//! HTML → clean text + title + outlinks + code blocks (C2).

use miette::Diagnostic;
use ptolemies_core::error::{ErrorKind, HasErrorKind};
use scraper::{Html, Selector};
use std::collections::HashSet;
use thiserror::Error;
use url::Url;

/// Bumped whenever extraction logic changes, forcing re-extraction on the
/// next crawl (§4.2).
pub const EXTRACTION_VERSION: u32 = 1;

#[derive(Debug, Error, Diagnostic)]
pub enum ExtractError {
    #[error("unsupported content type {content_type} for {url}")]
    #[diagnostic(code(ptolemies::extract::unsupported_content_type))]
    UnsupportedContentType { url: String, content_type: String },

    #[error("failed to extract content from {url}: {reason}")]
    #[diagnostic(code(ptolemies::extract::failed))]
    Failed { url: String, reason: String },
}

impl HasErrorKind for ExtractError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::PermanentExternal
    }
}

#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub title: Option<String>,
    pub text: String,
    pub outlinks: Vec<String>,
    pub code_blocks: Vec<String>,
    pub extraction_version: u32,
}

const BOILERPLATE_TAGS: &[&str] = &["nav", "header", "footer", "script", "style", "noscript", "aside"];
const MAIN_CONTENT_SELECTORS: &[&str] = &["main", "article", "[role=main]", "#content", ".content"];

pub fn extract(
    url: &str,
    body: &[u8],
    content_type: &str,
) -> Result<Extraction, ExtractError> {
    if !content_type.is_empty() && !content_type.contains("html") {
        return Err(ExtractError::UnsupportedContentType {
            url: url.to_string(),
            content_type: content_type.to_string(),
        });
    }

    let text = String::from_utf8_lossy(body);
    let document = Html::parse_document(&text);

    let title = Selector::parse("title")
        .ok()
        .and_then(|sel| document.select(&sel).next())
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty());

    let root = find_main_root(&document);
    let (text, code_blocks) = collect_text_and_code(&document, root);
    let outlinks = collect_outlinks(&document, url);

    Ok(Extraction {
        title,
        text,
        outlinks,
        code_blocks,
        extraction_version: EXTRACTION_VERSION,
    })
}

fn find_main_root(document: &Html) -> Option<scraper::ElementRef<'_>> {
    for sel in MAIN_CONTENT_SELECTORS {
        if let Ok(selector) = Selector::parse(sel) {
            if let Some(el) = document.select(&selector).next() {
                return Some(el);
            }
        }
    }
    None
}

fn is_boilerplate_tag(name: &str) -> bool {
    BOILERPLATE_TAGS.contains(&name)
}

fn walk(el: scraper::ElementRef<'_>, out_text: &mut String, code_blocks: &mut Vec<String>) {
    let name = el.value().name();
    if is_boilerplate_tag(name) {
        return;
    }
    if name == "pre" || name == "code" {
        let block: String = el.text().collect::<String>();
        if !block.trim().is_empty() {
            code_blocks.push(block.trim().to_string());
            out_text.push_str("\n```\n");
            out_text.push_str(block.trim());
            out_text.push_str("\n```\n");
        }
        return;
    }
    for child in el.children() {
        if let Some(child_el) = scraper::ElementRef::wrap(child) {
            walk(child_el, out_text, code_blocks);
        } else if let Some(text) = child.value().as_text() {
            out_text.push_str(text);
            out_text.push(' ');
        }
    }
}

fn collect_text_and_code(document: &Html, root: Option<scraper::ElementRef<'_>>) -> (String, Vec<String>) {
    let mut text_out = String::new();
    let mut code_blocks = Vec::new();

    match root {
        Some(el) => walk(el, &mut text_out, &mut code_blocks),
        None => {
            if let Some(body) = document.select(&Selector::parse("body").unwrap()).next() {
                walk(body, &mut text_out, &mut code_blocks);
            }
        }
    }

    let collapsed = text_out.split_whitespace().collect::<Vec<_>>().join(" ");
    (collapsed, code_blocks)
}

fn collect_outlinks(document: &Html, base_url: &str) -> Vec<String> {
    let Ok(base) = Url::parse(base_url) else {
        return Vec::new();
    };
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for el in document.select(&selector) {
        let Some(href) = el.value().attr("href") else {
            continue;
        };
        let Ok(absolute) = base.join(href) else {
            continue;
        };
        if absolute.scheme() != "http" && absolute.scheme() != "https" {
            continue;
        }
        let mut absolute = absolute;
        absolute.set_fragment(None);
        let s = absolute.to_string();
        if seen.insert(s.clone()) {
            out.push(s);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_title_and_text() {
        let html = b"<html><head><title>Hi</title></head><body><nav>skip</nav><main><p>Hello world.</p></main></body></html>";
        let extraction = extract("https://example.com/", html, "text/html").unwrap();
        assert_eq!(extraction.title.as_deref(), Some("Hi"));
        assert!(extraction.text.contains("Hello world."));
        assert!(!extraction.text.contains("skip"));
    }

    #[test]
    fn preserves_code_blocks() {
        let html = b"<html><body><main><p>intro</p><pre><code>fn main() {}</code></pre></main></body></html>";
        let extraction = extract("https://example.com/", html, "text/html").unwrap();
        assert_eq!(extraction.code_blocks.len(), 1);
        assert!(extraction.code_blocks[0].contains("fn main"));
    }

    #[test]
    fn dedups_outlinks() {
        let html = b"<html><body><a href=\"/a\">a</a><a href=\"/a\">again</a><a href=\"/b#frag\">b</a></body></html>";
        let extraction = extract("https://example.com/", html, "text/html").unwrap();
        assert_eq!(extraction.outlinks.len(), 2);
    }

    #[test]
    fn rejects_non_html() {
        let err = extract("https://example.com/f.pdf", b"%PDF", "application/pdf").unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedContentType { .. }));
    }
}
