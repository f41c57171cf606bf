use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{node::Node, ElementRef, Html};

use crate::models::{ExtractedPost, Post, DEFAULT_TITLE};

// ── Lazy static regexes ──────────────────────────────────────────────────────

static IMG_SRC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)<img[^>]+src=["']([^"']+)["']"#).unwrap());

// ── Public API ───────────────────────────────────────────────────────────────

pub fn extract_post(post: &Post) -> ExtractedPost {
    let markup = post.content_markup.as_deref().unwrap_or_default();
    ExtractedPost {
        title: post
            .title
            .clone()
            .unwrap_or_else(|| DEFAULT_TITLE.to_string()),
        plain_text: extract_text(markup),
        image_refs: extract_image_refs(markup),
    }
}

/// Strip all markup and collapse whitespace. Text nodes are joined with a
/// single space, so adjacent block elements never run together.
pub fn extract_text(markup: &str) -> String {
    if markup.trim().is_empty() {
        return String::new();
    }
    let fragment = Html::parse_fragment(markup);
    let mut parts = Vec::new();
    collect_text_nodes(fragment.root_element(), &mut parts);
    normalize_text(parts.join(" "))
}

/// `src` values of every `<img>` tag in document order. URLs are returned
/// as written; nothing is resolved or validated here.
pub fn extract_image_refs(markup: &str) -> Vec<String> {
    IMG_SRC_RE
        .captures_iter(markup)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

// ── DOM utility helpers ──────────────────────────────────────────────────────

fn collect_text_nodes(el: ElementRef<'_>, parts: &mut Vec<String>) {
    if matches!(el.value().name(), "script" | "style" | "noscript" | "template") {
        return;
    }
    for child in el.children() {
        match child.value() {
            Node::Text(text) => {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    parts.push(trimmed.to_string());
                }
            }
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    collect_text_nodes(child_el, parts);
                }
            }
            _ => {}
        }
    }
}

fn normalize_text(text: String) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
