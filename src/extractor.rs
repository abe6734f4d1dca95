//! Link extraction from message bodies
//!
//! Labeled extraction runs two strategies in priority order:
//! - **Anchors**: `<a ... href="URL" ...>LABEL</a>`, attribute order and quote style agnostic
//! - **Plain text**: bare `http(s)://` tokens, labeled by a nearby preceding line
//!   (see [`LabelPolicy`]). Only used when the anchor strategy finds nothing.
//!
//! Both strategies run on a body whose quoted-printable soft line breaks have been
//! joined, and both keep the first occurrence of each url.

use crate::models::Link;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

/// Characters stripped from the end of a captured url
const TRAILING_JUNK: &[char] = &['>', ')', '"', '\'', ';', ','];

static ANCHOR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<a\b[^>]*?\bhref\s*=\s*(?:"([^"]*)"|'([^']*)')[^>]*>(.*?)</a\s*>"#)
        .unwrap()
});

static BARE_URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)https?://[^\s<>"';,)]+"#).unwrap());

static HREF_ATTR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)href=['"]([^'"]+)['"]"#).unwrap());

static ANGLE_URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<(https?://[^>]+)>").unwrap());

/// Heuristic used by the plain-text strategy to name a bare url.
///
/// Looks backward up to `max_lookback` lines for the nearest non-empty line that
/// does not itself start with `http` and is shorter than `max_label_chars`.
/// Best effort: call-to-action text usually sits just above the url in
/// notification emails, but nothing guarantees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelPolicy {
    pub max_lookback: usize,
    pub max_label_chars: usize,
}

impl Default for LabelPolicy {
    fn default() -> Self {
        Self {
            max_lookback: 3,
            max_label_chars: 100,
        }
    }
}

impl LabelPolicy {
    /// Label for a url found on `lines[index]`; empty when no line qualifies.
    ///
    /// The qualifying line is returned verbatim, surrounding whitespace included.
    pub fn label_for(&self, lines: &[&str], index: usize) -> String {
        let end = index.min(lines.len());
        let start = end.saturating_sub(self.max_lookback);

        lines[start..end]
            .iter()
            .rev()
            .find(|line| {
                let content = line.trim();
                !content.is_empty()
                    && !starts_with_ignore_case(content, "http")
                    && line.chars().count() < self.max_label_chars
            })
            .map(|line| line.to_string())
            .unwrap_or_default()
    }
}

/// Layered link extractor with a configurable label policy
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkExtractor {
    policy: LabelPolicy,
}

impl LinkExtractor {
    pub fn new(policy: LabelPolicy) -> Self {
        Self { policy }
    }

    /// Ordered, deduplicated (url, label) pairs. Empty means "no actionable content".
    pub fn extract(&self, body: &str) -> Vec<Link> {
        if body.is_empty() {
            return Vec::new();
        }

        let normalized = normalize_soft_breaks(body);

        let anchors = anchor_links(&normalized);
        if !anchors.is_empty() {
            return anchors;
        }

        plain_text_links(&normalized, &self.policy)
    }
}

/// Extract links with labels using the default [`LabelPolicy`]
pub fn extract_links_with_label(body: &str) -> Vec<Link> {
    LinkExtractor::default().extract(body)
}

/// Extract every http(s) url in the body, labels ignored.
///
/// Catches plain urls, `href` attribute values and `<https://...>` forms.
pub fn extract_links(body: &str) -> Vec<String> {
    if body.is_empty() {
        return Vec::new();
    }

    let normalized = normalize_soft_breaks(body);
    let mut seen = HashSet::new();
    let mut urls = Vec::new();

    let plain = BARE_URL_RE.find_iter(&normalized).map(|m| m.as_str());
    let hrefs = HREF_ATTR_RE
        .captures_iter(&normalized)
        .filter_map(|c| c.get(1).map(|m| m.as_str()));
    let angled = ANGLE_URL_RE
        .captures_iter(&normalized)
        .filter_map(|c| c.get(1).map(|m| m.as_str()));

    for candidate in plain.chain(hrefs).chain(angled) {
        if let Some(url) = clean_url(candidate) {
            if seen.insert(url.clone()) {
                urls.push(url);
            }
        }
    }

    urls
}

/// Keep links whose label contains `filter` (case-insensitive). `None` keeps everything.
pub fn filter_by_label(links: Vec<Link>, filter: Option<&str>) -> Vec<Link> {
    let Some(filter) = filter else {
        return links;
    };
    let needle = filter.to_lowercase();

    links
        .into_iter()
        .filter(|link| !link.label.is_empty() && link.label.to_lowercase().contains(&needle))
        .collect()
}

/// Join lines split by quoted-printable soft line breaks (`=` at end of line)
pub fn normalize_soft_breaks(body: &str) -> String {
    body.replace("=\r\n", "").replace("=\n", "")
}

fn anchor_links(body: &str) -> Vec<Link> {
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for caps in ANCHOR_RE.captures_iter(body) {
        let href = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str())
            .unwrap_or_default();

        let Some(url) = clean_url(href) else {
            continue;
        };
        if !seen.insert(url.clone()) {
            continue;
        }

        let label = caps.get(3).map(|m| m.as_str().trim()).unwrap_or_default();
        links.push(Link::new(url, label));
    }

    links
}

fn plain_text_links(body: &str, policy: &LabelPolicy) -> Vec<Link> {
    let lines: Vec<&str> = body.lines().collect();
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for (index, line) in lines.iter().enumerate() {
        for found in BARE_URL_RE.find_iter(line) {
            let Some(url) = clean_url(found.as_str()) else {
                continue;
            };
            if !seen.insert(url.clone()) {
                continue;
            }
            links.push(Link::new(url, policy.label_for(&lines, index)));
        }
    }

    links
}

/// Accept only http(s) urls and strip trailing characters that are not part of them
fn clean_url(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if !(starts_with_ignore_case(raw, "http://") || starts_with_ignore_case(raw, "https://")) {
        return None;
    }

    let url = raw.trim_end_matches(TRAILING_JUNK);
    if url.is_empty() {
        None
    } else {
        Some(url.to_string())
    }
}

fn starts_with_ignore_case(text: &str, prefix: &str) -> bool {
    let text = text.as_bytes();
    let prefix = prefix.as_bytes();
    text.len() >= prefix.len() && text[..prefix.len()].eq_ignore_ascii_case(prefix)
}
