//! Run-scoped record of visited URLs.

use std::collections::HashSet;
use url::Url;

/// Resolves `href` against `base` and brings it into canonical form.
///
/// Scheme and host are lowercased by the parser; the fragment is dropped.
/// Anything other than http(s) yields `None`.
pub fn normalize_url(href: &str, base: Option<&Url>) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }

    let mut url = match base {
        Some(base) => base.join(href).ok()?,
        None => Url::parse(href).ok()?,
    };

    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return None;
    }
    url.set_fragment(None);
    Some(url)
}

/// Set of URLs already fetched during one run. It only ever grows.
#[derive(Debug, Default)]
pub struct Deduper {
    visited: HashSet<String>,
}

impl Deduper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an equivalent URL has already been marked.
    pub fn seen(&self, url: &str) -> bool {
        match normalize_url(url, None) {
            Some(url) => self.visited.contains(url.as_str()),
            None => self.visited.contains(url),
        }
    }

    /// Records `url`; returns `false` when it was already present.
    pub fn mark(&mut self, url: &str) -> bool {
        let key = normalize_url(url, None)
            .map(String::from)
            .unwrap_or_else(|| url.to_string());
        self.visited.insert(key)
    }

    pub fn len(&self) -> usize {
        self.visited.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visited.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_then_seen() {
        let mut visited = Deduper::new();
        assert!(!visited.seen("https://arxiv.org/abs/1234"));

        assert!(visited.mark("https://arxiv.org/abs/1234"));
        assert!(visited.seen("https://arxiv.org/abs/1234"));
    }

    #[test]
    fn test_marking_twice_is_idempotent() {
        let mut visited = Deduper::new();
        assert!(visited.mark("https://arxiv.org/abs/1234"));
        assert!(!visited.mark("https://arxiv.org/abs/1234"));
        assert_eq!(visited.len(), 1);
    }

    #[test]
    fn test_equivalent_urls_collapse() {
        let mut visited = Deduper::new();
        visited.mark("HTTPS://ArXiv.org/abs/1234#section-2");

        assert!(visited.seen("https://arxiv.org/abs/1234"));
        assert!(visited.seen("https://arxiv.org:443/abs/1234#top"));
        assert!(!visited.seen("https://arxiv.org/abs/1234v2"));
        assert_eq!(visited.len(), 1);
    }

    #[test]
    fn test_normalize_resolves_relative_links() {
        let base = Url::parse("https://scholar.google.com/scholar?q=ml").unwrap();

        let url = normalize_url("/citations?user=abc#x", Some(&base)).unwrap();
        assert_eq!(url.as_str(), "https://scholar.google.com/citations?user=abc");

        assert!(normalize_url("javascript:void(0)", Some(&base)).is_none());
        assert!(normalize_url("   ", Some(&base)).is_none());
        assert!(normalize_url("/relative/without/base", None).is_none());
    }
}
