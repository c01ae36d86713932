//! Free-text search over messages.
//!
//! Mirrors the backend's `content ILIKE %search%`: the whole search string is
//! one case-insensitive substring, matched against message content only, so
//! history pages and live arrivals agree on what a scope contains.

/// A parsed search query. An empty query matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    needle: Option<String>,
}

impl SearchQuery {
    /// Parse a raw query string. Blank input yields the empty query; anything
    /// else is kept verbatim apart from case folding.
    ///
    /// # Examples
    /// - "error" -> "error"
    /// - "Error + Timeout" -> "error + timeout" (no term splitting)
    /// - "   " -> empty
    pub fn parse(query: &str) -> Self {
        let needle = (!query.trim().is_empty()).then(|| query.to_lowercase());
        Self { needle }
    }

    pub fn is_empty(&self) -> bool {
        self.needle.is_none()
    }

    pub fn needle(&self) -> Option<&str> {
        self.needle.as_deref()
    }

    /// True when the query is empty or occurs in `content`. Messages without
    /// content never match a non-empty query.
    pub fn matches(&self, content: Option<&str>) -> bool {
        match (&self.needle, content) {
            (None, _) => true,
            (Some(needle), Some(text)) => text_contains_term(text, needle),
            (Some(_), None) => false,
        }
    }
}

/// Check if text contains an already lower-cased term (Unicode case-insensitive)
pub fn text_contains_term(text: &str, term: &str) -> bool {
    if term.is_empty() {
        return true;
    }
    text.to_lowercase().contains(term)
}
