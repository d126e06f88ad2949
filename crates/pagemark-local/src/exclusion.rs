//! Pages that must never be captured (search-engine result pages).

/// Substrings of URLs whose pages are skipped before extraction.
pub const DEFAULT_EXCLUDED: &[&str] = &[
    "google.com/search",
    "bing.com/search",
    "yahoo.com/search",
    "duckduckgo.com/",
];

#[derive(Debug, Clone)]
pub struct ExclusionList {
    patterns: Vec<String>,
}

impl Default for ExclusionList {
    fn default() -> Self {
        Self {
            patterns: DEFAULT_EXCLUDED.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ExclusionList {
    /// Defaults plus `extra` (blank entries ignored, duplicates dropped).
    pub fn with_extra<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out = Self::default();
        for p in extra {
            let p = p.as_ref().trim();
            if !p.is_empty() && !out.patterns.iter().any(|q| q == p) {
                out.patterns.push(p.to_string());
            }
        }
        out
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// First pattern contained in `url`, if any.
    pub fn matching(&self, url: &str) -> Option<&str> {
        self.patterns
            .iter()
            .find(|p| url.contains(p.as_str()))
            .map(String::as_str)
    }

    pub fn is_excluded(&self, url: &str) -> bool {
        self.matching(url).is_some()
    }
}
