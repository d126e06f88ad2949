//! Case-insensitive pattern matching over a single text node's content.

use pagemark_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Compiled programs above this size are rejected instead of built.
const MAX_REGEX_SIZE: usize = 1 << 20;

/// How the highlight pattern is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternMode {
    /// Text is matched literally (metacharacters escaped).
    #[default]
    Literal,
    /// Text is a regular expression.
    Regex,
}

/// One occurrence within one text node, as byte offsets into its content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MatchSpan {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone)]
enum Program {
    Regex(regex::Regex),
    /// Lowercased literal, scanned char by char. Used when the escaped literal is
    /// too large to compile.
    Folded(Vec<char>),
}

#[derive(Debug, Clone)]
pub struct Matcher {
    // None = the pattern can never match (empty string).
    program: Option<Program>,
}

fn fold(c: char) -> char {
    let mut lower = c.to_lowercase();
    match (lower.next(), lower.next()) {
        (Some(l), None) => l,
        _ => c,
    }
}

fn compile(src: &str) -> std::result::Result<regex::Regex, regex::Error> {
    regex::RegexBuilder::new(src)
        .case_insensitive(true)
        .size_limit(MAX_REGEX_SIZE)
        .build()
}

impl Matcher {
    pub fn new(pattern: &str, mode: PatternMode) -> Result<Self> {
        if pattern.is_empty() {
            return Ok(Self { program: None });
        }
        match mode {
            PatternMode::Literal => Ok(Self::literal(pattern)),
            PatternMode::Regex => {
                let re = compile(pattern).map_err(|e| Error::InvalidPattern(e.to_string()))?;
                Ok(Self {
                    program: Some(Program::Regex(re)),
                })
            }
        }
    }

    /// Literal matcher. Never fails: literals over the regex size limit are scanned
    /// without a compiled program.
    pub fn literal(pattern: &str) -> Self {
        if pattern.is_empty() {
            return Self { program: None };
        }
        let program = match compile(&regex::escape(pattern)) {
            Ok(re) => Program::Regex(re),
            Err(e) => {
                tracing::debug!(len = pattern.len(), error = %e, "literal too large to compile; scanning folded");
                Program::Folded(pattern.chars().map(fold).collect())
            }
        };
        Self {
            program: Some(program),
        }
    }

    /// True when the matcher cannot produce any span.
    pub fn is_empty(&self) -> bool {
        self.program.is_none()
    }

    /// Non-empty, non-overlapping matches, left to right.
    pub fn find_spans(&self, text: &str) -> Vec<MatchSpan> {
        match &self.program {
            None => Vec::new(),
            Some(Program::Regex(re)) => re
                .find_iter(text)
                .filter(|m| !m.is_empty())
                .map(|m| MatchSpan {
                    start: m.start(),
                    end: m.end(),
                })
                .collect(),
            Some(Program::Folded(needle)) => find_folded(text, needle),
        }
    }
}

fn find_folded(text: &str, needle: &[char]) -> Vec<MatchSpan> {
    let hay: Vec<(usize, char)> = text.char_indices().map(|(i, c)| (i, fold(c))).collect();
    let mut out = Vec::new();
    if needle.is_empty() || hay.len() < needle.len() {
        return out;
    }
    let mut i = 0usize;
    while i + needle.len() <= hay.len() {
        let hit = hay[i..i + needle.len()]
            .iter()
            .zip(needle)
            .all(|((_, h), n)| h == n);
        if hit {
            let end = hay
                .get(i + needle.len())
                .map(|(b, _)| *b)
                .unwrap_or(text.len());
            out.push(MatchSpan {
                start: hay[i].0,
                end,
            });
            i += needle.len();
        } else {
            i += 1;
        }
    }
    out
}

/// Split `text` around `spans`: `(piece, is_match)` in order, empty pieces omitted.
///
/// `spans` must be ascending and non-overlapping, as [`Matcher::find_spans`] returns them.
pub fn split_by_spans<'a>(text: &'a str, spans: &[MatchSpan]) -> Vec<(&'a str, bool)> {
    let mut out = Vec::with_capacity(spans.len() * 2 + 1);
    let mut last = 0usize;
    for span in spans {
        if span.start > last {
            out.push((&text[last..span.start], false));
        }
        out.push((&text[span.start..span.end], true));
        last = span.end;
    }
    if last < text.len() {
        out.push((&text[last..], false));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_mode_escapes_metacharacters() {
        let m = Matcher::new("a.b", PatternMode::Literal).unwrap();
        assert!(m.find_spans("axb").is_empty());
        assert_eq!(m.find_spans("A.B"), vec![MatchSpan { start: 0, end: 3 }]);
    }

    #[test]
    fn regex_mode_is_case_insensitive_and_skips_empty_matches() {
        let m = Matcher::new("x*", PatternMode::Regex).unwrap();
        assert_eq!(m.find_spans("aXxa"), vec![MatchSpan { start: 1, end: 3 }]);
        assert!(Matcher::new("(", PatternMode::Regex).is_err());
    }

    #[test]
    fn empty_pattern_never_matches() {
        assert!(Matcher::literal("").is_empty());
        assert!(Matcher::new("", PatternMode::Regex).unwrap().is_empty());
        assert!(Matcher::literal("").find_spans("anything").is_empty());
    }

    #[test]
    fn whitespace_is_a_real_pattern() {
        let m = Matcher::literal("  ");
        assert!(!m.is_empty());
        assert_eq!(m.find_spans("a  b"), vec![MatchSpan { start: 1, end: 3 }]);
        assert!(m.find_spans("a b").is_empty());
    }

    #[test]
    fn long_literals_compile_or_fall_back() {
        let needle = "Ab".repeat(20_000);
        let m = Matcher::new(&needle, PatternMode::Literal).unwrap();
        assert!(matches!(m.program, Some(Program::Folded(_))));
        let text = format!("xx {} yy", needle.to_lowercase());
        assert_eq!(
            m.find_spans(&text),
            vec![MatchSpan {
                start: 3,
                end: 3 + needle.len()
            }]
        );
        assert!(m.find_spans(&"ab".repeat(19_999)).is_empty());
    }

    #[test]
    fn folded_scan_reports_byte_offsets() {
        let spans = find_folded("ÄÖ äö ÄÖ", &['ä', 'ö']);
        assert_eq!(
            spans,
            vec![
                MatchSpan { start: 0, end: 4 },
                MatchSpan { start: 5, end: 9 },
                MatchSpan { start: 10, end: 14 }
            ]
        );
    }

    #[test]
    fn split_by_spans_keeps_all_text() {
        let text = "say hello world, hello";
        let m = Matcher::literal("HELLO");
        let spans = m.find_spans(text);
        assert_eq!(spans.len(), 2);
        let parts = split_by_spans(text, &spans);
        assert_eq!(
            parts,
            vec![
                ("say ", false),
                ("hello", true),
                (" world, ", false),
                ("hello", true)
            ]
        );
        let joined: String = parts.iter().map(|(s, _)| *s).collect();
        assert_eq!(joined, text);
    }
}
