//! Lexical query parsing, matching, ranking, and headline generation.
//!
//! A query is tokenized into lowercase alphanumeric terms. Each term
//! matches any document token it is a prefix of, and every term must
//! match (boolean AND with trailing-wildcard semantics).
//!
//! The SQLite backend turns a [`LexicalQuery`] into an FTS5 `MATCH`
//! expression via [`LexicalQuery::to_fts5`]; the in-memory backend uses
//! [`LexicalQuery::matches`] and [`LexicalQuery::rank`] directly. Both
//! produce display snippets with [`headline`] so results look the same
//! regardless of backend.

/// A parsed prefix-AND keyword query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LexicalQuery {
    terms: Vec<String>,
}

impl LexicalQuery {
    /// Parse free-form user input into normalized terms.
    ///
    /// Punctuation splits terms, case is folded, and repeated terms are
    /// kept once.
    pub fn parse(query: &str) -> Self {
        let mut terms: Vec<String> = Vec::new();
        for token in tokenize(query) {
            if !terms.contains(&token) {
                terms.push(token);
            }
        }
        Self { terms }
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    /// True when the query has no usable terms and matches every document.
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// FTS5 match expression, e.g. `"adjusted"* AND "gross"*`.
    ///
    /// Returns `None` for an empty query.
    pub fn to_fts5(&self) -> Option<String> {
        if self.terms.is_empty() {
            return None;
        }
        Some(
            self.terms
                .iter()
                .map(|t| format!("\"{}\"*", t))
                .collect::<Vec<_>>()
                .join(" AND "),
        )
    }

    /// Whether a single lowercase token is matched by any term.
    pub fn matches_token(&self, token: &str) -> bool {
        self.terms.iter().any(|t| token.starts_with(t.as_str()))
    }

    /// Whether every term prefixes at least one token of `text`.
    pub fn matches(&self, text: &str) -> bool {
        let tokens = tokenize(text);
        self.terms
            .iter()
            .all(|t| tokens.iter().any(|tok| tok.starts_with(t.as_str())))
    }

    /// Term-frequency relevance in `[0, 1)`; higher is better.
    ///
    /// Each term contributes `tf / (tf + 1)`, averaged over terms.
    pub fn rank(&self, text: &str) -> f64 {
        if self.terms.is_empty() {
            return 0.0;
        }
        let tokens = tokenize(text);
        let total: f64 = self
            .terms
            .iter()
            .map(|t| {
                let tf = tokens.iter().filter(|tok| tok.starts_with(t.as_str())).count() as f64;
                tf / (tf + 1.0)
            })
            .sum();
        total / self.terms.len() as f64
    }
}

/// Split text into lowercase alphanumeric tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_lowercase())
        .collect()
}

/// Options controlling [`headline`] output.
#[derive(Debug, Clone)]
pub struct HeadlineOptions {
    /// Total word budget across all fragments.
    pub max_words: usize,
    /// Words returned when nothing matches; also the distance within
    /// which matches share a fragment.
    pub min_words: usize,
    pub max_fragments: usize,
    pub start_sel: String,
    pub stop_sel: String,
    pub fragment_delimiter: String,
}

impl Default for HeadlineOptions {
    fn default() -> Self {
        Self {
            max_words: 50,
            min_words: 25,
            max_fragments: 3,
            start_sel: "<b>".to_string(),
            stop_sel: "</b>".to_string(),
            fragment_delimiter: " ... ".to_string(),
        }
    }
}

/// Build a highlighted, fragment-delimited excerpt of `text` for `query`.
///
/// Matching words are wrapped in `start_sel`/`stop_sel`. Up to
/// `max_fragments` fragments are produced around the earliest clusters of
/// matches, sharing a budget of `max_words` words. With no matching word
/// the first `min_words` words are returned unhighlighted.
pub fn headline(text: &str, query: &LexicalQuery, opts: &HeadlineOptions) -> String {
    let words = word_spans(text);
    if words.is_empty() {
        return String::new();
    }

    let matched: Vec<bool> = words
        .iter()
        .map(|&(s, e)| query.matches_token(&text[s..e].to_lowercase()))
        .collect();

    let hits: Vec<usize> = matched
        .iter()
        .enumerate()
        .filter_map(|(i, &m)| m.then_some(i))
        .collect();

    if hits.is_empty() {
        let end = opts.min_words.max(1).min(words.len());
        return render(text, &words, &matched, 0, end, opts);
    }

    // Cluster matches that sit within `min_words` of the cluster's first hit.
    let gap = opts.min_words.max(1);
    let mut clusters: Vec<usize> = Vec::new();
    for &h in &hits {
        match clusters.last() {
            Some(&first) if h - first < gap => {}
            _ => clusters.push(h),
        }
    }
    clusters.truncate(opts.max_fragments.max(1));

    let width = (opts.max_words / clusters.len()).max(1);
    let mut fragments: Vec<(usize, usize)> = Vec::new();
    for &first in &clusters {
        let mut start = first.saturating_sub(width / 4);
        let end = (start + width).min(words.len());
        if end - start < width {
            start = end.saturating_sub(width);
        }
        match fragments.last_mut() {
            Some(prev) if start <= prev.1 => prev.1 = prev.1.max(end),
            _ => fragments.push((start, end)),
        }
    }

    fragments
        .iter()
        .map(|&(s, e)| render(text, &words, &matched, s, e, opts))
        .collect::<Vec<_>>()
        .join(&opts.fragment_delimiter)
}

/// Byte spans of alphanumeric runs.
fn word_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start: Option<usize> = None;
    for (i, c) in text.char_indices() {
        if c.is_alphanumeric() {
            if start.is_none() {
                start = Some(i);
            }
        } else if let Some(s) = start.take() {
            spans.push((s, i));
        }
    }
    if let Some(s) = start {
        spans.push((s, text.len()));
    }
    spans
}

fn render(
    text: &str,
    words: &[(usize, usize)],
    matched: &[bool],
    from: usize,
    to: usize,
    opts: &HeadlineOptions,
) -> String {
    let mut out = String::new();
    for i in from..to {
        let (s, e) = words[i];
        if i > from {
            out.push_str(&text[words[i - 1].1..s]);
        }
        if matched[i] {
            out.push_str(&opts.start_sel);
            out.push_str(&text[s..e]);
            out.push_str(&opts.stop_sel);
        } else {
            out.push_str(&text[s..e]);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_normalizes_terms() {
        let q = LexicalQuery::parse("  Adjusted GROSS  income? income ");
        assert_eq!(q.terms(), &["adjusted", "gross", "income"]);
    }

    #[test]
    fn test_fts5_expression() {
        let q = LexicalQuery::parse("tax-deduction 2023");
        assert_eq!(
            q.to_fts5().as_deref(),
            Some("\"tax\"* AND \"deduction\"* AND \"2023\"*")
        );
        assert_eq!(LexicalQuery::parse(" ?! ").to_fts5(), None);
    }

    #[test]
    fn test_prefix_and_semantics() {
        let q = LexicalQuery::parse("inc tax");
        assert!(q.matches("Total income and taxes"));
        assert!(!q.matches("Total income only"));
        assert!(LexicalQuery::parse("").matches("anything"));
    }

    #[test]
    fn test_rank_grows_with_frequency() {
        let q = LexicalQuery::parse("rust");
        let once = q.rank("rust is fast");
        let thrice = q.rank("rust rust rust");
        assert!(thrice > once);
        assert!(thrice < 1.0);
        assert_eq!(q.rank("python"), 0.0);
    }

    #[test]
    fn test_headline_highlights_matches() {
        let q = LexicalQuery::parse("income");
        let h = headline(
            "Your adjusted gross income was high.",
            &q,
            &HeadlineOptions::default(),
        );
        assert_eq!(h, "Your adjusted gross <b>income</b> was high");
    }

    #[test]
    fn test_headline_without_match_returns_leading_words() {
        let q = LexicalQuery::parse("zebra");
        let text = (0..40).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ");
        let h = headline(&text, &q, &HeadlineOptions::default());
        assert_eq!(h.split_whitespace().count(), 25);
        assert!(h.starts_with("w0 w1"));
        assert!(!h.contains("<b>"));
    }

    #[test]
    fn test_headline_splits_distant_matches_into_fragments() {
        let mut words: Vec<String> = (0..300).map(|i| format!("w{}", i)).collect();
        words[10] = "alpha".to_string();
        words[150] = "alpha".to_string();
        words[290] = "alpha".to_string();
        let text = words.join(" ");
        let h = headline(&text, &LexicalQuery::parse("alpha"), &HeadlineOptions::default());
        assert_eq!(h.matches(" ... ").count(), 2);
        assert_eq!(h.matches("<b>alpha</b>").count(), 3);
        let word_count = h.replace(" ... ", " ").split_whitespace().count();
        assert!(word_count <= 50);
    }

    #[test]
    fn test_headline_caps_fragments() {
        let mut words: Vec<String> = (0..500).map(|i| format!("w{}", i)).collect();
        for i in [5, 100, 200, 300, 400] {
            words[i] = "beta".to_string();
        }
        let h = headline(
            &words.join(" "),
            &LexicalQuery::parse("beta"),
            &HeadlineOptions::default(),
        );
        assert_eq!(h.matches(" ... ").count(), 2);
    }

    #[test]
    fn test_headline_empty_text() {
        assert_eq!(
            headline("", &LexicalQuery::parse("x"), &HeadlineOptions::default()),
            ""
        );
    }
}
