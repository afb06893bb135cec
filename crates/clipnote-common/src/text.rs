//! Text helpers shared by index derivation, full-text search and
//! search-cache key normalization.

/// Maximum preview length in characters
pub const PREVIEW_CHARS: usize = 160;

/// Tokens longer than this are truncated
pub const MAX_TOKEN_CHARS: usize = 64;

/// Split text into lower-cased alphanumeric tokens.
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase().chars().take(MAX_TOKEN_CHARS).collect())
}

/// Whitespace-collapsed head of `text`, cut at a char boundary
#[must_use]
pub fn preview(text: &str) -> String {
    let mut out = String::new();
    let mut chars = 0usize;
    for word in text.split_whitespace() {
        if chars >= PREVIEW_CHARS {
            break;
        }
        if !out.is_empty() {
            out.push(' ');
            chars += 1;
        }
        for c in word.chars() {
            if chars >= PREVIEW_CHARS {
                break;
            }
            out.push(c);
            chars += 1;
        }
    }
    out
}

/// Number of whitespace-separated words
#[must_use]
pub fn word_count(text: &str) -> u32 {
    u32::try_from(text.split_whitespace().count()).unwrap_or(u32::MAX)
}

/// First non-blank line, trimmed and cut to the preview length
#[must_use]
pub fn title_line(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(|l| l.chars().take(PREVIEW_CHARS).collect())
        .unwrap_or_default()
}

/// A single search term
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryTerm {
    pub text: String,
    /// Match any indexed token starting with `text`
    pub prefix: bool,
}

/// Parse a user query into search terms.
///
/// Words are tokenized like indexed text; a word ending in `*` turns its last
/// token into a prefix term.
#[must_use]
pub fn query_terms(query: &str) -> Vec<QueryTerm> {
    let mut terms = Vec::new();
    for word in query.split_whitespace() {
        let prefix = word.ends_with('*');
        let start = terms.len();
        terms.extend(tokenize(word).map(|text| QueryTerm { text, prefix: false }));
        if prefix
            && terms.len() > start
            && let Some(last) = terms.last_mut()
        {
            last.prefix = true;
        }
    }
    terms
}

/// Canonical form of a query, used as the search-cache key
#[must_use]
pub fn normalize_query(query: &str) -> String {
    query_terms(query)
        .iter()
        .map(|t| {
            if t.prefix {
                format!("{}*", t.text)
            } else {
                t.text.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize() {
        let tokens: Vec<_> = tokenize("Quarterly-Plan, v2 (draft)").collect();
        assert_eq!(tokens, vec!["quarterly", "plan", "v2", "draft"]);
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let long = "é".repeat(PREVIEW_CHARS + 20);
        let p = preview(&long);
        assert_eq!(p.chars().count(), PREVIEW_CHARS);
        assert_eq!(preview("  a\n\tb  c "), "a b c");
    }

    #[test]
    fn test_word_count_and_title_line() {
        assert_eq!(word_count("one two  three\nfour"), 4);
        assert_eq!(word_count(""), 0);
        assert_eq!(title_line("\n\n  First line \nsecond"), "First line");
    }

    #[test]
    fn test_query_terms_prefix() {
        let terms = query_terms("Quart* plan");
        assert_eq!(
            terms,
            vec![
                QueryTerm {
                    text: "quart".into(),
                    prefix: true
                },
                QueryTerm {
                    text: "plan".into(),
                    prefix: false
                },
            ]
        );
        assert!(query_terms("  *  ").is_empty());
    }

    #[test]
    fn test_normalize_query() {
        assert_eq!(normalize_query("  Quarterly   PLAN "), "quarterly plan");
        assert_eq!(normalize_query("quart*"), "quart*");
        assert_eq!(normalize_query("!!!"), "");
    }
}
