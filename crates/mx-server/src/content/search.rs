//! Free-text keyword matching.

use super::ContentError;

/// A whitespace-tokenized, case-insensitive keyword query.
///
/// An item matches when any token occurs as a substring of its title or
/// its text. No ranking is performed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordQuery {
    tokens: Vec<String>,
}

impl KeywordQuery {
    /// Split `raw` on whitespace. A query with no tokens is rejected.
    pub fn parse(raw: &str) -> Result<Self, ContentError> {
        let tokens: Vec<String> = raw.split_whitespace().map(str::to_lowercase).collect();
        if tokens.is_empty() {
            return Err(ContentError::invalid("search keyword must not be empty"));
        }
        Ok(Self { tokens })
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn matches(&self, title: &str, text: &str) -> bool {
        let title = title.to_lowercase();
        let text = text.to_lowercase();
        self.tokens
            .iter()
            .any(|t| title.contains(t.as_str()) || text.contains(t.as_str()))
    }

    /// `ILIKE` patterns (`%token%`), with `\`, `%` and `_` escaped.
    pub fn ilike_patterns(&self) -> Vec<String> {
        self.tokens
            .iter()
            .map(|t| {
                let mut pattern = String::with_capacity(t.len() + 2);
                pattern.push('%');
                for c in t.chars() {
                    if matches!(c, '\\' | '%' | '_') {
                        pattern.push('\\');
                    }
                    pattern.push(c);
                }
                pattern.push('%');
                pattern
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_token_in_any_field() {
        let q = KeywordQuery::parse("foo bar").unwrap();
        let items = [("foo", ""), ("baz", "contains bar here"), ("qux", "")];
        let hits: Vec<_> = items
            .iter()
            .filter(|(title, text)| q.matches(title, text))
            .map(|(title, _)| *title)
            .collect();
        assert_eq!(hits, vec!["foo", "baz"]);
    }

    #[test]
    fn case_insensitive() {
        let q = KeywordQuery::parse("RUST").unwrap();
        assert!(q.matches("Learning rust", ""));
        assert!(q.matches("", "TrUsT"));
    }

    #[test]
    fn blank_query_is_rejected() {
        assert!(matches!(
            KeywordQuery::parse("   \t"),
            Err(ContentError::InvalidArgument(_))
        ));
        assert!(KeywordQuery::parse("").is_err());
    }

    #[test]
    fn ilike_patterns_escape_wildcards() {
        let q = KeywordQuery::parse("50% a_b").unwrap();
        assert_eq!(q.tokens(), ["50%", "a_b"]);
        assert_eq!(q.ilike_patterns(), vec![r"%50\%%", r"%a\_b%"]);
    }
}
