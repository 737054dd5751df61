//! Label matchers
//!
//! Matchers select series by label. A set of matchers is conjunctive. Regex
//! matchers are fully anchored, and a label that is absent matches as if its
//! value were the empty string.

use crate::index::Labels;
use crate::query::{QueryError, QueryResult};
use regex::Regex;
use std::fmt;

/// Kind of comparison a matcher performs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    Equal,
    NotEqual,
    Regex,
    NotRegex,
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchType::Equal => write!(f, "="),
            MatchType::NotEqual => write!(f, "!="),
            MatchType::Regex => write!(f, "=~"),
            MatchType::NotRegex => write!(f, "!~"),
        }
    }
}

/// A single label matcher
#[derive(Debug, Clone)]
pub struct Matcher {
    pub kind: MatchType,
    pub name: String,
    pub value: String,
    regex: Option<Regex>,
}

impl Matcher {
    /// Build a matcher, compiling the pattern for regex kinds
    pub fn new(kind: MatchType, name: impl Into<String>, value: impl Into<String>) -> QueryResult<Self> {
        let name = name.into();
        let value = value.into();

        let regex = match kind {
            MatchType::Regex | MatchType::NotRegex => Some(
                Regex::new(&format!("^(?:{})$", value))
                    .map_err(|e| QueryError::InvalidMatcher(format!("{name}{kind}{value:?}: {e}")))?,
            ),
            MatchType::Equal | MatchType::NotEqual => None,
        };

        Ok(Self {
            kind,
            name,
            value,
            regex,
        })
    }

    pub fn equal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: MatchType::Equal,
            name: name.into(),
            value: value.into(),
            regex: None,
        }
    }

    pub fn not_equal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: MatchType::NotEqual,
            name: name.into(),
            value: value.into(),
            regex: None,
        }
    }

    /// Test a single label value
    pub fn matches_value(&self, value: &str) -> bool {
        match (self.kind, &self.regex) {
            (MatchType::Equal, _) => value == self.value,
            (MatchType::NotEqual, _) => value != self.value,
            (MatchType::Regex, Some(re)) => re.is_match(value),
            (MatchType::NotRegex, Some(re)) => !re.is_match(value),
            // regex kinds are only constructed through `new`, which compiles the pattern
            (MatchType::Regex | MatchType::NotRegex, None) => false,
        }
    }

    /// Test a label set
    pub fn matches(&self, labels: &Labels) -> bool {
        self.matches_value(labels.get(&self.name).unwrap_or(""))
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{:?}", self.name, self.kind, self.value)
    }
}

/// Whether every matcher accepts `labels`
pub fn matches_all(matchers: &[Matcher], labels: &Labels) -> bool {
    matchers.iter().all(|m| m.matches(labels))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> Labels {
        Labels::new([("foo", "bar"), ("bazz", "buzz")])
    }

    #[test]
    fn test_equal_and_not_equal() {
        assert!(Matcher::equal("foo", "bar").matches(&labels()));
        assert!(!Matcher::equal("foo", "baz").matches(&labels()));
        assert!(Matcher::not_equal("foo", "baz").matches(&labels()));
        assert!(!Matcher::not_equal("foo", "bar").matches(&labels()));
    }

    #[test]
    fn test_missing_label_is_empty() {
        assert!(Matcher::equal("missing", "").matches(&labels()));
        assert!(Matcher::not_equal("missing", "x").matches(&labels()));
    }

    #[test]
    fn test_regex_is_anchored() {
        let m = Matcher::new(MatchType::Regex, "foo", "ba.").unwrap();
        assert!(m.matches(&labels()));

        let m = Matcher::new(MatchType::Regex, "foo", "b").unwrap();
        assert!(!m.matches(&labels()));

        let m = Matcher::new(MatchType::NotRegex, "bazz", "bu.*").unwrap();
        assert!(!m.matches(&labels()));
    }

    #[test]
    fn test_invalid_regex() {
        let err = Matcher::new(MatchType::Regex, "foo", "(").unwrap_err();
        assert!(matches!(err, QueryError::InvalidMatcher(_)));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_matches_all_is_conjunctive() {
        let ms = vec![Matcher::equal("foo", "bar"), Matcher::equal("bazz", "buzz")];
        assert!(matches_all(&ms, &labels()));
        assert!(!matches_all(&ms, &Labels::new([("foo", "bar")])));
        assert!(matches_all(&[], &Labels::default()));
    }

    #[test]
    fn test_display() {
        assert_eq!(Matcher::equal("foo", "bar").to_string(), r#"foo="bar""#);
        let m = Matcher::new(MatchType::NotRegex, "a", "b.*").unwrap();
        assert_eq!(m.to_string(), r#"a!~"b.*""#);
    }
}
