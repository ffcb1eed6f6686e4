//! Filter model: `(prefix, level)` rules and the longest-prefix-match
//! resolution a handler uses to decide a logger's effective threshold.
//!
//! Grammar (see also `dqcsim/src/log/tee_file.rs`'s `TeeFile::from_str`,
//! which this module's `FromStr`/`Display` pair is modeled on):
//!
//! ```text
//! filters ::= filter ("," filter)*
//! filter  ::= prefix ":" level
//! level   ::= name | nonneg-integer
//! ```

use crate::level::{parse_level, Level};
use failure::Fail;
use std::fmt;
use std::str::FromStr;

/// A single `(prefix, level)` rule: matches any logger name starting with
/// `prefix` (the empty prefix matches everything).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub prefix: String,
    pub level: Level,
}

impl Filter {
    pub fn new(prefix: impl Into<String>, level: Level) -> Filter {
        Filter {
            prefix: prefix.into(),
            level,
        }
    }

    fn matches(&self, logger_name: &str) -> bool {
        logger_name.starts_with(self.prefix.as_str())
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.prefix, self.level)
    }
}

/// An ordered, growable sequence of [`Filter`]s.
///
/// Resolution is longest-matching-prefix; ties (two filters with the same
/// prefix length) are broken by later occurrence in the set, so a later
/// filter always overrides an earlier one of equal specificity.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilterSet {
    filters: Vec<Filter>,
}

#[derive(Debug, Clone, PartialEq, Eq, Fail)]
#[fail(display = "malformed filter string '{}': {}", input, reason)]
pub struct FilterParseError {
    pub input: String,
    pub reason: String,
}

impl FilterSet {
    pub fn new() -> FilterSet {
        FilterSet { filters: Vec::new() }
    }

    /// Every prefix switched off: the empty prefix at [`Level::Off`].
    pub fn all_off() -> FilterSet {
        FilterSet {
            filters: vec![Filter::new("", Level::Off)],
        }
    }

    /// Every prefix admits up to and including [`Level::Output`].
    pub fn all_output() -> FilterSet {
        FilterSet {
            filters: vec![Filter::new("", Level::Output)],
        }
    }

    /// Every prefix admits everything, down to [`Level::Lowest`].
    pub fn all_all() -> FilterSet {
        FilterSet {
            filters: vec![Filter::new("", Level::Lowest)],
        }
    }

    pub fn push(&mut self, filter: Filter) {
        self.filters.push(filter);
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// The threshold this set assigns to `logger_name`: the level of the
    /// longest-matching prefix, `Off` if nothing matches.
    pub fn threshold_for(&self, logger_name: &str) -> Level {
        let mut best: Option<(usize, usize, Level)> = None; // (prefix_len, index, level)
        for (idx, filter) in self.filters.iter().enumerate() {
            if !filter.matches(logger_name) {
                continue;
            }
            let candidate = (filter.prefix.len(), idx, filter.level);
            match &best {
                None => best = Some(candidate),
                Some((best_len, best_idx, _)) => {
                    if candidate.0 > *best_len || (candidate.0 == *best_len && candidate.1 > *best_idx) {
                        best = Some(candidate);
                    }
                }
            }
        }
        best.map(|(_, _, level)| level).unwrap_or(Level::Off)
    }
}

impl fmt::Display for FilterSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let rendered: Vec<String> = self.filters.iter().map(|flt| flt.to_string()).collect();
        write!(f, "{}", rendered.join(","))
    }
}

impl FromStr for FilterSet {
    type Err = FilterParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FilterSet::parse(s)
    }
}

impl FilterSet {
    /// Parses the textual grammar above. Numeric levels above `Lowest`
    /// clamp down to `Lowest` (the clamp is silent here; callers who need
    /// the recoverable warning should call [`parse_level`] themselves).
    pub fn parse(s: &str) -> Result<FilterSet, FilterParseError> {
        if s.is_empty() {
            return Err(FilterParseError {
                input: s.to_string(),
                reason: "empty filter string".to_string(),
            });
        }
        let mut filters = Vec::new();
        for entry in s.split(',') {
            let entry = entry.trim();
            if entry.is_empty() {
                return Err(FilterParseError {
                    input: s.to_string(),
                    reason: "empty filter entry".to_string(),
                });
            }
            let colon = entry.rfind(':').ok_or_else(|| FilterParseError {
                input: s.to_string(),
                reason: format!("missing ':' in entry '{}'", entry),
            })?;
            let (prefix, rest) = entry.split_at(colon);
            let level_str = &rest[1..];
            let parsed = parse_level(level_str).map_err(|_| FilterParseError {
                input: s.to_string(),
                reason: format!("'{}' is not a valid level in entry '{}'", level_str, entry),
            })?;
            filters.push(Filter::new(prefix, parsed.level));
        }
        Ok(FilterSet { filters })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn longest_prefix_wins() {
        let mut fs = FilterSet::new();
        fs.push(Filter::new("", Level::Error));
        fs.push(Filter::new("a.b", Level::Debug));
        fs.push(Filter::new("a.b.c.internal", Level::Warning));
        assert_eq!(fs.threshold_for("a.b.c"), Level::Debug);
        assert_eq!(fs.threshold_for("a.b.c.internal.deep"), Level::Warning);
        assert_eq!(fs.threshold_for("z"), Level::Error);
    }

    #[test]
    fn no_match_is_off() {
        let mut fs = FilterSet::new();
        fs.push(Filter::new("a", Level::Debug));
        assert_eq!(fs.threshold_for("b"), Level::Off);
    }

    #[test]
    fn ties_break_on_later_occurrence() {
        let mut fs = FilterSet::new();
        fs.push(Filter::new("a.b", Level::Error));
        fs.push(Filter::new("a.b", Level::Trace));
        assert_eq!(fs.threshold_for("a.b.c"), Level::Trace);
    }

    #[test]
    fn singletons() {
        assert_eq!(FilterSet::all_off().threshold_for("anything"), Level::Off);
        assert_eq!(FilterSet::all_output().threshold_for("anything"), Level::Output);
        assert_eq!(FilterSet::all_all().threshold_for("anything"), Level::Lowest);
    }

    #[test]
    fn parses_basic_grammar() {
        let fs: FilterSet = "a.b:DEBUG,:ERROR".parse().unwrap();
        assert_eq!(fs.filters().len(), 2);
        assert_eq!(fs.threshold_for("a.b.x"), Level::Debug);
        assert_eq!(fs.threshold_for("z"), Level::Error);
    }

    #[test]
    fn parses_numeric_levels_and_clamps() {
        let fs: FilterSet = ":9000".parse().unwrap();
        assert_eq!(fs.threshold_for("anything"), Level::Lowest);
    }

    #[test]
    fn rejects_malformed_entries() {
        assert!(FilterSet::parse("").is_err());
        assert!(FilterSet::parse("noColon").is_err());
        assert!(FilterSet::parse("a:").is_err());
        assert!(FilterSet::parse("a:bogus").is_err());
        assert!(FilterSet::parse("a:ERROR,,b:DEBUG").is_err());
    }

    #[test]
    fn display_roundtrips_with_canonical_names() {
        let original = "a.b:debug,:error";
        let fs: FilterSet = original.parse().unwrap();
        let rendered = fs.to_string();
        let reparsed: FilterSet = rendered.parse().unwrap();
        assert_eq!(fs, reparsed);
    }
}
