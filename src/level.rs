//! Log levels.
//!
//! A superset of syslog levels, ordered from least to most verbose. `Off` is
//! a pseudo-level: no record is ever admissible *at* `Off`, but a handler's
//! threshold for a prefix can be configured to `Off` to mean "never".

use failure::Fail;
use std::fmt;
use std::str::FromStr;

/// One of the thirteen severities a record can carry, plus `Off`.
///
/// Declared in increasing verbosity order so that `derive(PartialOrd, Ord)`
/// gives `Off < Panic < Alert < ... < Lowest` for free.
#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Level {
    Off = 0,
    Panic,
    Alert,
    Critical,
    Error,
    Warning,
    Notice,
    Output,
    Info,
    Debug,
    Fine,
    Trace,
    Lowest,
}

/// Single-character tag for each level, in level order starting at `Off`.
///
/// Used by text formatters that need a fixed-width column.
const LEVEL_CHARS: &str = "-PACEWNOIDFTL";

impl Level {
    /// All levels in increasing order, `Off` first.
    pub const ALL: [Level; 13] = [
        Level::Off,
        Level::Panic,
        Level::Alert,
        Level::Critical,
        Level::Error,
        Level::Warning,
        Level::Notice,
        Level::Output,
        Level::Info,
        Level::Debug,
        Level::Fine,
        Level::Trace,
        Level::Lowest,
    ];

    /// The single character used to tag this level in fixed-width output.
    pub fn as_char(self) -> char {
        LEVEL_CHARS.as_bytes()[self as usize] as char
    }

    /// Canonical lowercase name, as used by `Display`/`FromStr`.
    pub fn name(self) -> &'static str {
        match self {
            Level::Off => "off",
            Level::Panic => "panic",
            Level::Alert => "alert",
            Level::Critical => "critical",
            Level::Error => "error",
            Level::Warning => "warning",
            Level::Notice => "notice",
            Level::Output => "output",
            Level::Info => "info",
            Level::Debug => "debug",
            Level::Fine => "fine",
            Level::Trace => "trace",
            Level::Lowest => "lowest",
        }
    }

    /// Whether a record at `self` is admissible when the observer's
    /// threshold is `threshold`: `self <= threshold` and `self != Off`.
    ///
    /// `Off` is never an admissible record level, even against a `Lowest`
    /// threshold; it only exists so that thresholds can turn a prefix off
    /// entirely.
    pub fn is_admissible_at(self, threshold: Level) -> bool {
        self != Level::Off && self <= threshold
    }

    /// Numeric value in `0..=12`, ordered from most to least severe.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Builds a `Level` from its numeric value, clamping anything above
    /// `Lowest` down to `Lowest` rather than failing.
    fn from_u64_clamped(v: u64) -> Level {
        Level::ALL
            .get(v as usize)
            .copied()
            .unwrap_or(Level::Lowest)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Error returned by [`Level::from_str`] on a string that is neither a known
/// (possibly aliased) level name nor a non-negative integer.
#[derive(Debug, Clone, PartialEq, Eq, Fail)]
#[fail(display = "'{}' is not a valid log level", 0)]
pub struct BadLevelError(pub String);

/// Outcome of parsing a textual level that also carries a recoverable
/// warning: a numeric level greater than `Lowest` is clamped rather than
/// rejected, but the caller may want to know that happened.
pub struct ParsedLevel {
    pub level: Level,
    /// Set when a numeric level had to be clamped down to `Lowest`.
    pub clamped: bool,
}

impl FromStr for Level {
    type Err = BadLevelError;

    /// Case-insensitive name lookup (with the aliases `emergency`/`emerg`
    /// for `panic`, `crit` for `critical`, `err` for `error`, `warn` for
    /// `warning`, `out` for `output`, `all`/`lowest` for `lowest`), or a
    /// plain non-negative integer which is clamped to `Lowest` when it
    /// overflows the enumeration.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(parse_level(s)?.level)
    }
}

/// Parses a level name or number, reporting whether a numeric value had to
/// be clamped. See [`FromStr for Level`] for the accepted grammar.
pub fn parse_level(s: &str) -> Result<ParsedLevel, BadLevelError> {
    let lower = s.trim().to_ascii_lowercase();
    let level = match lower.as_str() {
        "off" => Some(Level::Off),
        "panic" | "emergency" | "emerg" => Some(Level::Panic),
        "alert" => Some(Level::Alert),
        "critical" | "crit" => Some(Level::Critical),
        "error" | "err" => Some(Level::Error),
        "warning" | "warn" => Some(Level::Warning),
        "notice" => Some(Level::Notice),
        "output" | "out" => Some(Level::Output),
        "info" => Some(Level::Info),
        "debug" => Some(Level::Debug),
        "fine" => Some(Level::Fine),
        "trace" => Some(Level::Trace),
        "lowest" | "all" => Some(Level::Lowest),
        _ => None,
    };
    if let Some(level) = level {
        return Ok(ParsedLevel {
            level,
            clamped: false,
        });
    }
    match lower.parse::<u64>() {
        Ok(v) => {
            let level = Level::from_u64_clamped(v);
            Ok(ParsedLevel {
                level,
                clamped: v as usize >= Level::ALL.len(),
            })
        }
        Err(_) => Err(BadLevelError(s.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering() {
        assert!(Level::Off < Level::Panic);
        assert!(Level::Panic < Level::Lowest);
        assert!(Level::Debug < Level::Trace);
    }

    #[test]
    fn admissible() {
        assert!(!Level::Off.is_admissible_at(Level::Lowest));
        assert!(Level::Error.is_admissible_at(Level::Warning) == false);
        assert!(Level::Warning.is_admissible_at(Level::Error));
        assert!(Level::Error.is_admissible_at(Level::Error));
    }

    #[test]
    fn parses_names_case_insensitively() {
        assert_eq!("ERROR".parse::<Level>().unwrap(), Level::Error);
        assert_eq!("Warn".parse::<Level>().unwrap(), Level::Warning);
        assert_eq!("emergency".parse::<Level>().unwrap(), Level::Panic);
        assert_eq!("all".parse::<Level>().unwrap(), Level::Lowest);
    }

    #[test]
    fn parses_numbers_and_clamps() {
        let p = parse_level("4").unwrap();
        assert_eq!(p.level, Level::Error);
        assert!(!p.clamped);

        let p = parse_level("9000").unwrap();
        assert_eq!(p.level, Level::Lowest);
        assert!(p.clamped);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_level("").is_err());
        assert!(parse_level("bogus").is_err());
        assert!(parse_level("-1").is_err());
    }

    #[test]
    fn display_roundtrips_through_from_str() {
        for level in Level::ALL.iter().copied() {
            let s = level.to_string();
            assert_eq!(s.parse::<Level>().unwrap(), level);
        }
    }
}
