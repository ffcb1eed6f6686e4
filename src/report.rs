//! Rendering an [`Error`](crate::error::Error) chain into a human-readable
//! report, and posting that report back through a logger.
//!
//! Given an error chain, walk it top to bottom, number each link, and
//! produce a message line and a backtrace line for each; either log the
//! whole thing line by line through a [`Logger`](crate::registry::Logger)
//! (backtrace lines always at [`Level::Trace`]) or hand back the rendered
//! text for the caller to do something else with.

use crate::error::Error;
use crate::level::Level;
use crate::registry::Logger;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineKind {
    Message,
    Backtrace,
}

#[derive(Debug, Clone)]
struct ReportLine {
    text: String,
    kind: LineKind,
}

/// A rendered error chain: a message line and a backtrace line per link,
/// deepest cause last.
#[derive(Debug, Clone)]
pub struct Report {
    lines: Vec<ReportLine>,
    /// Number of links actually rendered; may be less than the chain's true
    /// depth if a `max_depth` cutoff was supplied.
    pub rendered_depth: usize,
    /// True if the chain was longer than `rendered_depth` and got cut off.
    pub truncated: bool,
}

impl Report {
    pub(crate) fn render(err: &Error, max_depth: Option<usize>) -> Report {
        let mut lines = Vec::new();
        let mut cursor = Some(err);
        let mut n = 0usize;
        let mut truncated = false;
        while let Some(e) = cursor {
            if let Some(max) = max_depth {
                if n >= max {
                    truncated = true;
                    break;
                }
            }
            let mut message = format!("{:>3}. [{}] {}", n + 1, e.code(), e.message());
            if let Some(data) = e.data() {
                let rendered = data.render();
                if !rendered.is_empty() {
                    message.push_str(&format!("\n     {}", rendered.replace('\n', "\n     ")));
                }
            }
            lines.push(ReportLine { text: message, kind: LineKind::Message });
            lines.push(ReportLine {
                text: format!("     {}", e.backtrace()),
                kind: LineKind::Backtrace,
            });
            cursor = e.cause();
            n += 1;
        }
        if truncated {
            let mut remaining = 0usize;
            let mut tail = cursor;
            while let Some(e) = tail {
                remaining += 1;
                tail = e.cause();
            }
            lines.push(ReportLine {
                text: format!("     …<{} more causes>", remaining),
                kind: LineKind::Message,
            });
        }
        Report { lines, rendered_depth: n, truncated }
    }

    /// Every rendered line, in order: message line, backtrace line, message
    /// line, backtrace line, ... and a final `…<N more causes>` line if
    /// truncated.
    pub fn lines(&self) -> Vec<String> {
        self.lines.iter().map(|l| l.text.clone()).collect()
    }

    /// Logs every line of this report through `logger`: message lines (and
    /// the truncation line, if any) at `level`, backtrace lines always at
    /// [`Level::Trace`]. Returns the report so the caller can do more with
    /// it; see [`Error::report`] for the fire-and-forget variant.
    pub fn emit(self, logger: &Logger, level: Level) -> Report {
        for line in &self.lines {
            let line_level = match line.kind {
                LineKind::Backtrace => Level::Trace,
                LineKind::Message => level,
            };
            logger.log(line_level, line.text.clone());
        }
        self
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, line) in self.lines.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", line.text)?;
        }
        Ok(())
    }
}

impl Error {
    /// Renders and immediately logs this error's full chain through
    /// `logger` at `level`, discarding the rendered text.
    pub fn report(&self, logger: &Logger, level: Level) {
        let _ = self.render(None).emit(logger, level);
    }

    /// Same as [`Error::report`], but returns the rendered [`Report`]
    /// instead of discarding it.
    pub fn report_keep(&self, logger: &Logger, level: Level) -> Report {
        self.render(None).emit(logger, level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::codes;

    #[test]
    fn renders_single_link() {
        let e = Error::new(codes::GENERIC, "boom");
        let report = e.render(None);
        let lines = report.lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("boom"));
    }

    #[test]
    fn renders_full_chain_in_order() {
        let a = Error::new(1, "root");
        let b = Error::new(2, "middle");
        let ab = crate::error::chain(Some(a), Some(b)).unwrap();
        let c = Error::new(3, "top");
        let abc = crate::error::chain(Some(ab), Some(c)).unwrap();
        let report = abc.render(None);
        assert_eq!(report.rendered_depth, 3);
        let lines = report.lines();
        assert_eq!(lines.len(), 6);
        assert!(lines[0].contains("top"));
        assert!(lines[2].contains("middle"));
        assert!(lines[4].contains("root"));
        assert!(!report.truncated);
    }

    #[test]
    fn max_depth_truncates_with_remaining_count() {
        let a = Error::new(1, "root");
        let b = Error::new(2, "top");
        let ab = crate::error::chain(Some(a), Some(b)).unwrap();
        let report = ab.render(Some(1));
        assert_eq!(report.rendered_depth, 1);
        assert!(report.truncated);
        let lines = report.lines();
        assert_eq!(lines.len(), 3);
        assert!(lines.last().unwrap().contains("1 more causes"));
    }
}
