//! Minimal direct-to-stderr diagnostic writer (§7, "stderr").
//!
//! The library cannot report its own bootstrap failures through its own
//! not-yet-initialized record pipeline, so this writes straight to
//! `term::stderr()` with `humantime`-formatted timestamps — exactly the
//! role `dqcsim-log`/`dqcsim`'s `log/thread.rs` gives its own direct
//! terminal writer, generalized here from "the coordinator's stderr
//! mirror of every admitted record" to "whatever this crate itself needs
//! to say before or outside a running coordinator."

use crate::level::Level;
use std::io::Write;
use std::time::SystemTime;
use term::{color, Attr, Terminal};

fn color_for(level: Level) -> color::Color {
    match level {
        Level::Panic | Level::Alert | Level::Critical | Level::Error => color::RED,
        Level::Warning => color::YELLOW,
        Level::Notice | Level::Output => color::GREEN,
        _ => color::WHITE,
    }
}

/// Writes one diagnostic line. Falls back to plain `eprintln!` when
/// stderr has no attached terminal (piped output, most CI).
pub fn line(level: Level, message: &str) {
    if write_colored(level, message).is_none() {
        eprintln!("{} [{}] {}", humantime::format_rfc3339_seconds(SystemTime::now()), level.as_char(), message);
    }
}

fn write_colored(level: Level, message: &str) -> Option<()> {
    let mut t = term::stderr()?;
    t.reset().ok()?;
    if t.supports_attr(Attr::Dim) {
        let _ = t.attr(Attr::Dim);
    }
    write!(t, "{} ", humantime::format_rfc3339_seconds(SystemTime::now())).ok()?;
    t.reset().ok()?;
    let _ = t.fg(color_for(level));
    writeln!(t, "[{}] {}", level.as_char(), message).ok()?;
    t.reset().ok()?;
    Some(())
}

pub fn warn(message: &str) {
    line(Level::Warning, message);
}

pub fn bug(message: &str) {
    line(Level::Critical, message);
}
