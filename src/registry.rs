//! Logger registry: one mutex-protected table mapping names to loggers,
//! plus the `Logger` handle business code actually calls into.

use crate::filter::FilterSet;
use crate::level::Level;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

/// A named logger with a mutable effective level.
///
/// The level is an `AtomicU8` rather than behind the registry's mutex:
/// producers read it on the hot path and are allowed to see a value one
/// `reconfigure` call stale, in exchange for never taking a lock to log.
#[derive(Debug)]
pub struct Logger {
    name: String,
    level: AtomicU8,
}

impl Logger {
    pub fn new(name: impl Into<String>, level: Level) -> Logger {
        Logger {
            name: name.into(),
            level: AtomicU8::new(level.as_u8()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn level(&self) -> Level {
        let raw = self.level.load(Ordering::Relaxed);
        Level::ALL.get(raw as usize).copied().unwrap_or(Level::Lowest)
    }

    pub(crate) fn set_level(&self, level: Level) {
        self.level.store(level.as_u8(), Ordering::Relaxed);
    }

    /// `level <= self.level() && level != Off`: the coarse, producer-side
    /// admissibility gate described in §4.F.5 of the design — exact
    /// filtering happens again, per handler, downstream.
    pub fn is_enabled_for(&self, level: Level) -> bool {
        level.is_admissible_at(self.level())
    }

    /// Logs `message` at `level` through this logger's thread-local
    /// producer endpoint, the same path [`crate::log_line!`] uses. Used by
    /// [`crate::report::Report::emit`] to feed a rendered error chain back
    /// into the logging pipeline.
    pub fn log(&self, level: Level, message: impl Into<String>) {
        crate::producer::log_rawstr(self, level, file!(), "report", line!(), message.into());
    }
}

/// Distinguishes a logger declared at a call site (`static`, never freed,
/// e.g. via `lazy_static!`) from one created dynamically by
/// [`Registry::get`] and owned by the registry — the "tagged variant
/// captures the same distinction with no run-time branch on free" scheme.
#[derive(Clone)]
pub enum LoggerRef {
    Static(&'static Logger),
    Owned(Arc<Logger>),
}

impl LoggerRef {
    pub fn as_logger(&self) -> &Logger {
        match self {
            LoggerRef::Static(l) => l,
            LoggerRef::Owned(l) => l,
        }
    }
}

struct Entry {
    name: String,
    logger: LoggerRef,
}

#[derive(Default)]
struct RegistryState {
    entries: Vec<Entry>,
}

/// The process-wide table of loggers, one entry per name (duplicates are
/// tolerated and reported, see [`Registry::add`]).
pub struct Registry {
    state: Mutex<RegistryState>,
}

impl Default for Registry {
    fn default() -> Registry {
        Registry::new()
    }
}

impl Registry {
    pub fn new() -> Registry {
        Registry {
            state: Mutex::new(RegistryState::default()),
        }
    }

    /// Inserts `logger`. If a logger of the same name already exists, both
    /// are kept (a diagnostic is printed) and [`Registry::get`] on that
    /// name resolves to whichever was added most recently.
    pub fn add(&self, name: impl Into<String>, logger: LoggerRef) {
        let name = name.into();
        let mut state = self.state.lock().expect("registry mutex poisoned");
        if state.entries.iter().any(|e| e.name == name) {
            crate::diag::warn(&format!("duplicate logger name '{}', keeping both", name));
        }
        state.entries.push(Entry { name, logger });
    }

    /// Removes the most recently added entry for `name`, if any.
    pub fn del(&self, name: &str) {
        let mut state = self.state.lock().expect("registry mutex poisoned");
        if let Some(idx) = state.entries.iter().rposition(|e| e.name == name) {
            state.entries.remove(idx);
        }
    }

    /// Returns the most recently added logger named `name`, creating one
    /// at [`Level::Lowest`] (admit everything until reconfigured) if none
    /// exists yet.
    pub fn get(&self, name: &str) -> LoggerRef {
        let mut state = self.state.lock().expect("registry mutex poisoned");
        if let Some(entry) = state.entries.iter().rev().find(|e| e.name == name) {
            return entry.logger.clone();
        }
        let logger = LoggerRef::Owned(Arc::new(Logger::new(name, Level::Lowest)));
        state.entries.push(Entry {
            name: name.to_string(),
            logger: logger.clone(),
        });
        logger
    }

    /// A snapshot of every registered logger, safe to iterate without
    /// holding the registry lock.
    pub fn get_all(&self) -> Vec<LoggerRef> {
        let state = self.state.lock().expect("registry mutex poisoned");
        state.entries.iter().map(|e| e.logger.clone()).collect()
    }

    /// Recomputes and writes the effective level for every registered
    /// logger: the maximum, over `filter_sets`, of that set's
    /// longest-prefix-match threshold for the logger's name (§3).
    pub fn reconfigure(&self, filter_sets: &[&FilterSet]) {
        let state = self.state.lock().expect("registry mutex poisoned");
        for entry in &state.entries {
            let logger = entry.logger.as_logger();
            let effective = filter_sets
                .iter()
                .map(|fs| fs.threshold_for(logger.name()))
                .max()
                .unwrap_or(Level::Off);
            logger.set_level(effective);
        }
    }

    /// Drops all filter configuration: every registered logger's level is
    /// reset to [`Level::Lowest`].
    pub fn reset(&self) {
        let state = self.state.lock().expect("registry mutex poisoned");
        for entry in &state.entries {
            entry.logger.as_logger().set_level(Level::Lowest);
        }
    }
}

impl Clone for LoggerRef {
    fn clone(&self) -> LoggerRef {
        match self {
            LoggerRef::Static(l) => LoggerRef::Static(l),
            LoggerRef::Owned(l) => LoggerRef::Owned(Arc::clone(l)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Filter;

    #[test]
    fn get_creates_at_lowest() {
        let reg = Registry::new();
        let logger = reg.get("app.db");
        assert_eq!(logger.as_logger().level(), Level::Lowest);
    }

    #[test]
    fn get_is_idempotent_by_name() {
        let reg = Registry::new();
        let a = reg.get("app.db");
        let b = reg.get("app.db");
        a.as_logger().set_level(Level::Error);
        assert_eq!(b.as_logger().level(), Level::Error);
    }

    #[test]
    fn reconfigure_takes_max_over_handlers() {
        let reg = Registry::new();
        reg.get("a.b.c");
        let mut fs1 = FilterSet::new();
        fs1.push(Filter::new("", Level::Error));
        let mut fs2 = FilterSet::new();
        fs2.push(Filter::new("a.b", Level::Debug));
        reg.reconfigure(&[&fs1, &fs2]);
        let logger = reg.get("a.b.c");
        assert_eq!(logger.as_logger().level(), Level::Debug);
    }

    #[test]
    fn reset_drops_to_lowest() {
        let reg = Registry::new();
        let logger = reg.get("x");
        logger.as_logger().set_level(Level::Error);
        reg.reset();
        assert_eq!(reg.get("x").as_logger().level(), Level::Lowest);
    }

    #[test]
    fn del_removes_entry() {
        let reg = Registry::new();
        reg.get("x");
        reg.del("x");
        // get() recreates it fresh at Lowest, proving it was actually gone.
        let logger = reg.get("x");
        logger.as_logger().set_level(Level::Error);
        reg.del("x");
        assert_eq!(reg.get("x").as_logger().level(), Level::Lowest);
    }

    #[test]
    fn duplicate_add_keeps_both_last_wins_on_lookup() {
        let reg = Registry::new();
        reg.add("dup", LoggerRef::Owned(Arc::new(Logger::new("dup", Level::Error))));
        reg.add("dup", LoggerRef::Owned(Arc::new(Logger::new("dup", Level::Trace))));
        assert_eq!(reg.get("dup").as_logger().level(), Level::Trace);
        assert_eq!(reg.get_all().iter().filter(|l| l.as_logger().name() == "dup").count(), 2);
    }
}
