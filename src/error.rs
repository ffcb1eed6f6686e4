//! Rich, chained error value.
//!
//! Every fallible internal interface in this crate returns
//! [`Result<T>`](Result), whose error side is [`Error`]: a single owned
//! value that can carry an arbitrary caller-chosen `code`, an optional
//! opaque [`ErrorData`] payload, a captured backtrace, and an optional
//! chained `cause`.
//!
//! This mirrors the chained-`Fail`-over-`Context` idiom used elsewhere in
//! this codebase (see `error.rs` / `common/error.rs` in the sibling
//! simulator crate), but adds the explicit chain/depth/self-cycle-guard
//! operations this crate's handler and coordinator plumbing depend on,
//! which a bare `failure::Context` does not give for free.

use failure::{Backtrace, Fail};
use std::fmt;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};

/// Well-known `code` values for errors raised by this crate itself.
///
/// User code and concrete handlers are free to use any other `i32`; these
/// are reserved only so the runtime can recognize its own control-flow
/// errors (notably [`codes::HANDLER_EXIT`]) without string matching.
pub mod codes {
    pub const GENERIC: i32 = 1;
    pub const GROUP: i32 = 2;
    pub const SET: i32 = 3;
    pub const ASSERT: i32 = 4;
    pub const UNREACHABLE: i32 = 5;
    /// Internal control-flow signal: a handler thread should exit its
    /// dispatch loop. Never surfaced to business code.
    pub const HANDLER_EXIT: i32 = 6;
    pub const ILLEGAL_STATE: i32 = 7;
    pub const PROTOCOL: i32 = 8;
    pub const MISSING_FRAME: i32 = 9;
    pub const RETRIES_EXHAUSTED: i32 = 10;
    pub const TIMEOUT: i32 = 11;
    pub const BAD_LEVEL: i32 = 12;
    pub const IO: i32 = 13;
    pub const CHANNEL: i32 = 14;
}

/// Crate-local `Result`, as in the sibling crates' `error::Result`.
pub type Result<T> = std::result::Result<T, Error>;

/// An opaque payload attached to an [`Error`] via [`Error::with_data`]:
/// `Drop` handles cleanup, and `render` supplies the one-line text
/// appended to a report.
pub trait ErrorData: fmt::Debug + Send + Sync {
    /// One-line rendering of the payload, appended to the error's report
    /// line when non-empty. Default: no extra rendering.
    fn render(&self) -> String {
        String::new()
    }

    /// Downcast support for payloads that need to be recovered by concrete
    /// type, e.g. [`Error::set_counts`].
    fn as_any(&self) -> &dyn std::any::Any;
}

static NEXT_ERROR_ID: AtomicU64 = AtomicU64::new(1);

/// A single error value, possibly chained to a `cause`.
///
/// There is no `OK` sentinel value: the absence of an error is represented
/// by `None` in an `Option<Error>` (or by `Ok(_)` in a `Result<T>`).
#[derive(Debug)]
pub struct Error {
    id: u64,
    code: i32,
    message: String,
    data: Option<Box<dyn ErrorData>>,
    cause: Option<Box<Error>>,
    /// Cached pointer to the current deepest link of the chain rooted at
    /// `self`, kept up to date by [`Error::append_cause`] so that chaining
    /// a new cause onto an arbitrarily long existing chain is O(1) rather
    /// than requiring a walk to the tail.
    ///
    /// `None` means "the tail is `self`" (no cause yet). Once set, it
    /// always points at a live `Error` owned transitively through
    /// `self.cause`; moving a `Box<Error>` relocates only the pointer, not
    /// the heap-allocated pointee, so the cached pointer survives `self`
    /// (or any of its ancestors) being moved.
    last_cause: Option<NonNull<Error>>,
    backtrace: Backtrace,
    /// Statically-declared errors (built with [`Error::static_error`]) are
    /// never chained into and are conceptually immortal; `append_cause` is
    /// a documented no-op on them.
    allocated: bool,
}

// `NonNull<Error>` makes the struct `!Send`/`!Sync` by default; the pointer
// only ever refers to heap state we exclusively own through `cause`, so
// asserting these back is sound as long as no alias ever escapes `Error`
// itself (it doesn't: `last_cause` is private and never read or written
// except by `append_cause`/`drop`).
unsafe impl Send for Error {}
unsafe impl Sync for Error {}

impl Error {
    fn new_inner(code: i32, message: String, data: Option<Box<dyn ErrorData>>) -> Error {
        Error {
            id: NEXT_ERROR_ID.fetch_add(1, Ordering::Relaxed),
            code,
            message,
            data,
            cause: None,
            last_cause: None,
            backtrace: Backtrace::new(),
            allocated: true,
        }
    }

    /// Creates a new, causeless error with the given `code` and message,
    /// capturing a backtrace immediately.
    pub fn new(code: i32, message: impl Into<String>) -> Error {
        Error::new_inner(code, message.into(), None)
    }

    /// Attaches an opaque data payload, replacing any previous one.
    pub fn with_data(mut self, data: impl ErrorData + 'static) -> Error {
        self.data = Some(Box::new(data));
        self
    }

    /// Builds an error from the last OS error (`errno`): `code` is the
    /// raw OS error code, and the message is suffixed with the OS's own
    /// rendering of it.
    pub fn from_errno(context: impl Into<String>) -> Error {
        let io_err = std::io::Error::last_os_error();
        let code = io_err.raw_os_error().unwrap_or(-1);
        Error::new(code, format!("{}: {}", context.into(), io_err))
    }

    /// Builds an error by indexing into a caller-supplied message table;
    /// `idx` is also used as the error code.
    pub fn from_idx(idx: usize, table: &[&str], context: impl Into<String>) -> Error {
        let base = table.get(idx).copied().unwrap_or("<unknown error index>");
        Error::new(idx as i32, format!("{}: {}", context.into(), base))
    }

    /// A statically-declared error: conceptually immortal, and
    /// [`append_cause`](Error::append_cause) refuses to chain anything
    /// into it. Intended for `const`/`lazy_static!` sentinels declared at
    /// call sites.
    pub fn static_error(code: i32, message: impl Into<String>) -> Error {
        let mut err = Error::new_inner(code, message.into(), None);
        err.allocated = false;
        err
    }

    pub fn code(&self) -> i32 {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn data(&self) -> Option<&(dyn ErrorData)> {
        self.data.as_deref()
    }

    pub fn cause(&self) -> Option<&Error> {
        self.cause.as_deref()
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    /// Number of links in the chain rooted at `self` (always ≥ 1).
    pub fn depth(&self) -> usize {
        1 + self.cause.as_ref().map_or(0, |c| c.depth())
    }

    /// Appends `top` under the tail of `self`'s chain in O(1), using the
    /// cached `last_cause` pointer.
    ///
    /// No-op (with a diagnostic to stderr) when `self` is statically
    /// declared: such errors must never acquire a cause.
    fn append_cause(&mut self, top: Error) {
        if !self.allocated {
            crate::diag::bug(&format!(
                "refusing to chain a cause into statically-declared error {:?}",
                self.message
            ));
            return;
        }
        // `top`'s own tail (if it is itself a multi-link chain) must become
        // the new cached tail, not `top`'s head — otherwise a later
        // `chain()` onto `self` would walk to a node whose `cause` is
        // already `Some`, tripping the tail invariant below.
        let top_tail = top.last_cause;
        match self.last_cause {
            None => {
                let mut boxed = Box::new(top);
                let head_ptr = NonNull::new(boxed.as_mut() as *mut Error).expect("Box is never null");
                self.cause = Some(boxed);
                self.last_cause = Some(top_tail.unwrap_or(head_ptr));
            }
            Some(tail_ptr) => {
                // SAFETY: `tail_ptr` was derived from a `Box<Error>` that
                // is still owned transitively through `self.cause` (no
                // intermediate link is ever replaced or freed once
                // chained), and it has no cause of its own yet, by the
                // invariant that `last_cause` always caches the current
                // tail.
                let tail: &mut Error = unsafe { &mut *tail_ptr.as_ptr() };
                debug_assert!(tail.cause.is_none());
                let mut boxed = Box::new(top);
                let head_ptr = NonNull::new(boxed.as_mut() as *mut Error).expect("Box is never null");
                tail.cause = Some(boxed);
                self.last_cause = Some(top_tail.unwrap_or(head_ptr));
            }
        }
    }

    /// Renders this error's chain as a human-readable [`Report`] (see
    /// [`crate::report`]), walking at most `max_depth` links (`None` for
    /// unbounded).
    pub fn render(&self, max_depth: Option<usize>) -> crate::report::Report {
        crate::report::Report::render(self, max_depth)
    }

    /// Wraps several independently-failed errors (e.g. one per handler)
    /// into a single `GROUP` error, as `flush()`/`finalize()` do when more
    /// than one handler fails.
    pub fn group(errors: Vec<Error>) -> Option<Error> {
        if errors.is_empty() {
            return None;
        }
        if errors.len() == 1 {
            return errors.into_iter().next();
        }
        let message = format!("{} of {} operations failed", errors.len(), errors.len());
        let mut err = Error::new(codes::GROUP, message).with_data(GroupData { errors });
        err.allocated = true;
        Some(err)
    }

    /// Wraps a handler's distinct internal error codes, each carrying its
    /// occurrence count, into a single `SET` error. Unlike [`Error::group`]
    /// this never collapses to a bare inner error: even a single distinct
    /// code keeps its count, since that count is the whole point of a
    /// `SET` (`None` only when `entries` is empty).
    pub fn set(entries: Vec<(Error, u32)>) -> Option<Error> {
        if entries.is_empty() {
            return None;
        }
        let total: u32 = entries.iter().map(|(_, count)| count).sum();
        let message = format!("{} distinct error code(s), {} occurrence(s) total", entries.len(), total);
        let mut err = Error::new(codes::SET, message).with_data(SetData { entries });
        err.allocated = true;
        Some(err)
    }

    /// If this error was built by [`Error::set`], the `(code, count)` pair
    /// for each distinct error it carries; `None` otherwise.
    pub fn set_counts(&self) -> Option<Vec<(i32, u32)>> {
        let data = self.data()?.as_any().downcast_ref::<SetData>()?;
        Some(data.entries.iter().map(|(e, count)| (e.code(), *count)).collect())
    }
}

#[derive(Debug)]
struct GroupData {
    errors: Vec<Error>,
}

impl ErrorData for GroupData {
    fn render(&self) -> String {
        self.errors
            .iter()
            .map(|e| format!("- {}", e.message()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[derive(Debug)]
struct SetData {
    entries: Vec<(Error, u32)>,
}

impl ErrorData for SetData {
    fn render(&self) -> String {
        self.entries
            .iter()
            .map(|(e, count)| format!("- [{}] {} (count={})", e.code(), e.message(), count))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// Appends `top` under `new`'s chain and returns the result, or passes
/// through whichever side is present when the other is `None`.
///
/// Detects `top` and `new` being the very same error (by identity, not
/// value) and, rather than looping, logs a self-diagnostic to stderr and
/// discards the duplicate.
pub fn chain(top: Option<Error>, new: Option<Error>) -> Option<Error> {
    match (top, new) {
        (None, None) => None,
        (Some(t), None) => Some(t),
        (None, Some(n)) => Some(n),
        (Some(top), Some(mut new)) => {
            if top.id == new.id {
                crate::diag::bug(&format!("attempted to chain an error under itself ({})", new.message));
                return Some(new);
            }
            new.append_cause(top);
            Some(new)
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl Fail for Error {
    fn cause(&self) -> Option<&dyn Fail> {
        self.cause.as_ref().map(|c| c.as_ref() as &dyn Fail)
    }

    fn backtrace(&self) -> Option<&Backtrace> {
        Some(&self.backtrace)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Error {
        Error::new(codes::IO, e.to_string())
    }
}

impl<T> From<crossbeam_channel::SendError<T>> for Error {
    fn from(e: crossbeam_channel::SendError<T>) -> Error {
        Error::new(codes::CHANNEL, e.to_string())
    }
}

impl From<crossbeam_channel::RecvError> for Error {
    fn from(e: crossbeam_channel::RecvError) -> Error {
        Error::new(codes::CHANNEL, e.to_string())
    }
}

impl<T> From<crossbeam_channel::TrySendError<T>> for Error {
    fn from(e: crossbeam_channel::TrySendError<T>) -> Error {
        Error::new(codes::CHANNEL, e.to_string())
    }
}

impl From<crate::level::BadLevelError> for Error {
    fn from(e: crate::level::BadLevelError) -> Error {
        Error::new(codes::BAD_LEVEL, e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_of_causeless_error_is_one() {
        let e = Error::new(codes::GENERIC, "boom");
        assert_eq!(e.depth(), 1);
    }

    #[test]
    fn chain_sums_depths() {
        let top = Error::new(codes::GENERIC, "root cause");
        let new = Error::new(codes::GENERIC, "wrapper");
        let top_depth = top.depth();
        let new_depth = new.depth();
        let chained = chain(Some(top), Some(new)).unwrap();
        assert_eq!(chained.depth(), top_depth + new_depth);
    }

    #[test]
    fn chain_with_ok_passes_through() {
        let e = Error::new(codes::GENERIC, "only one");
        assert!(chain(None, None).is_none());
        let r = chain(Some(Error::new(codes::GENERIC, "t")), None).unwrap();
        assert_eq!(r.message(), "t");
        let r = chain(None, Some(e)).unwrap();
        assert_eq!(r.message(), "only one");
    }

    #[test]
    fn long_chain_append_is_order_preserving() {
        let mut top: Option<Error> = None;
        for i in 0..50 {
            top = Some(Error::new(i, format!("e{}", i)));
            if i > 0 {
                // no-op; chain below does the work
            }
        }
        // Build a 3-link chain explicitly and check traversal order.
        let a = Error::new(1, "a");
        let b = Error::new(2, "b");
        let c = Error::new(3, "c");
        let ab = chain(Some(a), Some(b)).unwrap(); // b -> a
        let abc = chain(Some(ab), Some(c)).unwrap(); // c -> b -> a
        assert_eq!(abc.depth(), 3);
        assert_eq!(abc.message(), "c");
        assert_eq!(abc.cause().unwrap().message(), "b");
        assert_eq!(abc.cause().unwrap().cause().unwrap().message(), "a");
        let _ = top.take();
    }

    #[test]
    fn append_onto_multi_link_chain_keeps_tail_cache_accurate() {
        let a = Error::new(1, "a");
        let b = Error::new(2, "b");
        let ab = chain(Some(a), Some(b)).unwrap(); // b -> a, a multi-link chain
        let wrapper = Error::new(3, "wrapper");
        // Appending a multi-link chain onto a fresh error must cache the
        // appended chain's own tail ("a"), not its head ("b"): if the
        // cache pointed at "b", the next append below would target a node
        // whose `cause` is already `Some`.
        let chained = chain(Some(ab), Some(wrapper)).unwrap(); // wrapper -> b -> a

        let extra = Error::new(4, "extra");
        let result = chain(Some(extra), Some(chained)).unwrap(); // wrapper -> b -> a -> extra

        assert_eq!(result.depth(), 4);
        assert_eq!(result.message(), "wrapper");
        let c1 = result.cause().unwrap();
        assert_eq!(c1.message(), "b");
        let c2 = c1.cause().unwrap();
        assert_eq!(c2.message(), "a");
        let c3 = c2.cause().unwrap();
        assert_eq!(c3.message(), "extra");
    }

    #[test]
    fn self_chain_is_detected_without_looping() {
        let e = Error::new(codes::GENERIC, "dup");
        let id = e.id;
        // Simulate "same identity" by constructing a clone-like value with
        // the same id for the purposes of this test.
        let mut other = Error::new(codes::GENERIC, "dup");
        other.id = id;
        let result = chain(Some(e), Some(other)).unwrap();
        assert_eq!(result.depth(), 1);
    }

    #[test]
    fn static_error_refuses_cause() {
        let mut s = Error::static_error(codes::GENERIC, "static");
        s.append_cause(Error::new(codes::GENERIC, "should not attach"));
        assert_eq!(s.depth(), 1);
    }

    #[test]
    fn group_of_one_is_identity() {
        let only = Error::new(codes::GENERIC, "solo");
        let grouped = Error::group(vec![only]).unwrap();
        assert_eq!(grouped.message(), "solo");
    }

    #[test]
    fn group_of_many_reports_count() {
        let errs = vec![
            Error::new(1, "a"),
            Error::new(2, "b"),
            Error::new(3, "c"),
        ];
        let grouped = Error::group(errs).unwrap();
        assert_eq!(grouped.code(), codes::GROUP);
    }
}
