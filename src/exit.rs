//! Log-then-exit glue (§11): a last-resort helper for call sites that
//! have decided the process cannot continue, grounded in `BXIEXIT()`'s
//! "render, flush, then `exit()`" sequence.

use crate::error::Error;
use crate::level::Level;
use crate::registry::Logger;
use std::thread;
use std::time::Duration;

/// Short grace period between the final flush request and the actual
/// `exit()`, giving handler threads a chance to drain what they already
/// have before the process disappears out from under them.
const EXIT_GRACE_PERIOD: Duration = Duration::from_millis(50);

/// Renders `err` at `level` through `logger`, flushes every handler, and
/// calls `std::process::exit(code)`. Never returns.
pub fn log_and_exit(logger: &Logger, level: Level, err: &Error, code: i32) -> ! {
    err.report(logger, level);
    let _ = crate::coordinator::global().flush();
    thread::sleep(EXIT_GRACE_PERIOD);
    std::process::exit(code);
}
