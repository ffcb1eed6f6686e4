//! Producer endpoint: the thread-local state every business thread uses
//! to format and send records (§4.E).
//!
//! Created lazily on first use and torn down on thread exit via the
//! thread-local's own drop, rather than any free-on-key-delete callback
//! (§9, "Thread-local endpoints").

use crate::bus::RecordBus;
use crate::config::Config;
use crate::level::Level;
use crate::record::Record;
use crate::registry::Logger;
use std::cell::RefCell;
use std::fmt;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

static NEXT_THREAD_RANK: AtomicU64 = AtomicU64::new(0);

thread_local! {
    static ENDPOINT: RefCell<Endpoint> = RefCell::new(Endpoint::new());
    static THREAD_RANK_OVERRIDE: std::cell::Cell<Option<u64>> = std::cell::Cell::new(None);
}

/// Overrides this thread's synthetic rank, in place of the default opaque
/// counter value. Must be called before the first log call on this
/// thread to take effect.
pub fn set_thread_rank(rank: u64) {
    THREAD_RANK_OVERRIDE.with(|cell| cell.set(Some(rank)));
}

fn current_tid() -> u32 {
    #[cfg(target_os = "linux")]
    {
        unsafe { libc::syscall(libc::SYS_gettid) as u32 }
    }
    #[cfg(not(target_os = "linux"))]
    {
        0
    }
}

fn thread_rank() -> u64 {
    THREAD_RANK_OVERRIDE.with(|cell| match cell.get() {
        Some(r) => r,
        None => {
            let r = NEXT_THREAD_RANK.fetch_add(1, Ordering::Relaxed);
            cell.set(Some(r));
            r
        }
    })
}

struct Endpoint {
    pid: u32,
    tid: u32,
    rank: u64,
    buf: String,
    initial_capacity: usize,
    oversize_count: u64,
}

impl Endpoint {
    fn new() -> Endpoint {
        let capacity = crate::coordinator::global()
            .config_snapshot()
            .map(|c| c.tsd_log_buf_size)
            .unwrap_or(crate::config::DEFAULT_TSD_LOG_BUF_SIZE);
        Endpoint {
            pid: std::process::id(),
            tid: current_tid(),
            rank: thread_rank(),
            buf: String::with_capacity(capacity),
            initial_capacity: capacity,
            oversize_count: 0,
        }
    }

    /// Number of times this endpoint's buffer had to grow past its
    /// initial capacity. Exposed for tests and diagnostics.
    pub fn oversize_count(&self) -> u64 {
        self.oversize_count
    }
}

/// Formats `args` and logs the result, mirroring `log()`'s fast path
/// (§4.E): format into the thread-local buffer, falling back to a
/// one-off exactly-sized allocation (and bumping the endpoint's oversize
/// counter) when the buffer had to grow.
pub fn log(logger: &Logger, level: Level, file: &str, func: &str, line: u32, args: fmt::Arguments) {
    let message = ENDPOINT.with(|cell| {
        let mut endpoint = cell.borrow_mut();
        endpoint.buf.clear();
        let _ = endpoint.buf.write_fmt(args);
        if endpoint.buf.capacity() > endpoint.initial_capacity {
            endpoint.oversize_count += 1;
            endpoint.buf.shrink_to_fit();
        }
        endpoint.buf.clone()
    });
    log_rawstr(logger, level, file, func, line, message);
}

/// Logs `message` verbatim, skipping formatting entirely — used when the
/// caller already has the literal string (e.g. bridging from another
/// logging system).
pub fn log_rawstr(logger: &Logger, level: Level, file: &str, func: &str, line: u32, message: String) {
    let running = match crate::coordinator::global().running() {
        Some(r) => r,
        None => return, // outside INITIALIZED: silently dropped (§4.H)
    };

    let filename = Record::basename(file).to_string();
    let (pid, tid, rank) = ENDPOINT.with(|cell| {
        let endpoint = cell.borrow();
        (endpoint.pid, endpoint.tid, endpoint.rank)
    });

    let record = Record::new(level, pid, tid, rank, line, filename, func, logger.name(), message);
    send_to_all_handlers(&running.bus, record, &running.config);
}

fn send_to_all_handlers(bus: &Arc<dyn RecordBus>, record: Record, config: &Config) {
    let count = bus.handler_count();
    for handler in 0..count {
        let record_for_handler = record.clone();
        send_with_retry(bus, handler, record_for_handler, config.retries_max, config.retry_delay());
    }
}

fn send_with_retry(bus: &Arc<dyn RecordBus>, handler: usize, mut record: Record, retries_max: u32, retry_delay: Duration) {
    for _ in 0..retries_max {
        match bus.try_send_record(handler, record) {
            Ok(()) => return,
            Err(returned) => {
                record = returned;
                thread::sleep(retry_delay);
            }
        }
    }
    bus.send_record_blocking(handler, record);
}

#[cfg(test)]
pub(crate) fn oversize_count_for_current_thread() -> u64 {
    ENDPOINT.with(|cell| cell.borrow().oversize_count())
}
