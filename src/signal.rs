//! Signal handling: the fixed installation list (§11), the
//! critical/graceful split, and per-thread signal masking used by handler
//! threads during startup (§4.F.1).
//!
//! [`notify`] spawns a dedicated signal-watching thread via
//! `signal_hook::iterator::Signals`, generalized from a fixed
//! `SIGTERM`/`SIGINT` set to whatever signal list the caller passes (here,
//! always [`GRACEFUL_SIGNALS`], since handler threads mask them and only
//! this dedicated thread should observe them).

use libc::{c_int, sigset_t};
use std::mem::MaybeUninit;
use std::thread;

/// One graceful-shutdown request observed by [`notify`]'s watcher thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Term,
    Int,
    Quit,
    Hup,
    Other(c_int),
}

impl From<c_int> for Signal {
    fn from(raw: c_int) -> Signal {
        match raw {
            libc::SIGTERM => Signal::Term,
            libc::SIGINT => Signal::Int,
            libc::SIGQUIT => Signal::Quit,
            libc::SIGHUP => Signal::Hup,
            other => Signal::Other(other),
        }
    }
}

/// Registers a `signal_hook` watcher for `signals` and returns a receiver
/// that yields one [`Signal`] per delivery, observed on a dedicated
/// background thread rather than inside actual signal-handler context.
pub fn notify(signals: &[c_int]) -> crate::error::Result<crossbeam_channel::Receiver<Signal>> {
    let (tx, rx) = crossbeam_channel::bounded(16);
    let watched = signal_hook::iterator::Signals::new(signals)
        .map_err(|e| crate::error::Error::new(crate::error::codes::IO, format!("failed to register signal watcher: {}", e)))?;
    thread::Builder::new()
        .name("log-signal-watcher".into())
        .spawn(move || {
            for raw in watched.forever() {
                if tx.send(Signal::from(raw)).is_err() {
                    break;
                }
            }
        })
        .expect("failed to spawn signal watcher thread");
    Ok(rx)
}

/// Signals that indicate the program has already gone wrong on the
/// faulting thread (segfault, bus error, floating point exception,
/// illegal instruction, abort). These are never masked: they must stay
/// delivered to whichever thread triggered them so a backtrace can be
/// taken there, and the process-wide handler re-raises with the default
/// disposition after logging.
pub const CRITICAL_SIGNALS: &[c_int] = &[
    libc::SIGSEGV,
    libc::SIGBUS,
    libc::SIGFPE,
    libc::SIGILL,
    libc::SIGABRT,
];

/// Signals requesting an orderly shutdown. Handler threads mask these so
/// only the coordinator's dedicated signal thread observes them.
pub const GRACEFUL_SIGNALS: &[c_int] = &[
    libc::SIGTERM,
    libc::SIGINT,
    libc::SIGQUIT,
    libc::SIGHUP,
];

/// The full fixed installation list from §11, in no particular order.
pub fn all_signals() -> Vec<c_int> {
    CRITICAL_SIGNALS.iter().chain(GRACEFUL_SIGNALS.iter()).copied().collect()
}

/// Blocks [`GRACEFUL_SIGNALS`] on the calling thread, leaving
/// [`CRITICAL_SIGNALS`] delivered normally. Every handler thread calls
/// this once at startup, before entering its dispatch loop.
pub fn mask_graceful_signals_on_current_thread() {
    unsafe {
        let mut set: MaybeUninit<sigset_t> = MaybeUninit::uninit();
        libc::sigemptyset(set.as_mut_ptr());
        for &sig in GRACEFUL_SIGNALS {
            libc::sigaddset(set.as_mut_ptr(), sig);
        }
        libc::pthread_sigmask(libc::SIG_BLOCK, set.as_ptr(), std::ptr::null_mut());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn critical_and_graceful_are_disjoint() {
        for sig in CRITICAL_SIGNALS {
            assert!(!GRACEFUL_SIGNALS.contains(sig));
        }
    }

    #[test]
    fn all_signals_matches_the_fixed_list() {
        let mut all = all_signals();
        all.sort_unstable();
        let mut expected = vec![
            libc::SIGTERM,
            libc::SIGINT,
            libc::SIGQUIT,
            libc::SIGHUP,
            libc::SIGSEGV,
            libc::SIGBUS,
            libc::SIGFPE,
            libc::SIGILL,
            libc::SIGABRT,
        ];
        expected.sort_unstable();
        assert_eq!(all, expected);
    }

    #[test]
    fn masking_graceful_signals_does_not_panic() {
        mask_graceful_signals_on_current_thread();
    }
}
