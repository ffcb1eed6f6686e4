//! Handler runtime (§4.F): the OS thread each handler runs in, its
//! startup protocol, dispatch loop, control command handling, and
//! bounded internal-error accounting.

pub mod contract;
pub mod file;
pub mod net;
pub mod null;

use crate::bus::{ControlReply, ControlRequest, HandlerBus, PollEvent};
use crate::error::{codes, Error};
use contract::{HandlerContract, HandlerParam};
use std::collections::HashMap;
use std::thread;
use std::time::Duration;

/// How long the runtime waits for the coordinator's initial `ready?`
/// request before giving up and exiting on its own; a well-behaved
/// coordinator always sends it immediately after spawning the thread.
const READY_WAIT: Duration = Duration::from_secs(30);

/// Distinct internal error codes observed by a handler and their
/// occurrence counts (§4.F.4): bounds the damage from a failing sink
/// without losing which distinct failure modes occurred.
struct ErrorSet {
    by_code: HashMap<i32, (Error, u32)>,
    total_seen: u32,
}

impl ErrorSet {
    fn new() -> ErrorSet {
        ErrorSet {
            by_code: HashMap::new(),
            total_seen: 0,
        }
    }

    /// Returns `true` the first time `err`'s code is observed.
    fn record(&mut self, err: Error) -> bool {
        self.total_seen += 1;
        match self.by_code.get_mut(&err.code()) {
            Some((_, count)) => {
                *count += 1;
                false
            }
            None => {
                self.by_code.insert(err.code(), (err, 1));
                true
            }
        }
    }

    fn into_set_error(self) -> Option<Error> {
        let entries: Vec<(Error, u32)> = self.by_code.into_iter().map(|(_, entry)| entry).collect();
        Error::set(entries)
    }
}

/// Spawns the thread that owns `contract` for its whole lifetime, running
/// the startup protocol, then the dispatch loop, until `exit?` or
/// `ierr_max` forces it out. Returns the handler's final error set (as a
/// single `SET` error carrying each distinct code's occurrence count), if
/// any errors occurred.
pub fn spawn(
    rank: usize,
    mut contract: Box<dyn HandlerContract>,
    param: HandlerParam,
    endpoint: Box<dyn HandlerBus>,
) -> thread::JoinHandle<Option<Error>> {
    thread::Builder::new()
        .name(format!("log-handler-{}", rank))
        .spawn(move || run(rank, contract.as_mut(), &param, endpoint.as_ref()))
        .expect("failed to spawn handler thread")
}

fn run(rank: usize, contract: &mut dyn HandlerContract, param: &HandlerParam, endpoint: &dyn HandlerBus) -> Option<Error> {
    crate::signal::mask_graceful_signals_on_current_thread();

    let init_result = contract.init();

    match endpoint.recv_poll(READY_WAIT) {
        PollEvent::Control(ControlRequest::Ready) => match &init_result {
            Ok(()) => endpoint.reply(ControlReply::Ready { rank }),
            Err(e) => endpoint.reply(ControlReply::ReadyFailed {
                rendered_error: e.render(None).to_string(),
            }),
        },
        _ => {
            crate::diag::warn(&format!("handler {} did not receive a ready? request within {:?}", rank, READY_WAIT));
        }
    }

    if let Err(e) = init_result {
        return Some(e);
    }

    let mut errors = ErrorSet::new();
    let flush_period = param.flush_period();

    loop {
        let exit_now = match endpoint.recv_poll(flush_period) {
            PollEvent::Timeout => {
                if let Err(e) = contract.process_implicit_flush() {
                    note_error(contract, &mut errors, e, param.ierr_max)
                } else {
                    false
                }
            }
            PollEvent::Control(ControlRequest::Flush) => {
                let exit_from_drain = drain_data(endpoint, contract, param, &mut errors);
                let exit_from_flush = match contract.process_explicit_flush() {
                    Err(e) => note_error(contract, &mut errors, e, param.ierr_max),
                    Ok(()) => false,
                };
                endpoint.reply(ControlReply::Flushed);
                exit_from_drain || exit_from_flush
            }
            PollEvent::Control(ControlRequest::Exit) => {
                let _ = drain_data(endpoint, contract, param, &mut errors);
                let _ = contract.process_implicit_flush();
                let _ = contract.process_exit();
                endpoint.reply(ControlReply::Exited);
                true
            }
            PollEvent::Control(ControlRequest::Ready) => false, // already answered at startup
            PollEvent::Data(record) => dispatch_record(contract, param, &mut errors, record),
        };
        if exit_now {
            break;
        }
    }

    errors.into_set_error()
}

/// Drains whatever data is immediately available (best effort), used
/// before an explicit flush or exit so no record is left unseen that was
/// already in flight. Returns whether `ierr_max` was exceeded while
/// draining.
fn drain_data(
    endpoint: &dyn HandlerBus,
    contract: &mut dyn HandlerContract,
    param: &HandlerParam,
    errors: &mut ErrorSet,
) -> bool {
    loop {
        match endpoint.recv_poll(Duration::from_millis(0)) {
            PollEvent::Data(record) => {
                if dispatch_record(contract, param, errors, record) {
                    return true;
                }
            }
            _ => return false,
        }
    }
}

fn dispatch_record(
    contract: &mut dyn HandlerContract,
    param: &HandlerParam,
    errors: &mut ErrorSet,
    record: crate::record::Record,
) -> bool {
    let threshold = param.filters.threshold_for(&record.loggername);
    if !record.header.level.is_admissible_at(threshold) {
        return false;
    }
    if let Err(e) = contract.process_log(&record, &record.filename, &record.funcname, &record.loggername, &record.message) {
        return note_error(contract, errors, e, param.ierr_max);
    }
    false
}

/// Feeds `err` through `process_ierr`, records it in the handler's error
/// set, and decides whether the handler should stop: either
/// `process_ierr` itself asked for `HANDLER_EXIT`, or the set's total
/// occurrence count has exceeded `ierr_max`.
fn note_error(contract: &mut dyn HandlerContract, errors: &mut ErrorSet, err: Error, ierr_max: u32) -> bool {
    let requested_exit = match contract.process_ierr(&err) {
        Err(e) if e.code() == codes::HANDLER_EXIT => true,
        _ => false,
    };
    let first_sight = errors.record(err);
    if first_sight {
        crate::diag::warn("handler observed a new internal error code");
    }
    requested_exit || errors.total_seen > ierr_max
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InProcessBus;
    use crate::filter::FilterSet;
    use crate::level::Level;
    use crate::record::Record;
    use std::time::Duration as StdDuration;

    struct FailingHandler {
        fail_code: i32,
    }

    impl HandlerContract for FailingHandler {
        fn init(&mut self) -> crate::error::Result<()> {
            Ok(())
        }

        fn process_log(
            &mut self,
            _record: &Record,
            _filename: &str,
            _funcname: &str,
            _loggername: &str,
            _message: &str,
        ) -> crate::error::Result<()> {
            Err(Error::new(self.fail_code, "always fails"))
        }
    }

    #[test]
    fn ierr_max_forces_exit_with_set_error() {
        let (bus, mut endpoints) = InProcessBus::uniform(256, 16, 1);
        let endpoint = endpoints.remove(0);
        let param = HandlerParam {
            filters: FilterSet::all_all(),
            data_hwm: 256,
            ctrl_hwm: 16,
            ierr_max: 10,
            flush_freq_ms: 50,
        };
        let handle = spawn(0, Box::new(FailingHandler { fail_code: 42 }), param, Box::new(endpoint));

        bus.control_call(0, ControlRequest::Ready, StdDuration::from_secs(1)).unwrap();

        for i in 0..100u32 {
            let record = Record::new(Level::Output, 1, 1, 0, 0, "f", "g", "app", format!("msg {}", i));
            bus.send_record_blocking(0, record);
        }

        let result = handle.join().unwrap();
        let err = result.expect("handler should have exited with an error");
        assert_eq!(err.code(), codes::SET);
        let counts = err.set_counts().expect("SET error carries per-code counts");
        assert_eq!(counts.len(), 1);
        assert_eq!(counts[0].0, 42);
        assert!(counts[0].1 >= 10);
    }

    #[test]
    fn exit_request_drains_and_joins_cleanly() {
        let (bus, mut endpoints) = InProcessBus::uniform(256, 16, 1);
        let endpoint = endpoints.remove(0);
        let param = HandlerParam {
            filters: FilterSet::all_all(),
            data_hwm: 256,
            ctrl_hwm: 16,
            ierr_max: 10,
            flush_freq_ms: 50,
        };
        let handle = spawn(
            0,
            Box::new(crate::handler::null::NullHandler::new(param.clone())),
            param,
            Box::new(endpoint),
        );

        bus.control_call(0, ControlRequest::Ready, StdDuration::from_secs(1)).unwrap();
        let reply = bus.control_call(0, ControlRequest::Exit, StdDuration::from_secs(1)).unwrap();
        assert_eq!(reply, ControlReply::Exited);
        assert!(handle.join().unwrap().is_none());
    }
}
