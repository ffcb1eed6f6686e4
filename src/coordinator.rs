//! Lifecycle coordinator (§4.H): the single process-wide FSM that starts,
//! flushes, and stops the logging system, holds the global transport
//! context, and owns the table of handler thread handles.
//!
//! As in `dqcsim`'s `Simulator::try_from`, which spawns its `LogThread`
//! then brings up the rest of the simulation before returning a value the
//! caller can drive, `init()` here spawns every handler thread, then
//! synchronizes with each before declaring the system `Initialized`.

use crate::bus::{ControlRequest, ControlReply, InProcessBus, RecordBus};
use crate::config::Config;
use crate::error::{codes, Error, Result};
use crate::handler::contract::{HandlerContract, HandlerParam};
use crate::registry::Registry;
use lazy_static::lazy_static;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

/// Bounded wait for a single handler's control reply, guarding against a
/// deadlocked handler (§5).
const HANDLER_CALL_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Unset,
    Initializing,
    Initialized,
    Broken,
    Finalizing,
    Finalized,
    Illegal,
    Forked,
}

/// Everything a producer needs once the system is `Initialized`: the bus
/// and a snapshot of the active configuration.
pub struct RunningState {
    pub bus: Arc<dyn RecordBus>,
    pub config: Config,
}

/// One handler the coordinator is responsible for: its thread and the
/// parameters it was started with, kept around so `init` can restart it
/// after a fork.
struct HandlerSlot {
    join: Option<JoinHandle<Option<Error>>>,
}

struct Inner {
    state: State,
    config: Option<Config>,
    running: Option<Arc<RunningState>>,
    handlers: Vec<HandlerSlot>,
}

impl Inner {
    fn new() -> Inner {
        Inner {
            state: State::Unset,
            config: None,
            running: None,
            handlers: Vec::new(),
        }
    }
}

/// A handler to start, bundling its contract implementation with the
/// shared parameter fields the runtime (§4.F) needs.
pub struct HandlerSpec {
    pub contract: Box<dyn HandlerContract>,
    pub param: HandlerParam,
}

pub struct Coordinator {
    inner: Mutex<Inner>,
    registry: Registry,
}

lazy_static! {
    static ref COORDINATOR: Coordinator = Coordinator::new();
}

/// The process-wide coordinator singleton.
pub fn global() -> &'static Coordinator {
    &COORDINATOR
}

impl Coordinator {
    fn new() -> Coordinator {
        Coordinator {
            inner: Mutex::new(Inner::new()),
            registry: Registry::new(),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn state(&self) -> State {
        self.inner.lock().expect("coordinator mutex poisoned").state
    }

    /// The snapshot producers consult before formatting: `None` outside
    /// `Initialized`, in which case a log call is silently dropped.
    pub fn running(&self) -> Option<Arc<RunningState>> {
        self.inner.lock().expect("coordinator mutex poisoned").running.clone()
    }

    /// Last configuration passed to `init`, regardless of current state —
    /// used only to size a producer endpoint's format buffer before the
    /// system has necessarily started.
    pub fn config_snapshot(&self) -> Option<Config> {
        self.inner.lock().expect("coordinator mutex poisoned").config.clone()
    }

    /// Brings the system up: spawns one thread per `handlers` entry,
    /// synchronizes with each via `ready?`, and reconfigures the registry
    /// from the union of their filter sets.
    pub fn init(&self, config: Config, handlers: Vec<HandlerSpec>) -> Result<()> {
        {
            let mut inner = self.inner.lock().expect("coordinator mutex poisoned");
            match inner.state {
                State::Unset | State::Finalized => inner.state = State::Initializing,
                _ => return Err(Error::new(codes::ILLEGAL_STATE, "init() called outside Unset/Finalized")),
            }
        }

        let hwms: Vec<(usize, usize)> = handlers.iter().map(|h| (h.param.data_hwm, h.param.ctrl_hwm)).collect();
        let (bus, endpoints) = InProcessBus::new(&hwms);
        let bus: Arc<dyn RecordBus> = Arc::new(bus);

        let mut slots = Vec::with_capacity(handlers.len());
        let mut filter_sets_owned = Vec::with_capacity(handlers.len());
        for (rank, (spec, endpoint)) in handlers.into_iter().zip(endpoints.into_iter()).enumerate() {
            filter_sets_owned.push(spec.param.filters.clone());
            let join = crate::handler::spawn(rank, spec.contract, spec.param, Box::new(endpoint));
            slots.push(HandlerSlot { join: Some(join) });
        }

        if let Err(e) = self.synchronize_ready(bus.as_ref(), slots.len()) {
            let mut inner = self.inner.lock().expect("coordinator mutex poisoned");
            inner.state = State::Broken;
            inner.handlers = slots;
            return Err(e);
        }

        let filter_refs: Vec<&crate::filter::FilterSet> = filter_sets_owned.iter().collect();
        self.registry.reconfigure(&filter_refs);

        let mut inner = self.inner.lock().expect("coordinator mutex poisoned");
        inner.running = Some(Arc::new(RunningState {
            bus,
            config: config.clone(),
        }));
        inner.config = Some(config);
        inner.handlers = slots;
        inner.state = State::Initialized;
        Ok(())
    }

    fn synchronize_ready(&self, bus: &dyn RecordBus, handler_count: usize) -> Result<()> {
        for rank in 0..handler_count {
            match bus.control_call(rank, ControlRequest::Ready, HANDLER_CALL_TIMEOUT)? {
                ControlReply::Ready { .. } => {}
                ControlReply::ReadyFailed { rendered_error } => {
                    return Err(Error::new(
                        codes::ILLEGAL_STATE,
                        format!("handler {} failed to initialize: {}", rank, rendered_error),
                    ));
                }
                _ => {
                    return Err(Error::new(codes::PROTOCOL, format!("handler {} sent an unexpected ready reply", rank)));
                }
            }
        }
        Ok(())
    }

    /// Fans `flush?` out to every handler, collecting per-handler failures
    /// into a single `GROUP` error.
    pub fn flush(&self) -> Result<()> {
        let running = self.require_running()?;
        let mut failures = Vec::new();
        for rank in 0..running.bus.handler_count() {
            match running.bus.control_call(rank, ControlRequest::Flush, HANDLER_CALL_TIMEOUT) {
                Ok(ControlReply::Flushed) => {}
                Ok(_) => failures.push(Error::new(codes::PROTOCOL, format!("handler {} sent an unexpected flush reply", rank))),
                Err(e) => failures.push(e),
            }
        }
        match Error::group(failures) {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }

    /// Tears the system down: `exit?` to every live handler, join each,
    /// free resources.
    pub fn finalize(&self) -> Result<()> {
        let mut inner = self.inner.lock().expect("coordinator mutex poisoned");
        match inner.state {
            State::Initialized | State::Broken => inner.state = State::Finalizing,
            _ => return Err(Error::new(codes::ILLEGAL_STATE, "finalize() called outside Initialized/Broken")),
        }
        let running = inner.running.take();
        let mut slots = std::mem::take(&mut inner.handlers);
        drop(inner);

        let mut failures = Vec::new();
        if let Some(running) = &running {
            for rank in 0..running.bus.handler_count() {
                match running.bus.control_call(rank, ControlRequest::Exit, HANDLER_CALL_TIMEOUT) {
                    Ok(ControlReply::Exited) => {}
                    Ok(_) => failures.push(Error::new(codes::PROTOCOL, format!("handler {} sent an unexpected exit reply", rank))),
                    Err(e) => failures.push(e),
                }
            }
        }
        for slot in &mut slots {
            if let Some(join) = slot.join.take() {
                if let Ok(Some(err)) = join.join() {
                    failures.push(err);
                }
            }
        }

        let mut inner = self.inner.lock().expect("coordinator mutex poisoned");
        inner.state = State::Finalized;
        inner.handlers = Vec::new();
        drop(inner);

        match Error::group(failures) {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }

    fn require_running(&self) -> Result<Arc<RunningState>> {
        self.running().ok_or_else(|| Error::new(codes::ILLEGAL_STATE, "operation requires the Initialized state"))
    }

    /// Pre-fork hook, called in the parent while `Initialized`: flushes
    /// and finalizes so the child inherits no handler threads, then marks
    /// the coordinator `Forked`.
    pub fn pre_fork(&self) -> Result<()> {
        if self.state() != State::Initialized {
            return Err(Error::new(codes::ILLEGAL_STATE, "pre_fork called outside Initialized"));
        }
        let _ = self.flush();
        self.finalize()?;
        self.inner.lock().expect("coordinator mutex poisoned").state = State::Forked;
        Ok(())
    }

    /// Post-fork hook for the parent: re-initializes with the same
    /// configuration it finalized with in `pre_fork`.
    pub fn post_fork_parent(&self, handlers: Vec<HandlerSpec>) -> Result<()> {
        let config = self.config_snapshot().unwrap_or_default();
        self.init(config, handlers)
    }

    /// Post-fork hook for the child: the child inherits no handler
    /// threads (they do not survive `fork()`), so it is simply marked
    /// `Finalized`; it must call `init` again to log.
    pub fn post_fork_child(&self) {
        let mut inner = self.inner.lock().expect("coordinator mutex poisoned");
        inner.running = None;
        inner.handlers = Vec::new();
        inner.state = State::Finalized;
    }
}

/// Installs a background watcher (§11) that finalizes the process-wide
/// coordinator on the first [`crate::signal::GRACEFUL_SIGNALS`] delivery.
/// Optional: a caller embedding this crate in a larger signal-handling
/// scheme (as `dqcsim`'s `Simulator` does its own) can ignore this and
/// drive `finalize()` from its own watcher instead.
pub fn install_default_signal_handler() -> Result<()> {
    let rx = crate::signal::notify(crate::signal::GRACEFUL_SIGNALS)?;
    std::thread::Builder::new()
        .name("log-shutdown-on-signal".into())
        .spawn(move || {
            if rx.recv().is_ok() {
                let _ = global().finalize();
            }
        })
        .expect("failed to spawn shutdown-on-signal thread");
    Ok(())
}
