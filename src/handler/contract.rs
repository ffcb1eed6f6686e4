//! The handler contract (§4.G): the callbacks a concrete handler
//! implements, plus [`HandlerParam`], the base struct every concrete
//! handler's own parameter type embeds (§11's replacement for the
//! original's `param_new` varargs).

use crate::error::{Error, Result};
use crate::filter::FilterSet;
use crate::record::Record;
use std::time::Duration;

/// Shared per-handler configuration, common to every concrete handler.
/// Concrete handlers embed this as a field (e.g.
/// `FileHandler { base: HandlerParam, .. }`) rather than receiving it
/// through variadic construction.
#[derive(Debug, Clone)]
pub struct HandlerParam {
    pub filters: FilterSet,
    pub data_hwm: usize,
    pub ctrl_hwm: usize,
    pub ierr_max: u32,
    pub flush_freq_ms: u64,
}

impl HandlerParam {
    pub fn from_config(cfg: &crate::config::HandlerConfig) -> HandlerParam {
        HandlerParam {
            filters: cfg.filter_set.clone(),
            data_hwm: cfg.data_hwm,
            ctrl_hwm: cfg.ctrl_hwm,
            ierr_max: cfg.ierr_max,
            flush_freq_ms: cfg.flush_freq_ms,
        }
    }

    pub fn flush_period(&self) -> Duration {
        Duration::from_millis(self.flush_freq_ms)
    }
}

/// The callbacks a concrete handler implements. Object-safe (no generic
/// `Param` type): a concrete handler's own struct doubles as its
/// parameter block, which the handler runtime (§4.F) owns exclusively
/// after startup and drives through a `Box<dyn HandlerContract>`.
pub trait HandlerContract: Send {
    /// Opens sinks, allocates buffers. Called once, before the handler
    /// replies `ready!`.
    fn init(&mut self) -> Result<()>;

    /// Emits one record. The handler is responsible for splitting a
    /// multi-line message across per-line output if its sink format
    /// requires it.
    #[allow(clippy::too_many_arguments)]
    fn process_log(
        &mut self,
        record: &Record,
        filename: &str,
        funcname: &str,
        loggername: &str,
        message: &str,
    ) -> Result<()>;

    /// Called once per distinct internal error observed by the runtime
    /// (§4.F.4). May return an error whose code is
    /// [`crate::error::codes::HANDLER_EXIT`] to request teardown.
    fn process_ierr(&mut self, err: &Error) -> Result<()> {
        let _ = err;
        Ok(())
    }

    /// Periodic flush, invoked when the dispatch loop's poll times out.
    fn process_implicit_flush(&mut self) -> Result<()> {
        Ok(())
    }

    /// On-demand flush, invoked by a `flush?` control request.
    fn process_explicit_flush(&mut self) -> Result<()> {
        self.process_implicit_flush()
    }

    /// Finalizes sinks; called once, while draining on `exit?`.
    fn process_exit(&mut self) -> Result<()> {
        Ok(())
    }
}
