//! The record bus: the one boundary between the producer/coordinator
//! side and the handler side, abstracted behind a trait so that an
//! in-process `crossbeam-channel` transport (used here, and in tests) and
//! a real message-transport implementation can both sit underneath the
//! same `send_record`/`control_call`/`recv_poll` triad without either
//! leaking into §4's component design.

use crate::error::{codes, Error, Result};
use crate::record::Record;
use crossbeam_channel::{bounded, select, Receiver, Sender};
use std::time::Duration;

/// A request sent from the coordinator to one handler's control endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlRequest {
    Ready,
    Flush,
    Exit,
}

/// A handler's reply to a [`ControlRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlReply {
    Ready { rank: usize },
    ReadyFailed { rendered_error: String },
    Flushed,
    Exited,
}

/// What a handler's dispatch loop observed on one wake from
/// [`HandlerBus::recv_poll`].
pub enum PollEvent {
    /// The deadline elapsed with neither endpoint having anything.
    Timeout,
    Control(ControlRequest),
    Data(Record),
}

/// The coordinator/producer-facing half of one handler's channel pair.
pub trait RecordBus: Send + Sync {
    /// Non-blocking attempt to hand `record` to handler `handler`. Returns
    /// the record back on failure (full channel) so the caller can retry
    /// or escalate to a blocking send.
    fn try_send_record(&self, handler: usize, record: Record) -> std::result::Result<(), Record>;

    /// Blocking send, used once the caller's retry budget is exhausted.
    fn send_record_blocking(&self, handler: usize, record: Record);

    /// Synchronous request/reply against handler `handler`'s control
    /// endpoint, with a bounded wait (`timeout`) to guard against a
    /// deadlocked handler.
    fn control_call(&self, handler: usize, request: ControlRequest, timeout: Duration) -> Result<ControlReply>;

    fn handler_count(&self) -> usize;
}

/// The handler-facing half of one handler's channel pair.
pub trait HandlerBus: Send {
    /// Polls both endpoints, waiting up to `deadline` for either to have
    /// something.
    fn recv_poll(&self, deadline: Duration) -> PollEvent;

    /// Answers the most recently polled [`ControlRequest`].
    fn reply(&self, reply: ControlReply);
}

struct Channel {
    data_tx: Sender<Record>,
    ctrl_req_tx: Sender<ControlRequest>,
    ctrl_reply_rx: Receiver<ControlReply>,
}

/// The handler side of one handler's channel pair, handed to its thread at
/// spawn time.
pub struct HandlerEndpoint {
    data_rx: Receiver<Record>,
    ctrl_req_rx: Receiver<ControlRequest>,
    ctrl_reply_tx: Sender<ControlReply>,
}

impl HandlerBus for HandlerEndpoint {
    fn recv_poll(&self, deadline: Duration) -> PollEvent {
        select! {
            recv(self.ctrl_req_rx) -> msg => match msg {
                Ok(req) => PollEvent::Control(req),
                Err(_) => PollEvent::Timeout,
            },
            recv(self.data_rx) -> msg => match msg {
                Ok(record) => PollEvent::Data(record),
                Err(_) => PollEvent::Timeout,
            },
            default(deadline) => PollEvent::Timeout,
        }
    }

    fn reply(&self, reply: ControlReply) {
        // A disconnected reply channel means the coordinator gave up
        // waiting (its own timeout fired first); nothing to do.
        let _ = self.ctrl_reply_tx.send(reply);
    }
}

/// An in-process bus: one bounded `crossbeam-channel` pair per handler for
/// data, and one request/reply pair for control. This is the transport
/// used by the coordinator in production (everything here runs in one
/// process) and the one exercised directly by tests.
pub struct InProcessBus {
    channels: Vec<Channel>,
}

impl InProcessBus {
    /// Builds a bus with one channel pair per entry in `hwms` (each
    /// `(data_hwm, ctrl_hwm)`), and returns the matching list of
    /// [`HandlerEndpoint`]s to hand to each handler thread, in the same
    /// order.
    pub fn new(hwms: &[(usize, usize)]) -> (InProcessBus, Vec<HandlerEndpoint>) {
        let mut channels = Vec::with_capacity(hwms.len());
        let mut endpoints = Vec::with_capacity(hwms.len());
        for &(data_hwm, ctrl_hwm) in hwms {
            let (data_tx, data_rx) = bounded(data_hwm.max(1));
            let (ctrl_req_tx, ctrl_req_rx) = bounded(ctrl_hwm.max(1));
            let (ctrl_reply_tx, ctrl_reply_rx) = bounded(ctrl_hwm.max(1));
            channels.push(Channel {
                data_tx,
                ctrl_req_tx,
                ctrl_reply_rx,
            });
            endpoints.push(HandlerEndpoint {
                data_rx,
                ctrl_req_rx,
                ctrl_reply_tx,
            });
        }
        (InProcessBus { channels }, endpoints)
    }

    /// Uniform-high-water-mark convenience constructor, handy for tests.
    pub fn uniform(data_hwm: usize, ctrl_hwm: usize, handler_count: usize) -> (InProcessBus, Vec<HandlerEndpoint>) {
        InProcessBus::new(&vec![(data_hwm, ctrl_hwm); handler_count])
    }
}

impl RecordBus for InProcessBus {
    fn try_send_record(&self, handler: usize, record: Record) -> std::result::Result<(), Record> {
        match self.channels[handler].data_tx.try_send(record) {
            Ok(()) => Ok(()),
            Err(crossbeam_channel::TrySendError::Full(record)) => Err(record),
            Err(crossbeam_channel::TrySendError::Disconnected(record)) => Err(record),
        }
    }

    fn send_record_blocking(&self, handler: usize, record: Record) {
        // A disconnected data channel means the handler thread is gone
        // (already exited or panicked); drop the record, matching the
        // "transport guarantees eventual release" ownership rule.
        let _ = self.channels[handler].data_tx.send(record);
    }

    fn control_call(&self, handler: usize, request: ControlRequest, timeout: Duration) -> Result<ControlReply> {
        let channel = &self.channels[handler];
        channel
            .ctrl_req_tx
            .send(request)
            .map_err(|e| Error::new(codes::CHANNEL, format!("control request to handler {} failed: {}", handler, e)))?;
        channel
            .ctrl_reply_rx
            .recv_timeout(timeout)
            .map_err(|_| Error::new(codes::TIMEOUT, format!("handler {} did not reply within {:?}", handler, timeout)))
    }

    fn handler_count(&self) -> usize {
        self.channels.len()
    }
}
