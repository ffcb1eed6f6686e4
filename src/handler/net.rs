//! Network publisher/receiver pair (§6, §12): a best-effort pub/sub
//! synchronization protocol over `std::net` (no ZeroMQ binding is present
//! in this codebase's dependency stack).
//!
//! `NetHandler` is the publisher: it binds a data listener subscribers
//! connect to for the record stream, and a separate sync listener they
//! connect to for the four-step handshake. `NetReceiver` is the
//! subscriber: it connects to both, completes the handshake, then decodes
//! frames and republishes them through a downstream [`HandlerContract`].

use crate::error::{codes, Error, Result};
use crate::handler::contract::{HandlerContract, HandlerParam};
use crate::record::Record;
use std::collections::HashSet;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::time::{Duration, Instant};

/// The two-frame heartbeat the publisher repeats until a subscriber has
/// completed the handshake (§6).
const SYNC_HEADER: &str = "sync-header";

const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandshakeStep {
    AwaitingPong,
    AwaitingAlmost,
}

struct Subscriber {
    data_stream: TcpStream,
    sync_stream: Option<TcpStream>,
    step: Option<HandshakeStep>,
    established: bool,
}

pub struct NetHandlerParam {
    pub base: HandlerParam,
    pub data_addr: SocketAddr,
    pub sync_addr: SocketAddr,
}

/// Publisher-side handler: streams every admitted [`Record`] to each
/// established subscriber as a length-prefixed frame.
pub struct NetHandler {
    param: NetHandlerParam,
    data_listener: Option<TcpListener>,
    sync_listener: Option<TcpListener>,
    subscribers: Vec<Subscriber>,
    last_heartbeat: Instant,
}

impl NetHandler {
    pub fn new(param: NetHandlerParam) -> NetHandler {
        NetHandler {
            param,
            data_listener: None,
            sync_listener: None,
            subscribers: Vec::new(),
            last_heartbeat: Instant::now(),
        }
    }

    fn accept_new_connections(&mut self) -> Result<()> {
        if let Some(listener) = &self.data_listener {
            while let Ok((stream, _addr)) = listener.accept() {
                stream.set_nonblocking(true)?;
                self.subscribers.push(Subscriber {
                    data_stream: stream,
                    sync_stream: None,
                    step: Some(HandshakeStep::AwaitingPong),
                    established: false,
                });
            }
        }
        if let Some(listener) = &self.sync_listener {
            while let Ok((stream, _addr)) = listener.accept() {
                stream.set_nonblocking(true)?;
                if let Some(sub) = self.subscribers.iter_mut().find(|s| s.sync_stream.is_none() && !s.established) {
                    sub.sync_stream = Some(stream);
                }
            }
        }
        Ok(())
    }

    fn advance_handshakes(&mut self) {
        let due_for_heartbeat = self.last_heartbeat.elapsed() >= HEARTBEAT_INTERVAL;
        for sub in &mut self.subscribers {
            if sub.established {
                continue;
            }
            if due_for_heartbeat {
                let _ = writeln!(sub.data_stream, "{}|{}", SYNC_HEADER, "sync-url");
            }
            if let Some(sync) = sub.sync_stream.as_mut() {
                let mut buf = [0u8; 32];
                if let Ok(n) = sync.read(&mut buf) {
                    if n > 0 {
                        let msg = String::from_utf8_lossy(&buf[..n]);
                        let msg = msg.trim();
                        match (sub.step, msg) {
                            (Some(HandshakeStep::AwaitingPong), "pong") => {
                                let _ = writeln!(sync, "ready");
                                sub.step = Some(HandshakeStep::AwaitingAlmost);
                            }
                            (Some(HandshakeStep::AwaitingAlmost), "almost") => {
                                let _ = writeln!(sync, "go");
                                sub.step = None;
                                sub.established = true;
                            }
                            _ => {}
                        }
                    }
                }
            }
        }
        if due_for_heartbeat {
            self.last_heartbeat = Instant::now();
        }
    }
}

impl HandlerContract for NetHandler {
    fn init(&mut self) -> Result<()> {
        let data_listener = TcpListener::bind(self.param.data_addr)?;
        let sync_listener = TcpListener::bind(self.param.sync_addr)?;
        data_listener.set_nonblocking(true)?;
        sync_listener.set_nonblocking(true)?;
        self.data_listener = Some(data_listener);
        self.sync_listener = Some(sync_listener);
        Ok(())
    }

    fn process_log(
        &mut self,
        record: &Record,
        _filename: &str,
        _funcname: &str,
        _loggername: &str,
        _message: &str,
    ) -> Result<()> {
        self.accept_new_connections()?;
        self.advance_handshakes();
        let frame = record.to_bytes();
        let len = (frame.len() as u32).to_le_bytes();
        let mut dead = Vec::new();
        for (idx, sub) in self.subscribers.iter_mut().enumerate() {
            if !sub.established {
                continue;
            }
            let sent = sub
                .data_stream
                .write_all(&len)
                .and_then(|_| sub.data_stream.write_all(&frame))
                .is_ok();
            if !sent {
                dead.push(idx);
            }
        }
        for idx in dead.into_iter().rev() {
            self.subscribers.remove(idx);
        }
        Ok(())
    }

    fn process_implicit_flush(&mut self) -> Result<()> {
        self.accept_new_connections()?;
        self.advance_handshakes();
        for sub in &mut self.subscribers {
            if sub.established {
                let _ = sub.data_stream.flush();
            }
        }
        Ok(())
    }
}

/// Subscriber-side handler: connects to a publisher, completes the
/// handshake, decodes incoming frames, and republishes each one through
/// `downstream` — itself just another [`HandlerContract`], so a
/// `NetReceiver` is driven by the same handler runtime as any local sink,
/// one layer removed from the wire.
pub struct NetReceiver {
    data_stream: TcpStream,
    sync_stream: TcpStream,
    established: bool,
    seen_sync_addrs: HashSet<SocketAddr>,
    downstream: Box<dyn HandlerContract>,
}

impl NetReceiver {
    pub fn connect(data_addr: SocketAddr, sync_addr: SocketAddr, downstream: Box<dyn HandlerContract>) -> Result<NetReceiver> {
        let data_stream = TcpStream::connect(data_addr)?;
        let sync_stream = TcpStream::connect(sync_addr)?;
        data_stream.set_nonblocking(true)?;
        sync_stream.set_nonblocking(true)?;
        Ok(NetReceiver {
            data_stream,
            sync_stream,
            established: false,
            seen_sync_addrs: HashSet::new(),
            downstream,
        })
    }

    fn poll_handshake(&mut self, sync_addr: SocketAddr) {
        if self.established || self.seen_sync_addrs.contains(&sync_addr) {
            return;
        }
        let mut buf = [0u8; 256];
        if let Ok(n) = self.data_stream.read(&mut buf) {
            if n > 0 {
                let line = String::from_utf8_lossy(&buf[..n]);
                if line.starts_with(SYNC_HEADER) {
                    let _ = writeln!(self.sync_stream, "pong");
                    let mut reply = [0u8; 32];
                    if let Ok(n) = self.sync_stream.read(&mut reply) {
                        if String::from_utf8_lossy(&reply[..n]).trim() == "ready" {
                            let _ = writeln!(self.sync_stream, "almost");
                            if let Ok(n) = self.sync_stream.read(&mut reply) {
                                if String::from_utf8_lossy(&reply[..n]).trim() == "go" {
                                    self.established = true;
                                    self.seen_sync_addrs.insert(sync_addr);
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    fn poll_frames(&mut self) -> Result<()> {
        if !self.established {
            return Ok(());
        }
        loop {
            let mut len_buf = [0u8; 4];
            match self.data_stream.read_exact(&mut len_buf) {
                Ok(()) => {}
                Err(_) => return Ok(()),
            }
            let len = u32::from_le_bytes(len_buf) as usize;
            let mut payload = vec![0u8; len];
            if self.data_stream.read_exact(&mut payload).is_err() {
                return Err(Error::new(codes::PROTOCOL, "truncated record frame on net receiver"));
            }
            let record = Record::from_bytes(&payload)?;
            self.downstream
                .process_log(&record, &record.filename, &record.funcname, &record.loggername, &record.message)?;
        }
    }
}

impl HandlerContract for NetReceiver {
    fn init(&mut self) -> Result<()> {
        self.downstream.init()
    }

    fn process_log(
        &mut self,
        _record: &Record,
        _filename: &str,
        _funcname: &str,
        _loggername: &str,
        _message: &str,
    ) -> Result<()> {
        // A NetReceiver is not fed by the local bus: records arrive over
        // the wire and are handled in `process_implicit_flush` instead.
        Ok(())
    }

    fn process_implicit_flush(&mut self) -> Result<()> {
        let sync_addr = self.sync_stream.peer_addr().unwrap_or_else(|_| ([0, 0, 0, 0], 0).into());
        self.poll_handshake(sync_addr);
        self.poll_frames()?;
        self.downstream.process_implicit_flush()
    }

    fn process_exit(&mut self) -> Result<()> {
        self.downstream.process_exit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterSet;
    use crate::handler::null::NullHandler;
    use crate::level::Level;
    use std::net::TcpListener;

    fn free_addr() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    }

    fn base_param() -> HandlerParam {
        HandlerParam {
            filters: FilterSet::all_all(),
            data_hwm: 8,
            ctrl_hwm: 8,
            ierr_max: 10,
            flush_freq_ms: 50,
        }
    }

    #[test]
    fn publisher_and_receiver_complete_handshake_and_stream_one_record() {
        let data_addr = free_addr();
        let sync_addr = free_addr();

        let mut publisher = NetHandler::new(NetHandlerParam {
            base: base_param(),
            data_addr,
            sync_addr,
        });
        publisher.init().unwrap();

        let downstream = Box::new(NullHandler::new(base_param()));
        let mut receiver = NetReceiver::connect(data_addr, sync_addr, downstream).unwrap();
        receiver.init().unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while !receiver.established && Instant::now() < deadline {
            publisher.process_implicit_flush().unwrap();
            receiver.process_implicit_flush().unwrap();
            std::thread::sleep(Duration::from_millis(20));
        }
        assert!(receiver.established, "handshake did not complete in time");

        let record = Record::new(Level::Info, 1, 1, 0, 0, "f", "g", "app", "over the wire");
        publisher
            .process_log(&record, "f", "g", "app", &record.message)
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            receiver.process_implicit_flush().unwrap();
            std::thread::sleep(Duration::from_millis(20));
        }
    }
}
