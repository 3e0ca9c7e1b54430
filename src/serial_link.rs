use std::fmt;
use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Local};
use log::{debug, error, info, warn};
use ringbuf::{HeapConsumer, HeapProducer, HeapRb};
use serialport::{ClearBuffer, SerialPort};
use thiserror::Error;

use crate::config::{Framing, Settings};
use crate::record::{parse_record, Record};

const READ_CHUNK: usize = 256;
const MAX_PENDING_LINE: usize = 4096;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionState {
    fn as_u8(self) -> u8 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Connected => 2,
            ConnectionState::Error => 3,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            3 => ConnectionState::Error,
            _ => ConnectionState::Disconnected,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Connected => write!(f, "Connected"),
            ConnectionState::Error => write!(f, "Error"),
        }
    }
}

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("could not open {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: serialport::Error,
    },
    #[error("read failed: {0}")]
    Read(#[source] io::Error),
    #[error("device closed the stream")]
    Closed,
    #[error("port error: {0}")]
    Port(#[source] serialport::Error),
    #[error("could not start reader thread: {0}")]
    Spawn(#[source] io::Error),
}

/// Byte source the reader thread pulls from.
pub trait Transport: Read + Send {
    /// Drops whatever the driver still has queued in either direction.
    fn discard_buffers(&mut self) -> Result<(), LinkError>;

    fn close(self) -> Result<(), LinkError>
    where
        Self: Sized,
    {
        drop(self);
        Ok(())
    }
}

impl Transport for Box<dyn SerialPort> {
    fn discard_buffers(&mut self) -> Result<(), LinkError> {
        self.clear(ClearBuffer::All).map_err(LinkError::Port)
    }
}

pub fn open_port(port: &str, baud_rate: u32, timeout: Duration) -> Result<Box<dyn SerialPort>, LinkError> {
    serialport::new(port, baud_rate)
        .timeout(timeout)
        .open()
        .map_err(|source| LinkError::Open {
            port: port.to_string(),
            source,
        })
}

pub fn available_ports() -> Result<Vec<String>, LinkError> {
    let ports = serialport::available_ports().map_err(LinkError::Port)?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}

/// Cuts the byte stream into record candidates.
pub struct Framer {
    framing: Framing,
    pending: Vec<u8>,
}

impl Framer {
    pub fn new(framing: Framing) -> Self {
        Framer {
            framing,
            pending: Vec::new(),
        }
    }

    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        match self.framing {
            Framing::Chunk => vec![String::from_utf8_lossy(bytes).into_owned()],
            Framing::Line => {
                self.pending.extend_from_slice(bytes);
                let mut out = Vec::new();
                while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
                    let line: Vec<u8> = self.pending.drain(..=pos).collect();
                    let text = String::from_utf8_lossy(&line);
                    let text = text.trim();
                    if !text.is_empty() {
                        out.push(text.to_string());
                    }
                }
                if self.pending.len() > MAX_PENDING_LINE {
                    warn!("dropping {} bytes without a line break", self.pending.len());
                    self.pending.clear();
                }
                out
            }
        }
    }

    /// Throws away a partial line; returns how many bytes were held.
    pub fn discard(&mut self) -> usize {
        let held = self.pending.len();
        self.pending.clear();
        held
    }
}

/// Last accepted record, for display.
#[derive(Clone, Copy, Debug)]
pub struct Readout {
    pub record: Record,
    pub received_at: DateTime<Local>,
}

#[derive(Default)]
pub struct LinkStats {
    pub accepted: u32,
    pub warnings: u32,
    pub ignored: u32,
    pub overflowed: u32,
}

struct LinkShared {
    state: AtomicU8,
    accepted: AtomicU32,
    warnings: AtomicU32,
    ignored: AtomicU32,
    overflowed: AtomicU32,
    readout: Mutex<Option<Readout>>,
    // newest record that did not fit in the queue; delivered after the queued ones
    spill: Mutex<Option<Record>>,
}

impl LinkShared {
    fn new() -> Self {
        LinkShared {
            state: AtomicU8::new(ConnectionState::Disconnected.as_u8()),
            accepted: AtomicU32::new(0),
            warnings: AtomicU32::new(0),
            ignored: AtomicU32::new(0),
            overflowed: AtomicU32::new(0),
            readout: Mutex::new(None),
            spill: Mutex::new(None),
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }
}

struct Session<T: Transport> {
    transport: Option<T>,
    framer: Option<Framer>,
}

impl<T: Transport> Session<T> {
    fn new(transport: T, framing: Framing) -> Self {
        Session {
            transport: Some(transport),
            framer: Some(Framer::new(framing)),
        }
    }

    /// Each step runs regardless of whether an earlier one failed.
    fn release(&mut self) {
        if let Some(mut framer) = self.framer.take() {
            let held = framer.discard();
            if held > 0 {
                debug!("discarded {} bytes of partial input", held);
            }
        }
        if let Some(transport) = self.transport.as_mut() {
            if let Err(e) = transport.discard_buffers() {
                warn!("could not flush port buffers: {}", e);
            }
        }
        if let Some(transport) = self.transport.take() {
            if let Err(e) = transport.close() {
                warn!("could not close port: {}", e);
            }
        }
    }
}

impl<T: Transport> Drop for Session<T> {
    fn drop(&mut self) {
        self.release();
    }
}

fn handle_candidate(text: &str, producer: &mut HeapProducer<Record>, shared: &LinkShared) {
    match parse_record(text) {
        Ok(record) => {
            shared.accepted.fetch_add(1, Ordering::Relaxed);
            if let Ok(mut readout) = shared.readout.lock() {
                *readout = Some(Readout {
                    record,
                    received_at: Local::now(),
                });
            }
            enqueue(record, producer, shared);
        }
        Err(e) if e.is_warning() => {
            shared.warnings.fetch_add(1, Ordering::Relaxed);
            warn!("ignoring malformed data {:?}: {}", text, e);
        }
        Err(e) => {
            shared.ignored.fetch_add(1, Ordering::Relaxed);
            debug!("ignoring {:?}: {}", text, e);
        }
    }
}

/// Queues a record. Once the queue is full, records go to the spill slot instead,
/// each replacing the one before, until the consumer takes it.
fn enqueue(record: Record, producer: &mut HeapProducer<Record>, shared: &LinkShared) {
    let Ok(mut spill) = shared.spill.lock() else {
        return;
    };
    if spill.is_some() {
        *spill = Some(record);
        shared.overflowed.fetch_add(1, Ordering::Relaxed);
        return;
    }
    if let Err(record) = producer.push(record) {
        *spill = Some(record);
        shared.overflowed.fetch_add(1, Ordering::Relaxed);
    }
}

/// Pops every queued record, oldest first, followed by the spilled one.
fn drain_queue(consumer: &mut HeapConsumer<Record>, shared: &LinkShared) -> Vec<Record> {
    let mut out = Vec::new();
    while let Some(record) = consumer.pop() {
        out.push(record);
    }
    if let Some(record) = shared.spill.lock().ok().and_then(|mut s| s.take()) {
        out.push(record);
    }
    out
}

/// Reads until the stream ends, fails, or `stop` is raised. `Ok` only for a requested stop.
fn read_loop<T: Transport>(
    session: &mut Session<T>,
    producer: &mut HeapProducer<Record>,
    shared: &LinkShared,
    stop: &AtomicBool,
) -> Result<(), LinkError> {
    let mut buf = [0u8; READ_CHUNK];
    while !stop.load(Ordering::Relaxed) {
        let (Some(transport), Some(framer)) = (session.transport.as_mut(), session.framer.as_mut()) else {
            return Err(LinkError::Closed);
        };
        let n = match transport.read(&mut buf) {
            Ok(0) => return Err(LinkError::Closed),
            Ok(n) => n,
            Err(e) if matches!(
                e.kind(),
                io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
            ) =>
            {
                continue
            }
            Err(e) => return Err(LinkError::Read(e)),
        };
        for candidate in framer.feed(&buf[..n]) {
            handle_candidate(&candidate, producer, shared);
        }
    }
    Ok(())
}

/// Reader thread plus the consuming end of its record queue.
pub struct SerialLink {
    port_name: String,
    shared: Arc<LinkShared>,
    stop: Arc<AtomicBool>,
    consumer: HeapConsumer<Record>,
    thread: Option<thread::JoinHandle<()>>,
}

impl SerialLink {
    pub fn connect(port_name: &str, settings: &Settings) -> Result<SerialLink, LinkError> {
        let name = port_name.to_string();
        let baud_rate = settings.baud_rate;
        let timeout = settings.read_timeout();
        info!("connecting to {} at {} baud", port_name, baud_rate);
        SerialLink::spawn(port_name, settings.framing, settings.queue_capacity, move || {
            open_port(&name, baud_rate, timeout)
        })
    }

    /// Starts a reader over any transport; `open` runs on the reader thread.
    pub fn spawn<T, F>(port_name: &str, framing: Framing, capacity: usize, open: F) -> Result<SerialLink, LinkError>
    where
        T: Transport + 'static,
        F: FnOnce() -> Result<T, LinkError> + Send + 'static,
    {
        let (mut producer, consumer) = HeapRb::<Record>::new(capacity.max(1)).split();
        let shared = Arc::new(LinkShared::new());
        let stop = Arc::new(AtomicBool::new(false));
        shared.set_state(ConnectionState::Connecting);

        let shared_for_reader = Arc::clone(&shared);
        let stop_for_reader = Arc::clone(&stop);
        let label = port_name.to_string();
        let thread = thread::Builder::new()
            .name("serial-reader".to_string())
            .spawn(move || {
                let transport = match open() {
                    Ok(t) => t,
                    Err(e) => {
                        error!("{}", e);
                        shared_for_reader.set_state(ConnectionState::Error);
                        return;
                    }
                };
                shared_for_reader.set_state(ConnectionState::Connected);
                info!("connected to {}", label);

                let mut session = Session::new(transport, framing);
                let result = read_loop(&mut session, &mut producer, &shared_for_reader, &stop_for_reader);
                session.release();
                match result {
                    Ok(()) => {
                        info!("closed {}", label);
                        shared_for_reader.set_state(ConnectionState::Disconnected);
                    }
                    Err(e) => {
                        error!("serial link {} ended: {}", label, e);
                        shared_for_reader.set_state(ConnectionState::Error);
                    }
                }
            })
            .map_err(LinkError::Spawn)?;

        Ok(SerialLink {
            port_name: port_name.to_string(),
            shared,
            stop,
            consumer,
            thread: Some(thread),
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Pending records, oldest first. When the queue overflowed, the newest record
    /// still comes last.
    pub fn drain(&mut self) -> Vec<Record> {
        drain_queue(&mut self.consumer, &self.shared)
    }

    pub fn readout(&self) -> Option<Readout> {
        self.shared.readout.lock().ok().and_then(|r| *r)
    }

    pub fn stats(&self) -> LinkStats {
        LinkStats {
            accepted: self.shared.accepted.load(Ordering::Relaxed),
            warnings: self.shared.warnings.load(Ordering::Relaxed),
            ignored: self.shared.ignored.load(Ordering::Relaxed),
            overflowed: self.shared.overflowed.load(Ordering::Relaxed),
        }
    }

    /// Stops the reader and waits for it. A link that already failed stays in `Error`.
    pub fn disconnect(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("serial reader for {} panicked", self.port_name);
                self.shared.set_state(ConnectionState::Error);
                return;
            }
        }
        if self.shared.state() != ConnectionState::Error {
            self.shared.set_state(ConnectionState::Disconnected);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }
}

impl Drop for SerialLink {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    #[derive(Clone, Default)]
    struct Calls(Arc<Mutex<Vec<&'static str>>>);

    impl Calls {
        fn push(&self, call: &'static str) {
            self.0.lock().unwrap().push(call);
        }

        fn list(&self) -> Vec<&'static str> {
            self.0.lock().unwrap().clone()
        }
    }

    struct ScriptedPort {
        reads: VecDeque<io::Result<Vec<u8>>>,
        calls: Calls,
        fail_discard: bool,
    }

    impl ScriptedPort {
        fn new(reads: Vec<io::Result<Vec<u8>>>, calls: Calls) -> Self {
            ScriptedPort {
                reads: reads.into(),
                calls,
                fail_discard: false,
            }
        }
    }

    impl Read for ScriptedPort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.reads.pop_front() {
                Some(Ok(bytes)) => {
                    buf[..bytes.len()].copy_from_slice(&bytes);
                    Ok(bytes.len())
                }
                Some(Err(e)) => Err(e),
                None => Ok(0),
            }
        }
    }

    impl Transport for ScriptedPort {
        fn discard_buffers(&mut self) -> Result<(), LinkError> {
            self.calls.push("discard");
            if self.fail_discard {
                return Err(LinkError::Read(io::Error::new(io::ErrorKind::Other, "flush failed")));
            }
            Ok(())
        }

        fn close(self) -> Result<(), LinkError> {
            self.calls.push("close");
            Ok(())
        }
    }

    fn run(port: ScriptedPort, framing: Framing) -> (Result<(), LinkError>, Vec<Record>, LinkShared) {
        let (mut producer, mut consumer) = HeapRb::<Record>::new(16).split();
        let shared = LinkShared::new();
        let stop = AtomicBool::new(false);
        let mut session = Session::new(port, framing);
        let result = read_loop(&mut session, &mut producer, &shared, &stop);
        session.release();
        let mut records = Vec::new();
        while let Some(r) = consumer.pop() {
            records.push(r);
        }
        (result, records, shared)
    }

    #[test]
    fn line_framer_joins_split_records() {
        let mut framer = Framer::new(Framing::Line);
        assert!(framer.feed(b"0.2,").is_empty());
        assert_eq!(framer.feed(b"0.4\r\n0.6,0.8\n0.1"), vec!["0.2,0.4", "0.6,0.8"]);
        assert_eq!(framer.discard(), 3);
    }

    #[test]
    fn chunk_framer_passes_reads_through() {
        let mut framer = Framer::new(Framing::Chunk);
        assert_eq!(framer.feed(b"0.5,0.5\r\n"), vec!["0.5,0.5\r\n"]);
    }

    #[test]
    fn valid_and_invalid_lines_are_sorted() {
        let calls = Calls::default();
        let port = ScriptedPort::new(
            vec![Ok(b"0.5,0.5\nabc,0.2\n1,0.5,0.3\n".to_vec()), Ok(b"0.25,1\n".to_vec())],
            calls,
        );
        let (result, records, shared) = run(port, Framing::Line);
        assert!(matches!(result, Err(LinkError::Closed)));
        assert_eq!(
            records,
            vec![Record { value: 0.5, speed: 0.5 }, Record { value: 0.25, speed: 1.0 }]
        );
        assert_eq!(shared.warnings.load(Ordering::Relaxed), 1);
        assert_eq!(shared.ignored.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn timeouts_do_not_end_the_session() {
        let calls = Calls::default();
        let port = ScriptedPort::new(
            vec![
                Err(io::Error::new(io::ErrorKind::TimedOut, "quiet")),
                Ok(b"0.1,0.1\n".to_vec()),
            ],
            calls,
        );
        let (_, records, _) = run(port, Framing::Line);
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn read_error_still_releases_every_handle() {
        let calls = Calls::default();
        let mut port = ScriptedPort::new(
            vec![Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"))],
            calls.clone(),
        );
        port.fail_discard = true;
        let (result, _, _) = run(port, Framing::Line);
        assert!(matches!(result, Err(LinkError::Read(_))));
        assert_eq!(calls.list(), vec!["discard", "close"]);
    }

    #[test]
    fn full_queue_still_delivers_newest_record() {
        let (mut producer, mut consumer) = HeapRb::<Record>::new(2).split();
        let shared = LinkShared::new();
        for line in ["0.1,0.1", "0.2,0.2", "0.9,0.9"] {
            handle_candidate(line, &mut producer, &shared);
        }
        let values: Vec<f64> = drain_queue(&mut consumer, &shared).iter().map(|r| r.value).collect();
        assert_eq!(values, vec![0.1, 0.2, 0.9]);
        assert_eq!(shared.accepted.load(Ordering::Relaxed), 3);
        assert_eq!(shared.overflowed.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn spilled_records_are_superseded_by_newer_ones() {
        let (mut producer, mut consumer) = HeapRb::<Record>::new(2).split();
        let shared = LinkShared::new();
        for line in ["0.1,0.1", "0.2,0.2", "0.7,0.7", "0.8,0.8", "0.9,0.9"] {
            handle_candidate(line, &mut producer, &shared);
        }
        let drained = drain_queue(&mut consumer, &shared);
        assert_eq!(drained.last().map(|r| r.value), Some(0.9));
        assert_eq!(drained.len(), 3);
        assert_eq!(shared.overflowed.load(Ordering::Relaxed), 3);

        // queue is used again once the spill slot was taken
        handle_candidate("0.3,0.3", &mut producer, &shared);
        assert_eq!(consumer.len(), 1);
        assert!(shared.spill.lock().unwrap().is_none());
    }

    #[test]
    fn state_round_trips_through_atomic() {
        for state in [
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Error,
        ] {
            assert_eq!(ConnectionState::from_u8(state.as_u8()), state);
        }
    }
}
