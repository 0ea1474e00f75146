//! Test doubles shared by the integration tests: a recording frame sink and a
//! channel-backed fake PTY.
#![allow(dead_code)]

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use sysmon_agent::pty::{Pty, ShellSpawner, SpawnedShell};
use sysmon_agent::transport::{FrameSink, TransportError};

#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Text(String),
    Binary(Vec<u8>),
    Close,
}

#[derive(Clone, Default)]
pub struct Recorder(Arc<Mutex<Vec<Sent>>>);

impl Recorder {
    fn push(&self, s: Sent) {
        self.0.lock().unwrap().push(s);
    }

    pub fn events(&self) -> Vec<Sent> {
        self.0.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Text(t) => Some(t),
                _ => None,
            })
            .collect()
    }

    /// All binary payloads concatenated.
    pub fn output(&self) -> Vec<u8> {
        self.events()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Binary(b) => Some(b),
                _ => None,
            })
            .flatten()
            .collect()
    }

    pub fn closes(&self) -> usize {
        self.events().iter().filter(|s| **s == Sent::Close).count()
    }
}

pub struct RecordingSink {
    log: Recorder,
    fail: bool,
}

impl RecordingSink {
    pub fn new() -> (Self, Recorder) {
        let log = Recorder::default();
        (
            Self {
                log: log.clone(),
                fail: false,
            },
            log,
        )
    }

    /// Every write fails as if the peer vanished; closes are still recorded.
    pub fn failing() -> (Self, Recorder) {
        let (mut sink, log) = Self::new();
        sink.fail = true;
        (sink, log)
    }
}

impl FrameSink for RecordingSink {
    async fn send_text(&mut self, text: &str) -> Result<(), TransportError> {
        if self.fail {
            return Err(TransportError::Closed);
        }
        self.log.push(Sent::Text(text.to_string()));
        Ok(())
    }

    async fn send_binary(&mut self, data: Vec<u8>) -> Result<(), TransportError> {
        if self.fail {
            return Err(TransportError::Closed);
        }
        self.log.push(Sent::Binary(data));
        Ok(())
    }

    async fn close(&mut self) {
        self.log.push(Sent::Close);
    }
}

#[derive(Clone, Default)]
pub struct PtyCounters {
    pub shutdowns: Arc<AtomicUsize>,
    pub resizes: Arc<Mutex<Vec<(u16, u16)>>>,
}

impl PtyCounters {
    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    pub fn resizes(&self) -> Vec<(u16, u16)> {
        self.resizes.lock().unwrap().clone()
    }
}

pub struct FakePty {
    counters: PtyCounters,
    device: mpsc::Sender<Vec<u8>>,
}

impl FakePty {
    pub fn detached() -> (Self, PtyCounters) {
        let (tx, _rx) = mpsc::channel();
        let counters = PtyCounters::default();
        (
            Self {
                counters: counters.clone(),
                device: tx,
            },
            counters,
        )
    }
}

impl Pty for FakePty {
    fn resize(&self, cols: u16, rows: u16) -> anyhow::Result<()> {
        self.counters.resizes.lock().unwrap().push((cols, rows));
        Ok(())
    }

    fn shutdown(&mut self) {
        self.counters.shutdowns.fetch_add(1, Ordering::SeqCst);
        // Closing the device ends the reader, as with a real terminal.
        let _ = self.device.send(Vec::new());
    }
}

/// Reads chunks pushed by the test; an empty chunk or a dropped sender is EOF.
struct ChanReader(mpsc::Receiver<Vec<u8>>);

impl Read for ChanReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.0.recv() {
            Ok(chunk) => {
                let n = chunk.len().min(buf.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                Ok(n)
            }
            Err(_) => Ok(0),
        }
    }
}

#[derive(Clone, Default)]
pub struct SharedWriter(Arc<Mutex<Vec<u8>>>);

impl SharedWriter {
    pub fn contents(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }
}

impl Write for SharedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Test side of a fake shell.
pub struct FakeShell {
    pub counters: PtyCounters,
    pub input: SharedWriter,
    output: mpsc::Sender<Vec<u8>>,
}

impl FakeShell {
    /// Emit bytes as if the process printed them.
    pub fn print(&self, bytes: &[u8]) {
        if !bytes.is_empty() {
            let _ = self.output.send(bytes.to_vec());
        }
    }

    /// Simulate the process exiting.
    pub fn exit(&self) {
        let _ = self.output.send(Vec::new());
    }
}

pub fn fake_shell() -> (SpawnedShell<FakePty>, FakeShell) {
    let (tx, rx) = mpsc::channel();
    let counters = PtyCounters::default();
    let input = SharedWriter::default();
    let spawned = SpawnedShell {
        pty: FakePty {
            counters: counters.clone(),
            device: tx.clone(),
        },
        reader: Box::new(ChanReader(rx)),
        writer: Box::new(input.clone()),
    };
    (
        spawned,
        FakeShell {
            counters,
            input,
            output: tx,
        },
    )
}

/// Writes go straight back out of the reader, like a terminal with echo on.
struct EchoWriter(mpsc::Sender<Vec<u8>>);

impl Write for EchoWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !buf.is_empty() {
            self.0
                .send(buf.to_vec())
                .map_err(|_| io::Error::from(io::ErrorKind::BrokenPipe))?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Spawns echoing fake shells; every spawned terminal reports into `counters`.
#[derive(Clone, Default)]
pub struct EchoSpawner {
    pub counters: PtyCounters,
}

impl ShellSpawner for EchoSpawner {
    type Pty = FakePty;

    fn spawn(&self, _cols: u16, _rows: u16) -> anyhow::Result<SpawnedShell<FakePty>> {
        let (tx, rx) = mpsc::channel();
        Ok(SpawnedShell {
            pty: FakePty {
                counters: self.counters.clone(),
                device: tx.clone(),
            },
            reader: Box::new(ChanReader(rx)),
            writer: Box::new(EchoWriter(tx)),
        })
    }
}

pub struct FailingSpawner;

impl ShellSpawner for FailingSpawner {
    type Pty = FakePty;

    fn spawn(&self, _cols: u16, _rows: u16) -> anyhow::Result<SpawnedShell<FakePty>> {
        anyhow::bail!("no pty devices left")
    }
}

pub async fn wait_for<F: Fn() -> bool>(cond: F, limit: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}
