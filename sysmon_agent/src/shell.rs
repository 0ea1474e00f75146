//! Browser shell: one PTY-backed process per WebSocket, bytes relayed both ways.
//!
//! Binary frames carry raw terminal bytes in both directions. Text frames from the
//! client are JSON control messages (`{"type":"resize","cols":..,"rows":..}`), text
//! frames from the server report problems (`{"type":"error","data":".."}`).
//!
//! A session ends on whichever happens first: the process exits, the client goes
//! quiet for the idle timeout, or the connection fails. All three paths race for the
//! same atomic state transition; only the winner tears the session down.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Notify};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::pty::{Pty, ShellSpawner, SpawnedShell};
use crate::transport::{Frame, FrameSink, TransportError};

pub const IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_COLS: u16 = 80;
pub const DEFAULT_ROWS: u16 = 24;
const READ_CHUNK: usize = 4096;
const CHANNEL_DEPTH: usize = 64;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ControlFrame {
    Resize { cols: i64, rows: i64 },
}

/// Client control message after validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Resize { cols: u16, rows: u16 },
    /// Unknown, malformed or out-of-range input.
    Ignore,
}

impl ControlCommand {
    pub fn parse(text: &str) -> Self {
        match serde_json::from_str::<ControlFrame>(text) {
            Ok(ControlFrame::Resize { cols, rows }) => {
                match (u16::try_from(cols), u16::try_from(rows)) {
                    (Ok(cols), Ok(rows)) if cols > 0 && rows > 0 => {
                        ControlCommand::Resize { cols, rows }
                    }
                    _ => ControlCommand::Ignore,
                }
            }
            Err(_) => ControlCommand::Ignore,
        }
    }
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum Notice<'a> {
    Error { data: &'a str },
}

/// `{"type":"error","data":msg}`
pub fn error_frame(msg: &str) -> String {
    serde_json::to_string(&Notice::Error { data: msg }).unwrap_or_default()
}

fn idle_message(timeout: Duration) -> String {
    format!("session timed out ({}min idle)", timeout.as_secs() / 60)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Starting = 0,
    Active = 1,
    Closing = 2,
    Closed = 3,
}

impl SessionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => SessionState::Starting,
            1 => SessionState::Active,
            2 => SessionState::Closing,
            _ => SessionState::Closed,
        }
    }
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    ProcessExited,
    IdleTimeout,
    TransportClosed,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

pub struct ShellSession<P, S> {
    state: AtomicU8,
    cause: Mutex<Option<Termination>>,
    pty: Mutex<Option<P>>,
    sink: tokio::sync::Mutex<S>,
    idle_timeout: Duration,
    deadline: Mutex<Instant>,
    closed: Notify,
}

impl<P: Pty, S: FrameSink> ShellSession<P, S> {
    pub fn new(pty: P, sink: S, idle_timeout: Duration) -> Self {
        Self {
            state: AtomicU8::new(SessionState::Starting as u8),
            cause: Mutex::new(None),
            pty: Mutex::new(Some(pty)),
            sink: tokio::sync::Mutex::new(sink),
            idle_timeout,
            deadline: Mutex::new(Instant::now() + idle_timeout),
            closed: Notify::new(),
        }
    }

    /// `Starting -> Active`, once the relay is wired up. `false` if the session
    /// was already activated or torn down.
    pub fn activate(&self) -> bool {
        self.state
            .compare_exchange(
                SessionState::Starting as u8,
                SessionState::Active as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn cause(&self) -> Option<Termination> {
        *lock(&self.cause)
    }

    /// Push the idle deadline out by a full timeout.
    pub fn touch(&self) {
        *lock(&self.deadline) = Instant::now() + self.idle_timeout;
    }

    pub fn idle_deadline(&self) -> Instant {
        *lock(&self.deadline)
    }

    pub fn resize(&self, cols: u16, rows: u16) -> anyhow::Result<()> {
        match lock(&self.pty).as_ref() {
            Some(pty) => pty.resize(cols, rows),
            None => Ok(()),
        }
    }

    pub async fn send_output(&self, chunk: Vec<u8>) -> Result<(), TransportError> {
        if self.state() != SessionState::Active {
            return Err(TransportError::Closed);
        }
        self.sink.lock().await.send_binary(chunk).await
    }

    /// Tear the session down. Only the first caller does any work; it returns `true`.
    pub async fn terminate(&self, cause: Termination) -> bool {
        let won = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| {
                match SessionState::from_u8(s) {
                    SessionState::Starting | SessionState::Active => {
                        Some(SessionState::Closing as u8)
                    }
                    _ => None,
                }
            })
            .is_ok();
        if !won {
            return false;
        }
        *lock(&self.cause) = Some(cause);
        debug!(?cause, "shell session closing");

        // Killing and reaping the child can block for a while.
        let pty = lock(&self.pty).take();
        if let Some(mut pty) = pty {
            if let Err(e) = tokio::task::spawn_blocking(move || pty.shutdown()).await {
                warn!("pty shutdown task failed: {e}");
            }
        }

        {
            let mut sink = self.sink.lock().await;
            if cause == Termination::IdleTimeout {
                let _ = sink
                    .send_text(&error_frame(&idle_message(self.idle_timeout)))
                    .await;
            }
            sink.close().await;
        }

        self.state.store(SessionState::Closed as u8, Ordering::Release);
        self.closed.notify_waiters();
        true
    }

    /// Resolves once teardown has finished.
    pub async fn closed(&self) {
        loop {
            let notified = self.closed.notified();
            if self.state() == SessionState::Closed {
                return;
            }
            notified.await;
        }
    }
}

fn spawn_reader(mut reader: Box<dyn Read + Send>, tx: mpsc::Sender<Vec<u8>>) {
    std::thread::spawn(move || {
        let mut buf = [0u8; READ_CHUNK];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if tx.blocking_send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    // EIO once the child is gone is the normal end of a Linux pty.
                    debug!("pty read ended: {e}");
                    break;
                }
            }
        }
    });
}

fn spawn_writer(mut writer: Box<dyn Write + Send>, mut rx: mpsc::Receiver<Vec<u8>>) {
    std::thread::spawn(move || {
        while let Some(data) = rx.blocking_recv() {
            if let Err(e) = writer.write_all(&data).and_then(|()| writer.flush()) {
                debug!("pty write failed: {e}");
                break;
            }
        }
    });
}

async fn pump_output<P: Pty, S: FrameSink>(
    session: Arc<ShellSession<P, S>>,
    mut output: mpsc::Receiver<Vec<u8>>,
) {
    while let Some(chunk) = output.recv().await {
        if chunk.is_empty() {
            continue;
        }
        if let Err(e) = session.send_output(chunk).await {
            debug!("shell output write failed: {e}");
            session.terminate(Termination::TransportClosed).await;
            return;
        }
    }
    session.terminate(Termination::ProcessExited).await;
}

async fn pump_input<P, S, R>(
    session: Arc<ShellSession<P, S>>,
    mut inbound: R,
    input: mpsc::Sender<Vec<u8>>,
) where
    P: Pty,
    S: FrameSink,
    R: Stream<Item = Result<Frame, TransportError>> + Unpin,
{
    while let Some(frame) = inbound.next().await {
        match frame {
            Ok(Frame::Binary(data)) => {
                session.touch();
                if input.send(data).await.is_err() {
                    debug!("pty writer gone; dropping input");
                }
            }
            Ok(Frame::Text(text)) => {
                session.touch();
                if let ControlCommand::Resize { cols, rows } = ControlCommand::parse(&text) {
                    if let Err(e) = session.resize(cols, rows) {
                        warn!("pty resize to {cols}x{rows} failed: {e:#}");
                    }
                }
            }
            Ok(Frame::Control) => {}
            Ok(Frame::Close) => break,
            Err(e) => {
                debug!("shell read failed: {e}");
                break;
            }
        }
    }
    session.terminate(Termination::TransportClosed).await;
}

/// Fires [`Termination::IdleTimeout`] once the deadline passes without being pushed back.
pub async fn watch_idle<P: Pty, S: FrameSink>(session: Arc<ShellSession<P, S>>) {
    loop {
        sleep_until(session.idle_deadline()).await;
        if session.state() != SessionState::Active {
            return;
        }
        if session.idle_deadline() <= Instant::now() {
            info!("shell session idle, disconnecting");
            session.terminate(Termination::IdleTimeout).await;
            return;
        }
    }
}

/// Relay an already spawned shell until one of the termination causes fires.
pub async fn run_bridge<P, S, R>(
    spawned: SpawnedShell<P>,
    sink: S,
    inbound: R,
    idle_timeout: Duration,
) -> Termination
where
    P: Pty,
    S: FrameSink,
    R: Stream<Item = Result<Frame, TransportError>> + Send + Unpin + 'static,
{
    let SpawnedShell { pty, reader, writer } = spawned;
    let session = Arc::new(ShellSession::new(pty, sink, idle_timeout));

    let (out_tx, out_rx) = mpsc::channel(CHANNEL_DEPTH);
    let (in_tx, in_rx) = mpsc::channel(CHANNEL_DEPTH);
    spawn_reader(reader, out_tx);
    spawn_writer(writer, in_rx);
    session.activate();

    let tasks = [
        tokio::spawn(pump_output(session.clone(), out_rx)),
        tokio::spawn(pump_input(session.clone(), inbound, in_tx)),
        tokio::spawn(watch_idle(session.clone())),
    ];
    session.closed().await;
    for t in tasks {
        t.abort();
    }
    session.cause().unwrap_or(Termination::ProcessExited)
}

/// Spawn a shell for one connection and relay it. `None` when the shell failed to start.
pub async fn serve<T, S, R>(
    spawner: &T,
    mut sink: S,
    inbound: R,
    idle_timeout: Duration,
) -> Option<Termination>
where
    T: ShellSpawner + ?Sized,
    S: FrameSink,
    R: Stream<Item = Result<Frame, TransportError>> + Send + Unpin + 'static,
{
    let spawned = match spawner.spawn(DEFAULT_COLS, DEFAULT_ROWS) {
        Ok(s) => s,
        Err(e) => {
            warn!("shell: failed to start pty: {e:#}");
            let _ = sink.send_text(&error_frame("failed to start shell")).await;
            sink.close().await;
            return None;
        }
    };
    let cause = run_bridge(spawned, sink, inbound, idle_timeout).await;
    info!(?cause, "shell session closed");
    Some(cause)
}
