//! Pseudo-terminal spawning on top of portable-pty.

use std::io::{Read, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use portable_pty::{native_pty_system, Child, ChildKiller, CommandBuilder, MasterPty, PtySize};
use tracing::{info, warn};

pub const FALLBACK_SHELL: &str = "/bin/bash";

/// Control half of a running terminal process.
pub trait Pty: Send + 'static {
    fn resize(&self, cols: u16, rows: u16) -> Result<()>;

    /// Close the device, kill the child if it is still running and reap it.
    fn shutdown(&mut self);
}

/// A freshly spawned terminal: control handle plus the byte streams.
pub struct SpawnedShell<P> {
    pub pty: P,
    pub reader: Box<dyn Read + Send>,
    pub writer: Box<dyn Write + Send>,
}

pub trait ShellSpawner: Send + Sync + 'static {
    type Pty: Pty;

    fn spawn(&self, cols: u16, rows: u16) -> Result<SpawnedShell<Self::Pty>>;
}

impl Pty for Box<dyn Pty> {
    fn resize(&self, cols: u16, rows: u16) -> Result<()> {
        (**self).resize(cols, rows)
    }

    fn shutdown(&mut self) {
        (**self).shutdown()
    }
}

/// Any spawner, with its terminal type erased so it can live in shared state.
pub type SharedSpawner = Arc<dyn ShellSpawner<Pty = Box<dyn Pty>>>;

pub struct BoxedSpawner<T>(pub T);

impl<T: ShellSpawner> ShellSpawner for BoxedSpawner<T> {
    type Pty = Box<dyn Pty>;

    fn spawn(&self, cols: u16, rows: u16) -> Result<SpawnedShell<Box<dyn Pty>>> {
        let SpawnedShell { pty, reader, writer } = self.0.spawn(cols, rows)?;
        Ok(SpawnedShell {
            pty: Box::new(pty),
            reader,
            writer,
        })
    }
}

pub fn shared<T: ShellSpawner>(spawner: T) -> SharedSpawner {
    Arc::new(BoxedSpawner(spawner))
}

/// The user's login shell from `$SHELL`, or [`FALLBACK_SHELL`].
pub fn default_shell() -> String {
    std::env::var("SHELL")
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| FALLBACK_SHELL.to_string())
}

#[derive(Debug, Clone)]
pub struct NativeSpawner {
    pub program: String,
}

impl NativeSpawner {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for NativeSpawner {
    fn default() -> Self {
        Self::new(default_shell())
    }
}

impl ShellSpawner for NativeSpawner {
    type Pty = NativePty;

    fn spawn(&self, cols: u16, rows: u16) -> Result<SpawnedShell<NativePty>> {
        let pair = native_pty_system()
            .openpty(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .context("open pty")?;

        let mut cmd = CommandBuilder::new(&self.program);
        cmd.env("TERM", "xterm-256color");
        if let Ok(home) = std::env::var("HOME") {
            cmd.cwd(home);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .with_context(|| format!("spawn {}", self.program))?;
        // Only the child may hold the slave side, or EOF never reaches the reader.
        drop(pair.slave);

        let reader = pair
            .master
            .try_clone_reader()
            .context("clone pty reader")?;
        let writer = pair.master.take_writer().context("take pty writer")?;
        info!(program = %self.program, pid = ?child.process_id(), "shell spawned");

        Ok(SpawnedShell {
            pty: NativePty {
                master: Some(pair.master),
                child,
            },
            reader,
            writer,
        })
    }
}

pub struct NativePty {
    master: Option<Box<dyn MasterPty + Send>>,
    child: Box<dyn Child + Send + Sync>,
}

impl Pty for NativePty {
    fn resize(&self, cols: u16, rows: u16) -> Result<()> {
        let Some(master) = self.master.as_ref() else {
            return Ok(());
        };
        master.resize(PtySize {
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
        })
    }

    fn shutdown(&mut self) {
        drop(self.master.take());
        if matches!(self.child.try_wait(), Ok(None)) {
            if let Err(e) = self.child.kill() {
                warn!("failed to kill shell: {e}");
            }
        }
        match self.child.wait() {
            Ok(status) => info!(?status, "shell reaped"),
            Err(e) => warn!("failed to reap shell: {e}"),
        }
    }
}
