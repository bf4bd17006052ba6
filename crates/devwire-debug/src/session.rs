use std::fmt;
use std::io::{ErrorKind, Read, Write};

use devwire_transport::{DeviceRef, DuplexStream, ServiceProvider};
use tracing::{debug, info};

use crate::error::{DebugError, Result};
use crate::launch::{self, HandshakeStep};
use crate::output::OutputAdapter;
use crate::signal::{KillAction, ProcessExit, SignalWatcher, WatchOutcome};
use crate::tee::{ChunkSink, Tee};

/// Service name of the on-device debug server.
pub const DEBUG_SERVICE: &str = "com.apple.debugserver";

/// Default size of a single stream read.
pub const DEFAULT_READ_CHUNK: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Handshaking,
    Running,
    Terminated,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Created => "created",
            SessionState::Handshaking => "handshaking",
            SessionState::Running => "running",
            SessionState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Why a session reached [`SessionState::Terminated`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The watcher saw the kill signal.
    Killed,
    /// `D` was sent.
    Detached,
    /// The debug server closed the stream.
    Disconnected,
}

#[derive(Debug, Clone)]
pub struct DebugConfig {
    /// Send `D` instead of `vCont;c` after launching.
    pub launch_only: bool,
    /// Drop console packets whose checksum does not match.
    pub strict_checksums: bool,
    pub read_chunk_size: usize,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            launch_only: false,
            strict_checksums: false,
            read_chunk_size: DEFAULT_READ_CHUNK,
        }
    }
}

/// A remote-debug session over one debug-server stream.
///
/// `Created` → (handshake steps 1-6) → `Handshaking` → (resume directive)
/// → `Running` → (kill signal, detach or end of stream) → `Terminated`.
pub struct DebugSession<S, K = ProcessExit> {
    stream: S,
    config: DebugConfig,
    state: SessionState,
    termination: Option<Termination>,
    watcher: SignalWatcher<K>,
    adapter: OutputAdapter,
}

impl<S: Read + Write> DebugSession<S, ProcessExit> {
    pub fn new(stream: S, config: DebugConfig) -> Self {
        Self::with_kill_action(stream, config, ProcessExit::default())
    }
}

impl<S: DuplexStream> DebugSession<S, ProcessExit> {
    /// Open the debug service on `device`.
    pub fn open<P>(
        provider: &P,
        device: &DeviceRef,
        service: &str,
        config: DebugConfig,
    ) -> Result<Self>
    where
        P: ServiceProvider<Stream = S>,
    {
        let stream = provider.open_service(device, service)?;
        debug!(%device, service, "opened debug service");
        Ok(Self::new(stream, config))
    }
}

impl<S: Read + Write, K: KillAction> DebugSession<S, K> {
    pub fn with_kill_action(stream: S, config: DebugConfig, action: K) -> Self {
        let adapter = OutputAdapter::new().with_strict_checksums(config.strict_checksums);
        Self {
            stream,
            config,
            state: SessionState::Created,
            termination: None,
            watcher: SignalWatcher::new(action),
            adapter,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn termination(&self) -> Option<Termination> {
        self.termination
    }

    /// Run the launch handshake for `args` (program path first).
    ///
    /// Ends `Running`, or `Terminated` when configured launch-only. A failed
    /// write leaves the session `Terminated` as well.
    pub fn launch<I, A>(&mut self, args: I) -> Result<()>
    where
        I: IntoIterator<Item = A>,
        A: AsRef<str>,
    {
        self.require(SessionState::Created, "launch")?;
        let steps = launch::launch_steps(args)?;
        let resume = launch::resume_step(self.config.launch_only)?;

        for step in &steps {
            self.write_launch_step(step)?;
        }
        self.state = SessionState::Handshaking;
        debug!("handshake sent");

        self.write_launch_step(&resume)?;
        if self.config.launch_only {
            self.terminate(Termination::Detached);
        } else {
            self.state = SessionState::Running;
            info!("process resumed");
        }
        Ok(())
    }

    /// Send `D` and end the session.
    pub fn detach(&mut self) -> Result<()> {
        if !matches!(self.state, SessionState::Handshaking | SessionState::Running) {
            return Err(DebugError::InvalidState {
                operation: "detach",
                state: self.state,
            });
        }
        self.write_step(&launch::resume_step(true)?)?;
        self.terminate(Termination::Detached);
        Ok(())
    }

    /// Read one chunk and fan it out to the output adapter, then the signal
    /// watcher. Decoded console text goes to `console` before any kill runs.
    pub fn pump<W: Write>(&mut self, console: &mut W) -> Result<SessionState> {
        self.require(SessionState::Running, "pump")?;

        let mut chunk = vec![0u8; self.config.read_chunk_size.max(1)];
        let read = loop {
            match self.stream.read(&mut chunk) {
                Ok(n) => break n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(DebugError::Io(err)),
            }
        };

        if read == 0 {
            let tail = self.adapter.finish();
            write_console(console, &tail)?;
            self.terminate(Termination::Disconnected);
            return Ok(self.state);
        }

        let mut console_sink = ConsoleSink {
            adapter: &mut self.adapter,
            console,
        };
        Tee::new()
            .register(&mut console_sink)
            .register(&mut self.watcher)
            .dispatch(&chunk[..read])?;

        if self.watcher.outcome() == WatchOutcome::Killed {
            self.terminate(Termination::Killed);
        }
        Ok(self.state)
    }

    /// Pump until the session terminates.
    pub fn run_until_terminated<W: Write>(&mut self, console: &mut W) -> Result<Termination> {
        loop {
            if self.pump(console)? == SessionState::Terminated {
                return Ok(self.termination.unwrap_or(Termination::Disconnected));
            }
        }
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    fn require(&self, expected: SessionState, operation: &'static str) -> Result<()> {
        if self.state != expected {
            return Err(DebugError::InvalidState {
                operation,
                state: self.state,
            });
        }
        Ok(())
    }

    fn write_step(&mut self, step: &HandshakeStep) -> Result<()> {
        let bytes = step.to_bytes();
        self.stream.write_all(&bytes).map_err(DebugError::Write)?;
        self.stream.flush().map_err(DebugError::Write)?;
        debug!(packet = %String::from_utf8_lossy(&bytes), "sent");
        Ok(())
    }

    fn write_launch_step(&mut self, step: &HandshakeStep) -> Result<()> {
        let result = self.write_step(step);
        if let Err(err) = &result {
            debug!(error = %err, "handshake write failed");
            self.terminate(Termination::Disconnected);
        }
        result
    }

    fn terminate(&mut self, reason: Termination) {
        info!(?reason, "session terminated");
        self.state = SessionState::Terminated;
        self.termination = Some(reason);
    }
}

struct ConsoleSink<'a, W> {
    adapter: &'a mut OutputAdapter,
    console: &'a mut W,
}

impl<W: Write> ChunkSink for ConsoleSink<'_, W> {
    fn accept(&mut self, chunk: &[u8]) -> Result<()> {
        let text = self.adapter.feed(chunk);
        write_console(self.console, &text)
    }
}

fn write_console<W: Write>(console: &mut W, text: &str) -> Result<()> {
    if text.is_empty() {
        return Ok(());
    }
    console
        .write_all(text.as_bytes())
        .and_then(|()| console.flush())
        .map_err(DebugError::Console)
}
