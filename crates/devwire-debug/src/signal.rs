use tracing::{error, info};

use crate::error::Result;
use crate::scanner::PacketScanner;
use crate::tee::ChunkSink;

/// Exit code used when the debugged process is killed.
pub const KILLED_EXIT_CODE: i32 = 137;

/// What to do when a kill stop-reply is seen.
pub trait KillAction {
    /// `stop_reply` is the payload of the packet that triggered the kill.
    fn kill(&mut self, stop_reply: &str);
}

impl<F: FnMut(&str)> KillAction for F {
    fn kill(&mut self, stop_reply: &str) {
        self(stop_reply)
    }
}

/// Terminates the host process immediately.
#[derive(Debug, Clone, Copy)]
pub struct ProcessExit {
    pub code: i32,
}

impl Default for ProcessExit {
    fn default() -> Self {
        Self {
            code: KILLED_EXIT_CODE,
        }
    }
}

impl KillAction for ProcessExit {
    fn kill(&mut self, stop_reply: &str) {
        error!(stop_reply, code = self.code, "debugged process killed, exiting");
        std::process::exit(self.code);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOutcome {
    Continue,
    Killed,
}

/// Watches inbound packets for a stop-reply carrying the kill signal.
///
/// A packet triggers when its payload starts with `T` or `S` and its third
/// byte is `9`. The action runs once; afterwards the watcher stays
/// [`WatchOutcome::Killed`].
#[derive(Debug)]
pub struct SignalWatcher<K = ProcessExit> {
    scanner: PacketScanner,
    action: K,
    outcome: WatchOutcome,
}

impl Default for SignalWatcher<ProcessExit> {
    fn default() -> Self {
        Self::new(ProcessExit::default())
    }
}

impl<K: KillAction> SignalWatcher<K> {
    pub fn new(action: K) -> Self {
        Self {
            scanner: PacketScanner::new(),
            action,
            outcome: WatchOutcome::Continue,
        }
    }

    pub fn feed(&mut self, chunk: &[u8]) -> WatchOutcome {
        if self.outcome == WatchOutcome::Killed {
            return self.outcome;
        }
        for packet in self.scanner.feed(chunk) {
            if is_kill_stop_reply(&packet.payload) {
                let stop_reply = String::from_utf8_lossy(&packet.payload);
                info!(stop_reply = %stop_reply, "kill signal detected");
                self.outcome = WatchOutcome::Killed;
                self.action.kill(&stop_reply);
                break;
            }
        }
        self.outcome
    }

    pub fn outcome(&self) -> WatchOutcome {
        self.outcome
    }
}

impl<K: KillAction> ChunkSink for SignalWatcher<K> {
    fn accept(&mut self, chunk: &[u8]) -> Result<()> {
        self.feed(chunk);
        Ok(())
    }
}

fn is_kill_stop_reply(payload: &[u8]) -> bool {
    matches!(payload.first(), Some(b'T' | b'S')) && payload.get(2) == Some(&b'9')
}
