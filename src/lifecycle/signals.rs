//! OS signal handling.
//!
//! # Responsibilities
//! - Register watchers for SIGINT and SIGTERM on the reactor
//! - Forward each delivery as a `SignalKind` message into the reactor's
//!   run queue
//! - Keep SIGPIPE from killing the process on a broken network write
//!
//! # Design Decisions
//! - Uses Tokio's signal handling: the OS handler only wakes the
//!   reactor, all decisions happen in the dispatch loop
//! - Watchers are owned handles so teardown can release them before
//!   the reactor goes away

use std::fmt;
use std::io;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A shutdown-relevant signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    Interrupt,
    Terminate,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Interrupt => "SIGINT",
            SignalKind::Terminate => "SIGTERM",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sending half of the reactor's signal run queue.
pub type SignalSender = mpsc::UnboundedSender<SignalKind>;

/// A registered signal watcher bound to the reactor.
#[derive(Debug)]
pub struct SignalWatcher {
    kind: SignalKind,
    task: JoinHandle<()>,
}

impl SignalWatcher {
    /// Register a watcher for `kind` that posts into `events`.
    pub fn register(handle: &Handle, kind: SignalKind, events: SignalSender) -> io::Result<Self> {
        let _enter = handle.enter();
        let task = spawn_forwarder(handle, kind, events)?;
        tracing::debug!(signal = %kind, "Signal watcher registered");
        Ok(Self { kind, task })
    }

    pub fn kind(&self) -> SignalKind {
        self.kind
    }

    /// Stop watching. The OS-level handler stays installed, so later
    /// deliveries are swallowed rather than killing the process.
    pub fn release(self) {
        self.task.abort();
        tracing::debug!(signal = %self.kind, "Signal watcher released");
    }
}

#[cfg(unix)]
fn spawn_forwarder(handle: &Handle, kind: SignalKind, events: SignalSender) -> io::Result<JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind as UnixSignal};

    let mut stream = match kind {
        SignalKind::Interrupt => signal(UnixSignal::interrupt())?,
        SignalKind::Terminate => signal(UnixSignal::terminate())?,
    };
    Ok(handle.spawn(async move {
        while stream.recv().await.is_some() {
            if events.send(kind).is_err() {
                break;
            }
        }
    }))
}

#[cfg(windows)]
fn spawn_forwarder(handle: &Handle, kind: SignalKind, events: SignalSender) -> io::Result<JoinHandle<()>> {
    use tokio::signal::windows;

    match kind {
        SignalKind::Interrupt => {
            let mut stream = windows::ctrl_c()?;
            Ok(handle.spawn(async move {
                while stream.recv().await.is_some() {
                    if events.send(kind).is_err() {
                        break;
                    }
                }
            }))
        }
        SignalKind::Terminate => {
            let mut stream = windows::ctrl_close()?;
            Ok(handle.spawn(async move {
                while stream.recv().await.is_some() {
                    if events.send(kind).is_err() {
                        break;
                    }
                }
            }))
        }
    }
}

/// Make broken-pipe writes surface as `io::Error` instead of SIGPIPE.
///
/// Installing a Tokio handler replaces the default (terminating)
/// disposition for the rest of the process; the stream itself is not
/// needed.
#[cfg(unix)]
pub fn ignore_broken_pipe(handle: &Handle) -> io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind as UnixSignal};

    let _enter = handle.enter();
    drop(signal(UnixSignal::pipe())?);
    tracing::debug!("SIGPIPE ignored");
    Ok(())
}

#[cfg(not(unix))]
pub fn ignore_broken_pipe(_handle: &Handle) -> io::Result<()> {
    Ok(())
}
