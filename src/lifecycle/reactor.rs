//! The single-threaded reactor and its loop-exit primitives.
//!
//! # Responsibilities
//! - Own the current-thread Tokio runtime that drives all I/O, timers
//!   and signal notifications
//! - Track pending work (accepted connections) for graceful exit
//! - Run the dispatch loop that feeds signal events to the shutdown
//!   coordinator until an exit request is satisfied

use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::lifecycle::shutdown::{ShutdownActions, ShutdownCoordinator};
use crate::lifecycle::signals::{SignalKind, SignalSender};

/// How long shutdown waits for blocking-pool threads (name lookups)
/// before leaving them behind.
const BLOCKING_SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// How the reactor loop should stop. Forceful outranks graceful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ExitMode {
    /// Stop once no tracked work remains.
    Graceful,
    /// Stop now, regardless of pending work.
    Forceful,
}

/// Handle for requesting loop exit.
#[derive(Debug, Clone)]
pub struct LoopControl {
    tx: Arc<watch::Sender<Option<ExitMode>>>,
}

impl LoopControl {
    /// Request loop exit. Requests only escalate: a graceful request
    /// never replaces a forceful one.
    pub fn request_exit(&self, mode: ExitMode) {
        let changed = self.tx.send_if_modified(|current| match current {
            Some(previous) if *previous >= mode => false,
            _ => {
                *current = Some(mode);
                true
            }
        });
        if changed {
            tracing::debug!(mode = ?mode, "Loop exit requested");
        }
    }

    /// The strongest exit request so far, if any.
    pub fn requested(&self) -> Option<ExitMode> {
        *self.tx.borrow()
    }
}

/// Counts pending units of work (connections, tracked tasks).
#[derive(Debug, Clone)]
pub struct WorkTracker {
    pending: Arc<watch::Sender<usize>>,
}

impl WorkTracker {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self { pending: Arc::new(tx) }
    }

    /// Record a new unit of work. Returns a guard that completes it on drop.
    pub fn track(&self) -> WorkGuard {
        self.pending.send_modify(|n| *n += 1);
        WorkGuard {
            pending: Arc::clone(&self.pending),
        }
    }

    pub fn pending(&self) -> usize {
        *self.pending.borrow()
    }

    pub fn is_idle(&self) -> bool {
        self.pending() == 0
    }

    /// Wait until no work is pending.
    pub async fn idle(&self) {
        let mut rx = self.pending.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

impl Default for WorkTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Marks one unit of pending work. Completes the work when dropped.
#[derive(Debug)]
pub struct WorkGuard {
    pending: Arc<watch::Sender<usize>>,
}

impl Drop for WorkGuard {
    fn drop(&mut self) {
        self.pending.send_modify(|n| *n = n.saturating_sub(1));
    }
}

/// Spawns tracked work onto the reactor from inside reactor tasks.
#[derive(Debug, Clone)]
pub struct WorkSpawner {
    handle: Handle,
    work: WorkTracker,
}

impl WorkSpawner {
    /// Spawn `future` as pending work: graceful exit waits for it.
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let guard = self.work.track();
        self.handle.spawn(async move {
            let _guard = guard;
            future.await
        })
    }
}

/// The event reactor. Exclusively owned by the lifecycle manager.
pub struct Reactor {
    runtime: Runtime,
    work: WorkTracker,
    control: LoopControl,
    exit_rx: watch::Receiver<Option<ExitMode>>,
    signal_tx: SignalSender,
    signal_rx: mpsc::UnboundedReceiver<SignalKind>,
}

impl Reactor {
    pub fn new() -> io::Result<Self> {
        Self::with_builder(Builder::new_current_thread())
    }

    /// A reactor whose clock starts paused and auto-advances when idle.
    #[cfg(test)]
    pub(crate) fn paused() -> io::Result<Self> {
        let mut builder = Builder::new_current_thread();
        builder.start_paused(true);
        Self::with_builder(builder)
    }

    fn with_builder(mut builder: Builder) -> io::Result<Self> {
        let runtime = builder.enable_all().build()?;
        let (exit_tx, exit_rx) = watch::channel(None);
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();

        Ok(Self {
            runtime,
            work: WorkTracker::new(),
            control: LoopControl {
                tx: Arc::new(exit_tx),
            },
            exit_rx,
            signal_tx,
            signal_rx,
        })
    }

    pub fn handle(&self) -> &Handle {
        self.runtime.handle()
    }

    pub fn control(&self) -> LoopControl {
        self.control.clone()
    }

    pub fn work(&self) -> &WorkTracker {
        &self.work
    }

    pub fn spawner(&self) -> WorkSpawner {
        WorkSpawner {
            handle: self.runtime.handle().clone(),
            work: self.work.clone(),
        }
    }

    /// Sender for the run queue that signal watchers post into.
    pub fn signal_sender(&self) -> SignalSender {
        self.signal_tx.clone()
    }

    /// Spawn tracked work: graceful exit waits for it to finish.
    pub fn spawn_work<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.spawner().spawn(future)
    }

    /// Drive `future` to completion on the reactor. Setup and tests only;
    /// the daemon runs through [`Reactor::dispatch`].
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    /// Run the loop until an exit request is satisfied.
    ///
    /// Signal events are handed to `coordinator` one at a time, on this
    /// thread. Returns the exit mode that ended the loop.
    pub fn dispatch<A>(&mut self, coordinator: &mut ShutdownCoordinator, actions: &mut A) -> ExitMode
    where
        A: ShutdownActions + ?Sized,
    {
        let Self {
            runtime,
            work,
            exit_rx,
            signal_rx,
            ..
        } = self;

        runtime.block_on(async {
            loop {
                let requested = *exit_rx.borrow_and_update();
                match requested {
                    Some(ExitMode::Forceful) => break ExitMode::Forceful,
                    Some(ExitMode::Graceful) if work.is_idle() => break ExitMode::Graceful,
                    _ => {}
                }

                tokio::select! {
                    Some(kind) = signal_rx.recv() => coordinator.on_signal(kind, &mut *actions),
                    changed = exit_rx.changed() => {
                        if changed.is_err() {
                            break ExitMode::Forceful;
                        }
                    }
                    _ = work.idle(), if requested == Some(ExitMode::Graceful) => {}
                }
            }
        })
    }

    /// Shut the runtime down, cancelling every task still on it.
    /// Blocking threads still running after a short grace are abandoned.
    pub fn shutdown(self) {
        let pending = self.work.pending();
        if pending > 0 {
            tracing::debug!(pending, "Cancelling pending work");
        }
        self.runtime.shutdown_timeout(BLOCKING_SHUTDOWN_GRACE);
    }
}
