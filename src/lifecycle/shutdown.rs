//! Shutdown coordination for the proxy.
//!
//! Turns interrupt/terminate events into listener closure and loop-exit
//! requests:
//! - SIGINT, first time: stop accepting, keep existing connections,
//!   exit once they have all closed
//! - SIGINT, again: exit now
//! - SIGTERM: exit now, in any phase

use crate::lifecycle::reactor::ExitMode;
use crate::lifecycle::signals::SignalKind;
use crate::observability::metrics;

/// Where the process is in its shutdown. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum ShutdownPhase {
    #[default]
    Running,
    DrainingAfterFirstSignal,
    Terminating,
}

/// What the coordinator can ask of the rest of the process.
pub trait ShutdownActions {
    /// Stop accepting new connections. Must be idempotent.
    fn close_listeners(&mut self);

    /// Ask the reactor loop to stop.
    fn request_loop_exit(&mut self, mode: ExitMode);
}

/// Owns the shutdown phase.
///
/// `on_signal` runs on the reactor thread, one event at a time.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    phase: ShutdownPhase,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> ShutdownPhase {
        self.phase
    }

    /// Handle one signal event.
    pub fn on_signal<A>(&mut self, kind: SignalKind, actions: &mut A)
    where
        A: ShutdownActions + ?Sized,
    {
        metrics::record_signal(kind);

        match kind {
            SignalKind::Interrupt => {
                actions.close_listeners();
                if self.phase == ShutdownPhase::Running {
                    tracing::info!("Got SIGINT. Preparing shutdown.");
                    actions.request_loop_exit(ExitMode::Graceful);
                    self.advance(ShutdownPhase::DrainingAfterFirstSignal);
                } else {
                    tracing::info!("Got SIGINT for the second time. Terminating.");
                    actions.request_loop_exit(ExitMode::Forceful);
                    self.advance(ShutdownPhase::Terminating);
                }
            }
            SignalKind::Terminate => {
                tracing::info!("Got SIGTERM. Terminating.");
                actions.close_listeners();
                actions.request_loop_exit(ExitMode::Forceful);
                self.advance(ShutdownPhase::Terminating);
            }
        }
    }

    fn advance(&mut self, next: ShutdownPhase) {
        if next > self.phase {
            tracing::debug!(from = ?self.phase, to = ?next, "Shutdown phase advanced");
            self.phase = next;
        }
    }
}
