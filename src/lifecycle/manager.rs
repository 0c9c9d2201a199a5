//! Process lifecycle: ordered startup, the run loop, ordered teardown.
//!
//! # Responsibilities
//! - Create every core subsystem in dependency order, failing fatally
//!   on the first error
//! - Run the reactor's dispatch loop with the shutdown coordinator
//! - Release every subsystem exactly once, in reverse dependency order
//!
//! # Design Decisions
//! - `Lifecycle` owns the reactor, crypto and resolver outright; nothing
//!   else can free them
//! - `teardown` consumes `self`, so it cannot run twice
//! - A partial startup unwinds by drop: components built so far go out
//!   of scope in reverse order and the runtime cancels their tasks

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::crypto::{CryptoContext, CryptoError};
use crate::lifecycle::heartbeat::{HeartbeatError, HeartbeatTimer, HEARTBEAT_PERIOD};
use crate::lifecycle::reactor::{ExitMode, LoopControl, Reactor};
use crate::lifecycle::shutdown::{ShutdownActions, ShutdownCoordinator, ShutdownPhase};
use crate::lifecycle::signals::{self, SignalKind, SignalSender, SignalWatcher};
use crate::net::{ConnectionRegistry, ListenerError, ListenerRegistry, Resolver};
use crate::observability::status::StatusBoard;
use crate::protocol::TransportConfig;

/// Tunables for [`Lifecycle::initialize`].
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    pub heartbeat_period: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            heartbeat_period: HEARTBEAT_PERIOD,
        }
    }
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Failed to initialize cryptography: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Failed to initialize networking: {0}")]
    Reactor(#[source] io::Error),

    #[error("Failed to ignore SIGPIPE: {0}")]
    BrokenPipe(#[source] io::Error),

    #[error("Failed to initialize signal handling: {0}")]
    Signals(#[source] io::Error),

    #[error("Failed to initialize heartbeat logs: {0}")]
    Heartbeat(#[from] HeartbeatError),
}

/// A releasable part of the lifecycle, as listed in a [`TeardownReport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    HeartbeatTimer,
    InterruptWatcher,
    TerminateWatcher,
    Listeners,
    Reactor,
    Resolver,
    Crypto,
    ConnectionRegistry,
}

/// What teardown released, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub released: Vec<Component>,
}

impl TeardownReport {
    pub fn position(&self, component: Component) -> Option<usize> {
        self.released.iter().position(|c| *c == component)
    }
}

/// The running daemon's core. Built by [`Lifecycle::initialize`],
/// consumed by [`Lifecycle::teardown`].
pub struct Lifecycle {
    heartbeat: HeartbeatTimer,
    interrupt: SignalWatcher,
    terminate: SignalWatcher,
    listeners: ListenerRegistry,
    reactor: Reactor,
    resolver: Resolver,
    crypto: CryptoContext,
    connections: ConnectionRegistry,
    status: Arc<StatusBoard>,
    coordinator: ShutdownCoordinator,
}

impl Lifecycle {
    /// Bring up crypto, the reactor, the resolver, signal handling and the
    /// heartbeat, in that order.
    pub fn initialize(options: &LifecycleOptions) -> Result<Self, StartupError> {
        let crypto = CryptoContext::initialize()?;
        let reactor = Reactor::new().map_err(StartupError::Reactor)?;
        Self::assemble(crypto, reactor, options)
    }

    /// Initialize on a reactor whose clock starts paused.
    #[cfg(test)]
    pub(crate) fn initialize_paused(options: &LifecycleOptions) -> Result<Self, StartupError> {
        let crypto = CryptoContext::initialize()?;
        let reactor = Reactor::paused().map_err(StartupError::Reactor)?;
        Self::assemble(crypto, reactor, options)
    }

    fn assemble(crypto: CryptoContext, reactor: Reactor, options: &LifecycleOptions) -> Result<Self, StartupError> {
        let resolver = Resolver::new(reactor.handle());

        signals::ignore_broken_pipe(reactor.handle()).map_err(StartupError::BrokenPipe)?;

        let interrupt = SignalWatcher::register(reactor.handle(), SignalKind::Interrupt, reactor.signal_sender())
            .map_err(StartupError::Signals)?;
        let terminate = SignalWatcher::register(reactor.handle(), SignalKind::Terminate, reactor.signal_sender())
            .map_err(StartupError::Signals)?;

        let status = {
            let _enter = reactor.handle().enter();
            Arc::new(StatusBoard::new())
        };
        let heartbeat = HeartbeatTimer::spawn(reactor.handle(), options.heartbeat_period, Arc::clone(&status))?;

        let connections = ConnectionRegistry::new(Arc::clone(&status));
        let listeners = ListenerRegistry::new(connections.clone(), resolver.clone());

        tracing::debug!("Lifecycle initialized");
        Ok(Self {
            heartbeat,
            interrupt,
            terminate,
            listeners,
            reactor,
            resolver,
            crypto,
            connections,
            status,
            coordinator: ShutdownCoordinator::new(),
        })
    }

    /// Bind and start accepting for one transport configuration.
    pub fn open_listeners(&mut self, config: &TransportConfig) -> Result<SocketAddr, ListenerError> {
        self.listeners.open(&self.reactor, config)
    }

    /// Run the reactor until a shutdown signal's exit request is satisfied.
    pub fn run(&mut self) -> ExitMode {
        let control = self.reactor.control();
        let mut actions = LoopActions {
            listeners: &mut self.listeners,
            control: &control,
        };
        let exit = self.reactor.dispatch(&mut self.coordinator, &mut actions);
        tracing::debug!(exit = ?exit, phase = ?self.coordinator.phase(), "Event loop exited");
        exit
    }

    pub fn phase(&self) -> ShutdownPhase {
        self.coordinator.phase()
    }

    /// Sender into the reactor's signal run queue, for injecting events.
    pub fn signal_sender(&self) -> SignalSender {
        self.reactor.signal_sender()
    }

    pub fn reactor(&self) -> &Reactor {
        &self.reactor
    }

    pub fn status(&self) -> &Arc<StatusBoard> {
        &self.status
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn fill_random(&mut self, buf: &mut [u8]) {
        self.crypto.fill_random(buf);
    }

    /// Release everything, timers and watchers first, the reactor in the
    /// middle, the objects it served last.
    pub fn teardown(self) -> TeardownReport {
        tracing::info!("Exiting.");

        let Self {
            heartbeat,
            interrupt,
            terminate,
            mut listeners,
            reactor,
            resolver,
            crypto,
            connections,
            status,
            coordinator: _,
        } = self;
        let mut report = TeardownReport::default();

        heartbeat.cancel();
        report.released.push(Component::HeartbeatTimer);

        interrupt.release();
        report.released.push(Component::InterruptWatcher);

        terminate.release();
        report.released.push(Component::TerminateWatcher);

        listeners.close_all();
        drop(listeners);
        report.released.push(Component::Listeners);

        reactor.shutdown();
        report.released.push(Component::Reactor);

        resolver.shutdown();
        report.released.push(Component::Resolver);

        crypto.shutdown();
        report.released.push(Component::Crypto);

        connections.close_all();
        status.clear();
        report.released.push(Component::ConnectionRegistry);

        report
    }
}

/// The coordinator's view of the lifecycle during dispatch.
struct LoopActions<'a> {
    listeners: &'a mut ListenerRegistry,
    control: &'a LoopControl,
}

impl ShutdownActions for LoopActions<'_> {
    fn close_listeners(&mut self) {
        self.listeners.close_all();
    }

    fn request_loop_exit(&mut self, mode: ExitMode) {
        self.control.request_exit(mode);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn teardown_releases_in_dependency_order() {
        let lifecycle = Lifecycle::initialize(&LifecycleOptions::default()).unwrap();
        let report = lifecycle.teardown();

        assert_eq!(
            report.released,
            vec![
                Component::HeartbeatTimer,
                Component::InterruptWatcher,
                Component::TerminateWatcher,
                Component::Listeners,
                Component::Reactor,
                Component::Resolver,
                Component::Crypto,
                Component::ConnectionRegistry,
            ]
        );

        let reactor = report.position(Component::Reactor).unwrap();
        for before in [Component::HeartbeatTimer, Component::InterruptWatcher, Component::TerminateWatcher] {
            assert!(report.position(before).unwrap() < reactor);
        }
        for after in [Component::Resolver, Component::Crypto] {
            assert!(report.position(after).unwrap() > reactor);
        }
    }

    #[test]
    fn heartbeat_leaves_shutdown_phase_alone() {
        let options = LifecycleOptions {
            heartbeat_period: Duration::from_secs(60),
        };
        let mut lifecycle = Lifecycle::initialize_paused(&options).unwrap();

        lifecycle
            .reactor()
            .spawn_work(async { tokio::time::sleep(Duration::from_secs(150)).await });
        lifecycle.signal_sender().send(SignalKind::Interrupt).unwrap();

        assert_eq!(lifecycle.run(), ExitMode::Graceful);
        assert_eq!(lifecycle.status().heartbeats(), 2);
        assert_eq!(lifecycle.phase(), ShutdownPhase::DrainingAfterFirstSignal);

        lifecycle.teardown();
    }

    #[test]
    fn terminate_ends_run_forcefully() {
        let mut lifecycle = Lifecycle::initialize_paused(&LifecycleOptions::default()).unwrap();
        lifecycle
            .reactor()
            .spawn_work(async { tokio::time::sleep(Duration::from_secs(3_600)).await });
        lifecycle.signal_sender().send(SignalKind::Terminate).unwrap();

        assert_eq!(lifecycle.run(), ExitMode::Forceful);
        assert_eq!(lifecycle.phase(), ShutdownPhase::Terminating);
        assert_eq!(lifecycle.teardown().released.len(), 8);
    }

    #[test]
    fn zero_heartbeat_period_is_fatal() {
        let options = LifecycleOptions {
            heartbeat_period: Duration::ZERO,
        };
        let result = Lifecycle::initialize(&options);
        assert!(matches!(result, Err(StartupError::Heartbeat(HeartbeatError::ZeroPeriod))));
    }

    #[test]
    fn crypto_is_available_while_running() {
        let mut lifecycle = Lifecycle::initialize(&LifecycleOptions::default()).unwrap();
        let mut buf = [0u8; 16];
        lifecycle.fill_random(&mut buf);
        assert_eq!(lifecycle.listener_count(), 0);
        lifecycle.teardown();
    }
}
