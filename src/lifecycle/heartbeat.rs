//! Periodic liveness heartbeat.
//!
//! # Responsibilities
//! - Fire a recurring timer on the reactor (hourly by default)
//! - Hand each firing to a `HeartbeatReporter`
//!
//! A late firing (reactor busy) is simply delayed; the schedule resumes
//! from there. The timer is not tracked work, so it never holds up a
//! graceful exit.

use std::time::Duration;

use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

/// Default heartbeat period.
pub const HEARTBEAT_PERIOD: Duration = Duration::from_secs(60 * 60);

/// Receives heartbeat firings.
pub trait HeartbeatReporter: Send + 'static {
    fn report(&mut self);
}

#[derive(Debug, Error)]
pub enum HeartbeatError {
    #[error("heartbeat period must be non-zero")]
    ZeroPeriod,
}

/// A registered heartbeat timer.
#[derive(Debug)]
pub struct HeartbeatTimer {
    period: Duration,
    task: JoinHandle<()>,
}

impl HeartbeatTimer {
    /// Register and arm the timer. The first firing is one `period` from now.
    pub fn spawn<R>(handle: &Handle, period: Duration, mut reporter: R) -> Result<Self, HeartbeatError>
    where
        R: HeartbeatReporter,
    {
        if period.is_zero() {
            return Err(HeartbeatError::ZeroPeriod);
        }

        let task = handle.spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                reporter.report();
            }
        });

        tracing::debug!(period_secs = period.as_secs(), "Heartbeat armed");
        Ok(Self { period, task })
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Cancel the timer. Must happen before the reactor is dropped.
    pub fn cancel(self) {
        self.task.abort();
        tracing::debug!("Heartbeat cancelled");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::lifecycle::reactor::Reactor;

    #[derive(Clone, Default)]
    struct Counter(Arc<AtomicUsize>);

    impl Counter {
        fn get(&self) -> usize {
            self.0.load(Ordering::SeqCst)
        }
    }

    impl HeartbeatReporter for Counter {
        fn report(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn fires_once_per_period() {
        let reactor = Reactor::paused().unwrap();
        let counter = Counter::default();
        let timer = HeartbeatTimer::spawn(reactor.handle(), HEARTBEAT_PERIOD, counter.clone()).unwrap();
        assert_eq!(timer.period(), HEARTBEAT_PERIOD);

        reactor.block_on(async { time::sleep(HEARTBEAT_PERIOD - Duration::from_secs(1)).await });
        assert_eq!(counter.get(), 0);

        reactor.block_on(async { time::sleep(2 * HEARTBEAT_PERIOD + Duration::from_secs(2)).await });
        assert_eq!(counter.get(), 3);

        timer.cancel();
    }

    #[test]
    fn cancelled_timer_stops_firing() {
        let reactor = Reactor::paused().unwrap();
        let counter = Counter::default();
        let timer = HeartbeatTimer::spawn(reactor.handle(), Duration::from_secs(60), counter.clone()).unwrap();

        reactor.block_on(async { time::sleep(Duration::from_secs(61)).await });
        assert_eq!(counter.get(), 1);

        timer.cancel();
        reactor.block_on(async { time::sleep(Duration::from_secs(600)).await });
        assert_eq!(counter.get(), 1);
    }

    #[test]
    fn heartbeat_is_not_pending_work() {
        let reactor = Reactor::paused().unwrap();
        let _timer = HeartbeatTimer::spawn(reactor.handle(), Duration::from_secs(1), Counter::default()).unwrap();
        assert!(reactor.work().is_idle());
    }

    #[test]
    fn zero_period_is_rejected() {
        let reactor = Reactor::paused().unwrap();
        let result = HeartbeatTimer::spawn(reactor.handle(), Duration::ZERO, Counter::default());
        assert!(matches!(result, Err(HeartbeatError::ZeroPeriod)));
    }
}
