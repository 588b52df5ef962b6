//! Ping/pong liveness tracking for one open socket.

use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at, sleep_until};

/// What the driver should do on a heartbeat tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Beat {
    /// Peer is alive; send the next ping.
    Ping,
    /// No pong within the timeout; the socket is dead.
    TimedOut,
}

/// Created when the socket opens, dropped when it closes.
///
/// The first tick fires one interval after start. The liveness deadline is
/// `last_pong + timeout` and runs independently of the ping ticker, so a
/// silent peer is detected exactly `timeout` after its last pong.
pub(crate) struct Heartbeat {
    ticker: Interval,
    timeout: Duration,
    last_pong: Instant,
}

impl Heartbeat {
    pub(crate) fn start(interval: Duration, timeout: Duration) -> Self {
        let now = Instant::now();
        let mut ticker = interval_at(now + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            ticker,
            timeout,
            last_pong: now,
        }
    }

    /// Record a pong.
    pub(crate) fn mark_alive(&mut self) {
        self.last_pong = Instant::now();
    }

    pub(crate) fn since_last_pong(&self) -> Duration {
        self.last_pong.elapsed()
    }

    /// Wait for the next ping tick or the liveness deadline, whichever
    /// comes first. Cancel-safe.
    pub(crate) async fn tick(&mut self) -> Beat {
        let deadline = self.last_pong + self.timeout;
        tokio::select! {
            biased;
            () = sleep_until(deadline) => Beat::TimedOut,
            _ = self.ticker.tick() => {
                if self.last_pong.elapsed() >= self.timeout {
                    Beat::TimedOut
                } else {
                    Beat::Ping
                }
            }
        }
    }
}
