//! Game ticks and cancellable timers for the manhunt session actor.
//!
//! Everything periodic in a round (the countdown ticker, the disconnect
//! timeout sweep, the promotion-readiness poll, batched drains) is a timer
//! that delivers a message into the session actor's command channel. The
//! actor stays the only writer of session state; timers never touch it.
//!
//! # Stale ticks
//!
//! Cancelling a timer aborts its task, but a message the task already put
//! in the channel is still delivered. Every timer is therefore started with
//! a fresh [`TimerToken`], the message carries that token, and the actor
//! drops any message whose token is no longer current:
//!
//! ```ignore
//! Command::CountdownTick { token } => {
//!     if !self.timers.is_current(TimerKind::Countdown, token) {
//!         return; // cancelled after this tick was queued
//!     }
//!     ...
//! }
//! ```
//!
//! Dropping a [`TimerSet`] aborts every timer it owns, so a timer can never
//! outlive the round state it was started for.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Ticks
// ---------------------------------------------------------------------------

/// A duration measured in server game ticks (20 per second).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Ticks(pub u64);

impl Ticks {
    pub const PER_SECOND: u64 = 20;

    /// One game tick: the smallest delay between two batches of work.
    pub const ONE: Ticks = Ticks(1);

    pub const fn from_secs(secs: u64) -> Self {
        Self(secs * Self::PER_SECOND)
    }

    /// Wall-clock length (50 ms per tick).
    pub const fn as_duration(self) -> Duration {
        Duration::from_millis(self.0 * (1000 / Self::PER_SECOND))
    }

    /// Whole seconds, rounded down.
    pub const fn as_secs(self) -> u64 {
        self.0 / Self::PER_SECOND
    }
}

impl fmt::Display for Ticks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}t", self.0)
    }
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// What a repeating timer does when the actor falls behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TickPolicy {
    /// Skip missed ticks and stay on the original cadence.
    /// Right for countdowns: a late second must not fire twice.
    #[default]
    Skip,
    /// Restart the cadence from the late tick.
    Delay,
    /// Fire every missed tick back to back.
    Burst,
}

impl TickPolicy {
    fn missed_tick_behavior(self) -> MissedTickBehavior {
        match self {
            Self::Skip => MissedTickBehavior::Skip,
            Self::Delay => MissedTickBehavior::Delay,
            Self::Burst => MissedTickBehavior::Burst,
        }
    }
}

// ---------------------------------------------------------------------------
// TimerSet
// ---------------------------------------------------------------------------

/// Identifies one start of a timer. Later starts of the same kind get new
/// tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken(u64);

impl fmt::Display for TimerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct ActiveTimer {
    token: TimerToken,
    task: JoinHandle<()>,
}

/// At most one running timer per kind `K`.
///
/// Starting a timer of a kind that is already running replaces (and
/// aborts) the old one.
pub struct TimerSet<K> {
    next_token: u64,
    active: HashMap<K, ActiveTimer>,
}

impl<K> Default for TimerSet<K> {
    fn default() -> Self {
        Self {
            next_token: 0,
            active: HashMap::new(),
        }
    }
}

impl<K: Copy + Eq + Hash + fmt::Debug> TimerSet<K> {
    pub fn new() -> Self {
        Self::default()
    }

    fn issue(&mut self) -> TimerToken {
        self.next_token += 1;
        TimerToken(self.next_token)
    }

    fn install(&mut self, kind: K, token: TimerToken, task: JoinHandle<()>) {
        if let Some(old) = self.active.insert(kind, ActiveTimer { token, task }) {
            debug!(?kind, old = %old.token, new = %token, "timer replaced");
            old.task.abort();
        }
    }

    /// Sends `make(token)` into `sender` every `period`, first after one
    /// full period. Stops when cancelled or when the receiver is gone.
    pub fn repeat<M, F>(
        &mut self,
        kind: K,
        period: Duration,
        policy: TickPolicy,
        sender: mpsc::Sender<M>,
        make: F,
    ) -> TimerToken
    where
        M: Send + 'static,
        F: Fn(TimerToken) -> M + Send + 'static,
    {
        let token = self.issue();
        if period.is_zero() {
            warn!(?kind, "zero timer period, using one tick");
        }
        let period = period.max(Ticks::ONE.as_duration());
        let task = tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(policy.missed_tick_behavior());
            loop {
                interval.tick().await;
                trace!(%token, "repeating timer fired");
                if sender.send(make(token)).await.is_err() {
                    break;
                }
            }
        });
        self.install(kind, token, task);
        debug!(?kind, %token, period_ms = period.as_millis() as u64, "repeating timer started");
        token
    }

    /// Sends `make(token)` into `sender` once, after `delay`.
    ///
    /// The timer stays current until [`finish`](Self::finish) or
    /// [`cancel`](Self::cancel) is called for it.
    pub fn later<M, F>(
        &mut self,
        kind: K,
        delay: Duration,
        sender: mpsc::Sender<M>,
        make: F,
    ) -> TimerToken
    where
        M: Send + 'static,
        F: FnOnce(TimerToken) -> M + Send + 'static,
    {
        let token = self.issue();
        let task = tokio::spawn(async move {
            time::sleep(delay).await;
            trace!(%token, "one-shot timer fired");
            let _ = sender.send(make(token)).await;
        });
        self.install(kind, token, task);
        debug!(?kind, %token, delay_ms = delay.as_millis() as u64, "one-shot timer started");
        token
    }

    /// Whether `token` belongs to the running timer of `kind`.
    pub fn is_current(&self, kind: K, token: TimerToken) -> bool {
        self.active.get(&kind).is_some_and(|t| t.token == token)
    }

    /// Retires a fired one-shot. Returns `false` (and leaves the set
    /// untouched) if `token` is stale.
    pub fn finish(&mut self, kind: K, token: TimerToken) -> bool {
        if !self.is_current(kind, token) {
            return false;
        }
        self.active.remove(&kind);
        true
    }

    /// Stops the timer of `kind`. Returns `true` if one was running.
    pub fn cancel(&mut self, kind: K) -> bool {
        match self.active.remove(&kind) {
            Some(timer) => {
                timer.task.abort();
                debug!(?kind, token = %timer.token, "timer cancelled");
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self, kind: K) -> bool {
        self.active.contains_key(&kind)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn cancel_all(&mut self) {
        for (_, timer) in self.active.drain() {
            timer.task.abort();
        }
    }
}

impl<K> Drop for TimerSet<K> {
    fn drop(&mut self) {
        for timer in self.active.values() {
            timer.task.abort();
        }
    }
}
