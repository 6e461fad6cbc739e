//! Transaction timers
//!
//! RFC 3261 defines ten timers for the four transaction state machines:
//!
//! - **Timer A** (INVITE client): request retransmission, starts at T1 and doubles
//! - **Timer B** (INVITE client): transaction timeout, 64*T1
//! - **Timer D** (INVITE client): wait for response retransmissions, 32s
//! - **Timer E** (non-INVITE client): request retransmission, doubles up to T2
//! - **Timer F** (non-INVITE client): transaction timeout, 64*T1
//! - **Timer K** (non-INVITE client): wait for response retransmissions, T4
//! - **Timer G** (INVITE server): response retransmission, doubles up to T2
//! - **Timer H** (INVITE server): wait for ACK, 64*T1
//! - **Timer I** (INVITE server): wait for ACK retransmissions, T4
//! - **Timer J** (non-INVITE server): wait for request retransmissions, 64*T1
//!
//! Over a reliable transport the retransmission timers (A, E, G) are never
//! armed and the wait timers (D, I, J, K) are zero.
//!
//! Timers are plain data. Nothing here sleeps: the engine's timer evaluator
//! compares each armed slot against "now" and queues a timeout event.

use std::time::Duration;

use tokio::time::Instant;

/// RFC 3261 base timer values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerSettings {
    /// Round-trip estimate, 500ms
    pub t1: Duration,
    /// Maximum retransmission interval for non-INVITE requests and INVITE responses, 4s
    pub t2: Duration,
    /// Maximum time a message stays in the network, 5s
    pub t4: Duration,
}

impl Default for TimerSettings {
    fn default() -> Self {
        TimerSettings {
            t1: Duration::from_millis(500),
            t2: Duration::from_secs(4),
            t4: Duration::from_secs(5),
        }
    }
}

impl TimerSettings {
    /// 64*T1, used for timers B, F, H and J
    pub fn transaction_timeout(&self) -> Duration {
        self.t1 * 64
    }

    pub fn timer_d(&self, reliable: bool) -> Duration {
        if reliable { Duration::ZERO } else { Duration::from_secs(32) }
    }

    pub fn timer_i(&self, reliable: bool) -> Duration {
        if reliable { Duration::ZERO } else { self.t4 }
    }

    pub fn timer_j(&self, reliable: bool) -> Duration {
        if reliable { Duration::ZERO } else { self.transaction_timeout() }
    }

    pub fn timer_k(&self, reliable: bool) -> Duration {
        if reliable { Duration::ZERO } else { self.t4 }
    }

    /// Next retransmission interval, doubled and capped at T2
    pub fn backoff(&self, current: Duration) -> Duration {
        (current * 2).min(self.t2)
    }
}

/// One timer: a length and the instant it was started
///
/// `None` in either field means the timer is inactive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimerSlot {
    pub length: Option<Duration>,
    pub start: Option<Instant>,
}

impl TimerSlot {
    pub fn arm(&mut self, length: Duration, now: Instant) {
        self.length = Some(length);
        self.start = Some(now);
    }

    pub fn disarm(&mut self) {
        *self = TimerSlot::default();
    }

    pub fn is_active(&self) -> bool {
        self.length.is_some() && self.start.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        Some(self.start? + self.length?)
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.deadline().is_some_and(|deadline| deadline <= now)
    }

    /// Report a due timer exactly once
    ///
    /// The start is cleared but the length kept, so the handler of the timeout
    /// can read the previous interval when it re-arms.
    pub fn take_due(&mut self, now: Instant) -> bool {
        if self.is_due(now) {
            self.start = None;
            true
        } else {
            false
        }
    }
}

/// The timer slots of one transaction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Timers {
    pub a: TimerSlot,
    pub b: TimerSlot,
    pub d: TimerSlot,
    pub e: TimerSlot,
    pub f: TimerSlot,
    pub k: TimerSlot,
    pub g: TimerSlot,
    pub h: TimerSlot,
    pub i: TimerSlot,
    pub j: TimerSlot,
}

impl Timers {
    pub fn cancel_all(&mut self) {
        *self = Timers::default();
    }

    pub fn any_active(&self) -> bool {
        self.slots().iter().any(|slot| slot.is_active())
    }

    /// Earliest deadline among the armed slots
    pub fn next_deadline(&self) -> Option<Instant> {
        self.slots().iter().filter_map(|slot| slot.deadline()).min()
    }

    fn slots(&self) -> [&TimerSlot; 10] {
        [
            &self.a, &self.b, &self.d, &self.e, &self.f, &self.k, &self.g, &self.h, &self.i, &self.j,
        ]
    }
}
