//! Per-session token-bucket rate limiting (C3).
//!
//! Hand-rolled rather than pulled from a crate: the governor-style limiters
//! built for fleet-wide quotas don't carry the session-owned violation
//! counter this coordinator needs, and the state here is trivial enough that
//! wrapping a crate would cost more than it saves.

/// Tokens granted to a fresh session.
pub const BURST: f64 = 100.0;
/// Tokens refilled per second.
pub const RATE: f64 = 25.0;
/// Violations after which the session's socket is closed.
pub const DISCONNECT_THRESHOLD: u32 = 10;

/// The outcome of charging a bucket for one chargeable event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charge {
    /// The event is admitted.
    Admitted,
    /// The bucket was empty; caller should warn the session but not apply
    /// the event.
    Refused,
    /// The bucket was empty and the session has now crossed
    /// [`DISCONNECT_THRESHOLD`]; caller must close the socket.
    Disconnect,
}

/// Per-session token-bucket state.
///
/// `violations` never decays on its own — a slow steady abuser accumulates
/// forever across the life of the session. Left this way deliberately; see
/// `DESIGN.md`.
#[derive(Debug, Clone, Copy)]
pub struct TokenBucket {
    tokens: f64,
    last_refill_ms: i64,
    violations: u32,
}

impl TokenBucket {
    pub fn new(now_ms: i64) -> Self {
        Self { tokens: BURST, last_refill_ms: now_ms, violations: 0 }
    }

    fn refill(&mut self, now_ms: i64) {
        let dt_ms = (now_ms - self.last_refill_ms).max(0);
        self.tokens = (self.tokens + (dt_ms as f64 / 1000.0) * RATE).min(BURST);
        self.last_refill_ms = now_ms;
    }

    /// Charge one token for an inbound `yjs_update`.
    pub fn charge(&mut self, now_ms: i64) -> Charge {
        self.refill(now_ms);
        if self.tokens < 1.0 {
            self.violations += 1;
            if self.violations >= DISCONNECT_THRESHOLD {
                Charge::Disconnect
            } else {
                Charge::Refused
            }
        } else {
            self.tokens -= 1.0;
            Charge::Admitted
        }
    }

    pub fn violations(&self) -> u32 {
        self.violations
    }
}
