//! Process-wide circuit breaker shared by every remote call.
//!
//! # States
//!
//! ```text
//! Closed ──rate limit──▶ Cooling down ──cooldown elapses──▶ Closed
//!   │                         │
//!   └──credential/permission──┴──▶ Disabled (until restart)
//! ```
//!
//! One breaker is created at startup and handed to every consumer as
//! `Arc<CircuitBreaker>`. Callers must consult it immediately before each
//! attempt rather than caching a previous answer.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::error::{DisableReason, VisionError};

/// Monotonic time source for cooldown bookkeeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Hand-advanced clock for tests and replayed scenarios.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        *offset += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = *self.offset.lock().unwrap_or_else(|e| e.into_inner());
        self.origin + offset
    }
}

/// Point-in-time view of the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSnapshot {
    pub disabled: Option<DisableReason>,
    pub cooldown_remaining_secs: u64,
}

impl BreakerSnapshot {
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.disabled.is_none() && self.cooldown_remaining_secs == 0
    }
}

#[derive(Debug, Default)]
struct BreakerState {
    disabled: Option<DisableReason>,
    cooldown_until: Option<Instant>,
}

pub struct CircuitBreaker {
    state: Mutex<BreakerState>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("snapshot", &self.snapshot())
            .finish_non_exhaustive()
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

impl CircuitBreaker {
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(BreakerState::default()),
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        // State is two plain fields; a panic elsewhere cannot leave it torn.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Gate for a single attempt. `Ok(())` means the call may hit the network.
    pub fn check(&self) -> Result<(), VisionError> {
        let state = self.lock();
        if let Some(reason) = state.disabled {
            return Err(reason.into());
        }
        let remaining = remaining_secs(state.cooldown_until, self.clock.now());
        if remaining > 0 {
            return Err(VisionError::Cooldown {
                remaining_secs: remaining,
            });
        }
        Ok(())
    }

    /// Whole seconds (rounded up) until calls are allowed again; 0 when clear.
    ///
    /// Does not account for a permanent disable; see [`Self::is_disabled`].
    #[must_use]
    pub fn cooldown_remaining(&self) -> u64 {
        let state = self.lock();
        remaining_secs(state.cooldown_until, self.clock.now())
    }

    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.lock().disabled.is_some()
    }

    #[must_use]
    pub fn disabled_reason(&self) -> Option<DisableReason> {
        self.lock().disabled
    }

    /// Start (or extend) the shared cooldown window.
    pub fn trip_cooldown(&self, duration: Duration) {
        let now = self.clock.now();
        let until = now + duration;
        let mut state = self.lock();
        let extended = state.cooldown_until.is_none_or(|current| until > current);
        if extended {
            state.cooldown_until = Some(until);
        }
        tracing::warn!(
            cooldown_secs = duration.as_secs(),
            "Vision service rate limited; cooling down"
        );
    }

    /// Open the breaker for the rest of the process lifetime.
    ///
    /// The first reason recorded is kept.
    pub fn disable(&self, reason: DisableReason) {
        let mut state = self.lock();
        if state.disabled.is_some() {
            return;
        }
        state.disabled = Some(reason);
        tracing::error!(?reason, "Vision service disabled until restart");
    }

    #[must_use]
    pub fn snapshot(&self) -> BreakerSnapshot {
        let state = self.lock();
        BreakerSnapshot {
            disabled: state.disabled,
            cooldown_remaining_secs: remaining_secs(state.cooldown_until, self.clock.now()),
        }
    }
}

fn remaining_secs(until: Option<Instant>, now: Instant) -> u64 {
    let Some(until) = until else { return 0 };
    let left = until.saturating_duration_since(now);
    left.as_secs() + u64::from(left.subsec_nanos() > 0)
}
