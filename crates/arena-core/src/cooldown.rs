//! Send cooldown gate: `Idle → Cooldown(expires_at) → Idle`.
//!
//! The gate holds no timer. Every attempt compares the current instant with
//! the stored expiry, so returning to `Idle` needs no callback. Instants come
//! from [`tokio::time`] so paused-clock tests can drive it.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

/// Window armed after every acknowledged send.
pub const SEND_COOLDOWN: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownState {
    Idle,
    Cooldown { expires_at: Instant },
}

/// Rejection returned while the gate is cooling down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoolingDown {
    pub remaining: Duration,
}

#[derive(Debug, Clone)]
pub struct CooldownGate {
    window: Duration,
    expires_at: Option<Instant>,
}

impl Default for CooldownGate {
    fn default() -> Self {
        Self::new(SEND_COOLDOWN)
    }
}

impl CooldownGate {
    pub fn new(window: Duration) -> Self {
        Self { window, expires_at: None }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn state_at(&self, now: Instant) -> CooldownState {
        match self.expires_at {
            Some(expires_at) if now < expires_at => CooldownState::Cooldown { expires_at },
            _ => CooldownState::Idle,
        }
    }

    pub fn state(&self) -> CooldownState {
        self.state_at(Instant::now())
    }

    /// `Ok` when a send may go out at `now`.
    pub fn check_at(&self, now: Instant) -> Result<(), CoolingDown> {
        match self.state_at(now) {
            CooldownState::Idle => Ok(()),
            CooldownState::Cooldown { expires_at } => Err(CoolingDown {
                remaining: expires_at - now,
            }),
        }
    }

    pub fn check(&self) -> Result<(), CoolingDown> {
        self.check_at(Instant::now())
    }

    /// Enter `Cooldown` for one window starting at the acknowledgment instant.
    pub fn arm_at(&mut self, acknowledged_at: Instant) {
        self.expires_at = Some(acknowledged_at + self.window);
    }

    pub fn arm(&mut self) {
        self.arm_at(Instant::now());
    }

    /// Forget any running cooldown.
    pub fn reset(&mut self) {
        self.expires_at = None;
    }

    /// Whole seconds left (rounded up), `0` when idle.
    pub fn remaining_secs_at(&self, now: Instant) -> u64 {
        match self.check_at(now) {
            Ok(()) => 0,
            Err(CoolingDown { remaining }) => remaining.as_millis().div_ceil(1000) as u64,
        }
    }
}

/// Authoritative server-side throttle: one [`CooldownGate`] per sender key.
///
/// Unlike the client gate, a slot is reserved when the check passes so two
/// concurrent sends from the same user cannot both slip through; callers
/// release the reservation with [`RateLimiter::release`] if the send fails.
#[derive(Debug)]
pub struct RateLimiter {
    window: Duration,
    gates: Mutex<HashMap<String, CooldownGate>>,
}

impl RateLimiter {
    pub fn new(window: Duration) -> Self {
        Self { window, gates: Mutex::new(HashMap::new()) }
    }

    pub fn try_acquire_at(&self, key: &str, now: Instant) -> Result<(), CoolingDown> {
        let Ok(mut gates) = self.gates.lock() else {
            // A poisoned map only loses throttling, never messages.
            return Ok(());
        };
        // Idle gates carry no information; drop them so the map stays small.
        gates.retain(|_, g| g.state_at(now) != CooldownState::Idle);
        let gate = gates
            .entry(key.to_owned())
            .or_insert_with(|| CooldownGate::new(self.window));
        gate.check_at(now)?;
        gate.arm_at(now);
        Ok(())
    }

    pub fn try_acquire(&self, key: &str) -> Result<(), CoolingDown> {
        self.try_acquire_at(key, Instant::now())
    }

    pub fn release(&self, key: &str) {
        if let Ok(mut gates) = self.gates.lock() {
            gates.remove(key);
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
