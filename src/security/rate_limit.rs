//! Per-key fixed-window rate limiting with escalating lockout.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::RateLimitConfig;
use crate::observability::metrics;

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Minimum spacing between sweeps forced by a full key table.
const FORCED_SWEEP_INTERVAL_MS: u64 = 1_000;

/// Rate-limit key for a caller with no verified identity.
pub fn anonymous_key(ip: &std::net::IpAddr) -> String {
    format!("anon:{}", ip)
}

/// Outcome of a single `consume` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// When the current window (or lockout) ends, in epoch milliseconds.
    pub reset_at_ms: u64,
}

impl RateLimitDecision {
    /// Reset time in whole epoch seconds, rounded up.
    pub fn reset_epoch_secs(&self) -> u64 {
        self.reset_at_ms.div_ceil(1000)
    }
}

#[derive(Debug, Clone)]
struct KeyState {
    window_count: u32,
    window_reset_at: u64,
    locked_until: Option<u64>,
    violation_count: u32,
}

impl KeyState {
    fn is_locked(&self, now: u64) -> bool {
        self.locked_until.is_some_and(|until| now < until)
    }
}

/// Rate limiter state shared by all request tasks.
///
/// Each key moves through: fresh window → counting → locked (on overflow).
/// Lockouts grow by one step per violation up to a cap, and each expired
/// window forgives one violation.
///
/// At most `max_tracked_keys` keys are held. A new key arriving while the
/// table is full is admitted for that request without being tracked.
pub struct RateLimiter {
    states: DashMap<String, KeyState>,
    limit: u32,
    window_ms: u64,
    lockout_step_ms: u64,
    lockout_max_ms: u64,
    max_tracked_keys: usize,
    /// Epoch ms of the last forced sweep, plus one (0 = never).
    last_forced_sweep: AtomicU64,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            states: DashMap::new(),
            limit: config.requests_per_window,
            window_ms: config.window_secs * 1000,
            lockout_step_ms: config.lockout_step_secs * 1000,
            lockout_max_ms: config.lockout_max_secs * 1000,
            max_tracked_keys: config.max_tracked_keys,
            last_forced_sweep: AtomicU64::new(0),
        }
    }

    /// Configured number of requests per window.
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.states.len()
    }

    /// Count one request against `key`.
    pub fn consume(&self, key: &str) -> RateLimitDecision {
        self.consume_at(key, now_ms())
    }

    /// Count one request against `key` at time `now` (epoch milliseconds).
    pub fn consume_at(&self, key: &str, now: u64) -> RateLimitDecision {
        if !self.states.contains_key(key) && self.states.len() >= self.max_tracked_keys {
            if self.claim_forced_sweep(now) {
                let removed = self.sweep_at(now);
                if self.states.len() >= self.max_tracked_keys {
                    tracing::warn!(
                        tracked = self.states.len(),
                        removed,
                        "Rate limiter key capacity reached, new keys not tracked"
                    );
                }
            }
            if self.states.len() >= self.max_tracked_keys {
                return RateLimitDecision {
                    allowed: true,
                    limit: self.limit,
                    remaining: self.limit.saturating_sub(1),
                    reset_at_ms: now + self.window_ms,
                };
            }
        }

        // The entry guard holds the shard lock, so the read-modify-write below
        // is atomic for every caller sharing this key.
        let mut entry = self.states.entry(key.to_string()).or_insert_with(|| KeyState {
            window_count: 0,
            window_reset_at: now + self.window_ms,
            locked_until: None,
            violation_count: 0,
        });
        let state = entry.value_mut();

        if state.window_count == 0 {
            state.window_count = 1;
            return self.admitted(state);
        }

        if let Some(until) = state.locked_until.filter(|until| now < *until) {
            metrics::record_rate_limited("locked");
            return RateLimitDecision {
                allowed: false,
                limit: self.limit,
                remaining: 0,
                reset_at_ms: until,
            };
        }

        if now > state.window_reset_at {
            state.window_count = 1;
            state.window_reset_at = now + self.window_ms;
            state.violation_count = state.violation_count.saturating_sub(1);
            return self.admitted(state);
        }

        if state.window_count < self.limit {
            state.window_count += 1;
            return self.admitted(state);
        }

        state.violation_count = state.violation_count.saturating_add(1);
        let lockout = self
            .lockout_step_ms
            .saturating_mul(state.violation_count as u64)
            .min(self.lockout_max_ms);
        let until = now + lockout;
        state.locked_until = Some(until);

        tracing::warn!(
            key = %key,
            violations = state.violation_count,
            lockout_secs = lockout / 1000,
            "Rate limit exceeded, key locked"
        );
        metrics::record_rate_limited("limit");

        RateLimitDecision {
            allowed: false,
            limit: self.limit,
            remaining: 0,
            reset_at_ms: until,
        }
    }

    /// True for at most one caller per `FORCED_SWEEP_INTERVAL_MS`.
    fn claim_forced_sweep(&self, now: u64) -> bool {
        let stamp = now.saturating_add(1);
        let last = self.last_forced_sweep.load(Ordering::Relaxed);
        if last != 0 && stamp < last.saturating_add(FORCED_SWEEP_INTERVAL_MS) {
            return false;
        }
        self.last_forced_sweep
            .compare_exchange(last, stamp, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }

    fn admitted(&self, state: &KeyState) -> RateLimitDecision {
        RateLimitDecision {
            allowed: true,
            limit: self.limit,
            remaining: self.limit.saturating_sub(state.window_count),
            reset_at_ms: state.window_reset_at,
        }
    }

    /// Requests left for `key` without consuming one.
    pub fn remaining(&self, key: &str) -> u32 {
        self.remaining_at(key, now_ms())
    }

    pub fn remaining_at(&self, key: &str, now: u64) -> u32 {
        match self.states.get(key) {
            None => self.limit,
            Some(state) if state.is_locked(now) => 0,
            Some(state) if now > state.window_reset_at => self.limit,
            Some(state) => self.limit.saturating_sub(state.window_count),
        }
    }

    /// When `key`'s window or lockout ends, in epoch milliseconds.
    pub fn reset_time(&self, key: &str) -> u64 {
        self.reset_time_at(key, now_ms())
    }

    pub fn reset_time_at(&self, key: &str, now: u64) -> u64 {
        match self.states.get(key) {
            None => now + self.window_ms,
            Some(state) => match state.locked_until {
                Some(until) if now < until => until,
                _ if now > state.window_reset_at => now + self.window_ms,
                _ => state.window_reset_at,
            },
        }
    }

    /// Drop idle keys. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(now_ms())
    }

    /// A key is idle once its window has expired and it is not locked. Keys
    /// with outstanding violations are kept until they have been quiet for
    /// the full lockout cap.
    pub fn sweep_at(&self, now: u64) -> usize {
        let before = self.states.len();
        let quiet_after = self.lockout_max_ms;
        self.states.retain(|_, state| {
            let idle = now > state.window_reset_at && !state.is_locked(now);
            let forgiven = state.violation_count == 0
                || now > state.window_reset_at.saturating_add(quiet_after);
            !(idle && forgiven)
        });
        before.saturating_sub(self.states.len())
    }
}
