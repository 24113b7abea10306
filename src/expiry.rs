//! Expiry Policy
//!
//! Freshness is decided at read time: an entry is fresh while its stored
//! timestamp is at or after the cutoff computed from the *current* KeyConfig.
//! Jitter is applied once, when the timestamp is written.

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use rand::Rng;

use crate::config::KeyConfig;

/// Cutoff that every stored timestamp is at or after (nothing expires).
pub const FAR_PAST: DateTime<Utc> = DateTime::<Utc>::MIN_UTC;
/// Cutoff that every stored timestamp is before (everything is expired).
pub const FAR_FUTURE: DateTime<Utc> = DateTime::<Utc>::MAX_UTC;

// == Expiry Cutoff ==
/// Returns the instant before which entries for `config` count as expired.
///
/// - `ttl == 0`: [`FAR_FUTURE`], every entry is expired
/// - `ttl < 0`, or too large to subtract from `now`: [`FAR_PAST`]
/// - otherwise `now - ttl`
pub fn expiry_cutoff(config: &KeyConfig, now: DateTime<Utc>) -> DateTime<Utc> {
    match config.ttl {
        0 => FAR_FUTURE,
        ttl if ttl < 0 => FAR_PAST,
        ttl => TimeDelta::try_seconds(ttl)
            .and_then(|span| now.checked_sub_signed(span))
            .unwrap_or(FAR_PAST),
    }
}

// == Stored Timestamp ==
/// Timestamp to persist for an entry written at `now`, jittered by a uniform
/// random offset in `[0, ttl_jitter)` seconds.
pub fn stored_timestamp(config: &KeyConfig, now: DateTime<Utc>) -> DateTime<Utc> {
    stored_timestamp_with(config, now, &mut rand::thread_rng())
}

/// [`stored_timestamp`] with a caller-supplied random source.
pub fn stored_timestamp_with<R: Rng + ?Sized>(
    config: &KeyConfig,
    now: DateTime<Utc>,
    rng: &mut R,
) -> DateTime<Utc> {
    if config.ttl_jitter == 0 {
        return now;
    }
    // millisecond resolution spreads writers within the window
    let window_ms = i64::try_from(config.ttl_jitter.saturating_mul(1000)).unwrap_or(i64::MAX);
    let offset_ms = rng.gen_range(0..window_ms);
    TimeDelta::try_milliseconds(offset_ms)
        .and_then(|offset| now.checked_add_signed(offset))
        .unwrap_or(FAR_FUTURE)
}

// == Clocks ==
/// Source of "now" for the engine.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock in UTC.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Moves the clock forward (or back, for negative values) by `seconds`.
    pub fn advance(&self, seconds: i64) {
        let mut now = self.now.lock();
        *now += TimeDelta::seconds(seconds);
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.lock() = instant;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}
