use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use governor::clock::{Clock as _, DefaultClock};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use serde::Serialize;

use crate::clock::{self, Clock};

/// Which send window is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowKind {
    Hourly,
    Daily,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Blocked {
    pub window: WindowKind,
    pub used: u32,
    pub cap: u32,
    pub resets_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WindowUsage {
    pub used: u32,
    pub cap: u32,
    pub resets_at: DateTime<Utc>,
}

impl WindowUsage {
    /// `"{used}/{cap}"`, the form shown on the monitoring view.
    pub fn display(&self) -> String {
        format!("{}/{}", self.used, self.cap)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RateLimitUsage {
    pub hourly: WindowUsage,
    pub daily: WindowUsage,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    reset_at: DateTime<Utc>,
}

#[derive(Debug)]
struct Windows {
    hourly: Window,
    daily: Window,
}

/// Hourly and daily outbound mail budget, shared by every sender in the process.
///
/// The hourly window rolls one hour from the moment it is (re)opened; the daily
/// window closes at local midnight. Counters only move through `increment`
/// and are only zeroed by `reset_if_expired`.
pub struct SendRateLimiter {
    clock: Arc<dyn Clock>,
    hourly_cap: u32,
    daily_cap: u32,
    windows: Mutex<Windows>,
}

impl SendRateLimiter {
    pub fn new(clock: Arc<dyn Clock>, hourly_cap: u32, daily_cap: u32) -> Self {
        let now = clock.now();
        Self {
            windows: Mutex::new(Windows {
                hourly: Window {
                    count: 0,
                    reset_at: now + chrono::Duration::hours(1),
                },
                daily: Window {
                    count: 0,
                    reset_at: clock::next_local_midnight(now),
                },
            }),
            clock,
            hourly_cap,
            daily_cap,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Windows> {
        self.windows.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Open fresh windows for any whose reset time has passed.
    /// Returns true when at least one window was reset.
    pub fn reset_if_expired(&self) -> bool {
        let now = self.clock.now();
        let mut windows = self.lock();
        let mut reset = false;

        if now >= windows.hourly.reset_at {
            windows.hourly = Window {
                count: 0,
                reset_at: now + chrono::Duration::hours(1),
            };
            tracing::info!(
                "Hourly mail limit reset, next reset at {}",
                windows.hourly.reset_at
            );
            reset = true;
        }

        if now >= windows.daily.reset_at {
            windows.daily = Window {
                count: 0,
                reset_at: clock::next_local_midnight(now),
            };
            tracing::info!(
                "Daily mail limit reset, next reset at {}",
                windows.daily.reset_at
            );
            reset = true;
        }

        reset
    }

    /// Whether a send is permitted right now. Never mutates the counters.
    pub fn check(&self) -> Result<(), Blocked> {
        let windows = self.lock();

        if windows.hourly.count >= self.hourly_cap {
            return Err(Blocked {
                window: WindowKind::Hourly,
                used: windows.hourly.count,
                cap: self.hourly_cap,
                resets_at: windows.hourly.reset_at,
            });
        }

        if windows.daily.count >= self.daily_cap {
            return Err(Blocked {
                window: WindowKind::Daily,
                used: windows.daily.count,
                cap: self.daily_cap,
                resets_at: windows.daily.reset_at,
            });
        }

        Ok(())
    }

    pub fn allows(&self) -> bool {
        self.check().is_ok()
    }

    /// Count one dispatched message against both windows.
    pub fn increment(&self) {
        let mut windows = self.lock();
        windows.hourly.count = windows.hourly.count.saturating_add(1);
        windows.daily.count = windows.daily.count.saturating_add(1);
    }

    pub fn usage(&self) -> RateLimitUsage {
        let windows = self.lock();
        RateLimitUsage {
            hourly: WindowUsage {
                used: windows.hourly.count,
                cap: self.hourly_cap,
                resets_at: windows.hourly.reset_at,
            },
            daily: WindowUsage {
                used: windows.daily.count,
                cap: self.daily_cap,
                resets_at: windows.daily.reset_at,
            },
        }
    }
}

/// Per-IP limiter for the public lead form.
pub struct IntakeRateLimiter {
    limiter: DefaultKeyedRateLimiter<IpAddr>,
}

impl IntakeRateLimiter {
    pub fn new(per_minute: u32) -> Self {
        let per_minute = NonZeroU32::new(per_minute).unwrap_or(NonZeroU32::MIN);
        Self {
            limiter: RateLimiter::keyed(Quota::per_minute(per_minute)),
        }
    }

    /// Check if a submission from `ip` is allowed. Returns Ok(()) or Err with retry-after seconds.
    pub fn check(&self, ip: IpAddr) -> Result<(), u64> {
        self.limiter.check_key(&ip).map_err(|not_until| {
            not_until
                .wait_time_from(DefaultClock::default().now())
                .as_secs()
                .max(1)
        })
    }

    /// Forget addresses whose quota has fully replenished.
    pub fn cleanup(&self) {
        self.limiter.retain_recent();
    }
}

/// Per-email login brute force limiter.
pub struct LoginRateLimiter {
    /// email -> (failed_count, window_start)
    entries: DashMap<String, (u32, Instant)>,
}

impl Default for LoginRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl LoginRateLimiter {
    const WINDOW: Duration = Duration::from_secs(15 * 60);
    const MAX_FAILURES: u32 = 5;

    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Check if login attempt is allowed. 5 failures per 15 minutes.
    /// Does NOT increment the counter; call `record_failure()` on an invalid password.
    pub fn check(&self, email: &str) -> Result<(), u64> {
        let now = Instant::now();

        let Some(entry) = self.entries.get(&email.to_lowercase()) else {
            return Ok(());
        };

        let (count, start) = entry.value();

        if now.duration_since(*start) > Self::WINDOW {
            return Ok(());
        }

        if *count >= Self::MAX_FAILURES {
            let elapsed = now.duration_since(*start).as_secs();
            return Err(Self::WINDOW.as_secs().saturating_sub(elapsed));
        }

        Ok(())
    }

    pub fn record_failure(&self, email: &str) {
        let now = Instant::now();

        let mut entry = self.entries.entry(email.to_lowercase()).or_insert((0, now));
        let (count, start) = entry.value_mut();

        if now.duration_since(*start) > Self::WINDOW {
            *count = 1;
            *start = now;
        } else {
            *count += 1;
        }
    }

    pub fn clear(&self, email: &str) {
        self.entries.remove(&email.to_lowercase());
    }

    pub fn cleanup(&self) {
        let now = Instant::now();
        self.entries
            .retain(|_, (_, start)| now.duration_since(*start) < Self::WINDOW);
    }
}
