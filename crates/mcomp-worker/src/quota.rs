//! Per-user sliding-window admission quotas.
//!
//! Each user has an hourly and a daily window of admission timestamps.
//! Windows are trimmed lazily on every check, and the check plus the
//! reservation happen under one per-user lock so concurrent submissions
//! from the same user cannot both slip past the limit.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tracing::debug;

use mcomp_models::UserId;

/// Which window denied an admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaReason {
    HourlyLimit,
    DailyLimit,
}

impl fmt::Display for QuotaReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuotaReason::HourlyLimit => f.write_str("hourly limit reached"),
            QuotaReason::DailyLimit => f.write_str("daily limit reached"),
        }
    }
}

/// Result of an admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuotaDecision {
    /// Admitted; `now` was appended to both windows.
    Allowed,
    Denied {
        reason: QuotaReason,
        retry_after: Duration,
    },
}

impl QuotaDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, QuotaDecision::Allowed)
    }
}

/// Window lengths and limits.
#[derive(Debug, Clone, Copy)]
pub struct QuotaLimits {
    pub per_hour: usize,
    pub per_day: usize,
    pub hour_window: TimeDelta,
    pub day_window: TimeDelta,
}

impl QuotaLimits {
    pub fn new(per_hour: usize, per_day: usize) -> Self {
        Self {
            per_hour,
            per_day,
            hour_window: TimeDelta::hours(1),
            day_window: TimeDelta::days(1),
        }
    }
}

/// Counts inside both windows at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaUsage {
    pub hourly: usize,
    pub daily: usize,
}

#[derive(Debug, Default)]
struct UserWindows {
    hourly: VecDeque<DateTime<Utc>>,
    daily: VecDeque<DateTime<Utc>>,
}

impl UserWindows {
    fn trim(&mut self, now: DateTime<Utc>, limits: &QuotaLimits) {
        trim_window(&mut self.hourly, now - limits.hour_window);
        trim_window(&mut self.daily, now - limits.day_window);
    }

    fn reserve(&mut self, at: DateTime<Utc>) {
        insert_sorted(&mut self.hourly, at);
        insert_sorted(&mut self.daily, at);
    }

    fn release(&mut self, at: DateTime<Utc>) -> bool {
        let hourly = remove_one(&mut self.hourly, at);
        let daily = remove_one(&mut self.daily, at);
        hourly || daily
    }
}

fn trim_window(window: &mut VecDeque<DateTime<Utc>>, cutoff: DateTime<Utc>) {
    while window.front().is_some_and(|ts| *ts <= cutoff) {
        window.pop_front();
    }
}

// Callers may pass slightly out-of-order timestamps; keep windows sorted so
// trimming from the front stays correct.
fn insert_sorted(window: &mut VecDeque<DateTime<Utc>>, at: DateTime<Utc>) {
    let index = window.partition_point(|ts| *ts <= at);
    window.insert(index, at);
}

fn remove_one(window: &mut VecDeque<DateTime<Utc>>, at: DateTime<Utc>) -> bool {
    match window.iter().position(|ts| *ts == at) {
        Some(index) => {
            window.remove(index);
            true
        }
        None => false,
    }
}

fn retry_after(
    window: &VecDeque<DateTime<Utc>>,
    length: TimeDelta,
    now: DateTime<Utc>,
) -> Duration {
    window
        .front()
        .map(|oldest| (*oldest + length - now).to_std().unwrap_or_default())
        .unwrap_or_default()
}

/// Sliding-window quota tracker shared by all submissions.
#[derive(Debug)]
pub struct QuotaTracker {
    limits: QuotaLimits,
    users: RwLock<HashMap<UserId, Arc<Mutex<UserWindows>>>>,
}

impl QuotaTracker {
    pub fn new(limits: QuotaLimits) -> Self {
        Self {
            limits,
            users: RwLock::new(HashMap::new()),
        }
    }

    pub fn limits(&self) -> QuotaLimits {
        self.limits
    }

    fn user_windows(&self, user: &UserId) -> Arc<Mutex<UserWindows>> {
        // Fast path: read lock
        {
            let users = self.users.read().unwrap_or_else(|e| e.into_inner());
            if let Some(windows) = users.get(user) {
                return windows.clone();
            }
        }

        // Slow path: write lock, double-check
        let mut users = self.users.write().unwrap_or_else(|e| e.into_inner());
        users.entry(user.clone()).or_default().clone()
    }

    fn existing_windows(&self, user: &UserId) -> Option<Arc<Mutex<UserWindows>>> {
        let users = self.users.read().unwrap_or_else(|e| e.into_inner());
        users.get(user).cloned()
    }

    /// Admit `user` at `now` if both windows have room, reserving the slot.
    pub fn check_and_reserve(&self, user: &UserId, now: DateTime<Utc>) -> QuotaDecision {
        let windows = self.user_windows(user);
        let mut windows = lock(&windows);
        windows.trim(now, &self.limits);

        let hourly_full = windows.hourly.len() >= self.limits.per_hour;
        let daily_full = windows.daily.len() >= self.limits.per_day;

        if hourly_full || daily_full {
            let hourly_wait = if hourly_full {
                retry_after(&windows.hourly, self.limits.hour_window, now)
            } else {
                Duration::ZERO
            };
            let daily_wait = if daily_full {
                retry_after(&windows.daily, self.limits.day_window, now)
            } else {
                Duration::ZERO
            };
            let reason = if daily_full && daily_wait >= hourly_wait {
                QuotaReason::DailyLimit
            } else {
                QuotaReason::HourlyLimit
            };

            debug!(
                user_id = %user,
                hourly = windows.hourly.len(),
                daily = windows.daily.len(),
                %reason,
                "Quota denied"
            );
            return QuotaDecision::Denied {
                reason,
                retry_after: hourly_wait.max(daily_wait),
            };
        }

        windows.reserve(now);
        QuotaDecision::Allowed
    }

    /// Give back a reservation made at `reserved_at`.
    ///
    /// Returns false when nothing matched (already trimmed or released).
    pub fn release(&self, user: &UserId, reserved_at: DateTime<Utc>) -> bool {
        let Some(windows) = self.existing_windows(user) else {
            return false;
        };
        let released = lock(&windows).release(reserved_at);
        debug!(user_id = %user, released, "Quota reservation released");
        released
    }

    /// Counts inside both windows at `now`.
    pub fn usage(&self, user: &UserId, now: DateTime<Utc>) -> QuotaUsage {
        let Some(windows) = self.existing_windows(user) else {
            return QuotaUsage { hourly: 0, daily: 0 };
        };
        let mut windows = lock(&windows);
        windows.trim(now, &self.limits);
        QuotaUsage {
            hourly: windows.hourly.len(),
            daily: windows.daily.len(),
        }
    }

    /// Drop users whose windows are empty at `now`.
    ///
    /// Entries still referenced outside the map belong to a check in flight
    /// and are kept, otherwise its reservation would land in a detached entry.
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        let mut users = self.users.write().unwrap_or_else(|e| e.into_inner());
        let before = users.len();
        users.retain(|_, windows| {
            if Arc::strong_count(windows) > 1 {
                return true;
            }
            let mut windows = lock(windows);
            windows.trim(now, &self.limits);
            !windows.daily.is_empty()
        });
        before - users.len()
    }
}

fn lock(windows: &Mutex<UserWindows>) -> MutexGuard<'_, UserWindows> {
    windows.lock().unwrap_or_else(|e| e.into_inner())
}
