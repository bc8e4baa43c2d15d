//! Time utilities for drowse
//!
//! Provides both monotonic time (for idle timers and grace periods) and
//! wall-clock time (for the daily shutdown window).
//!
//! # Mock Time for Development
//!
//! In debug builds, the `DROWSE_MOCK_TIME` environment variable can be set
//! to override the wall-clock time used for the daily shutdown window.
//!
//! Format: `YYYY-MM-DD HH:MM:SS` (e.g., `2025-12-25 21:58:00`)

use chrono::{DateTime, Local, NaiveDateTime, NaiveTime, TimeZone, Timelike};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

pub const MOCK_TIME_ENV_VAR: &str = "DROWSE_MOCK_TIME";
const MOCK_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const MINUTES_PER_DAY: u32 = 24 * 60;

static MOCK_TIME_OFFSET: OnceLock<Option<chrono::Duration>> = OnceLock::new();

/// Parse a `DROWSE_MOCK_TIME` value into a local timestamp
pub fn parse_mock_time(value: &str) -> Option<DateTime<Local>> {
    let naive = NaiveDateTime::parse_from_str(value.trim(), MOCK_TIME_FORMAT).ok()?;
    Local.from_local_datetime(&naive).single()
}

fn mock_offset() -> Option<chrono::Duration> {
    *MOCK_TIME_OFFSET.get_or_init(|| {
        if !cfg!(debug_assertions) {
            return None;
        }
        let value = std::env::var(MOCK_TIME_ENV_VAR).ok()?;
        let Some(mock) = parse_mock_time(&value) else {
            tracing::warn!(
                value = %value,
                expected_format = MOCK_TIME_FORMAT,
                "Ignoring unparseable mock time"
            );
            return None;
        };
        let offset = mock.signed_duration_since(Local::now());
        tracing::info!(mock_time = %value, offset_secs = offset.num_seconds(), "Using mock wall clock");
        Some(offset)
    })
}

/// Whether `DROWSE_MOCK_TIME` shifted the wall clock
pub fn is_mock_time_active() -> bool {
    mock_offset().is_some()
}

/// Local wall-clock time, shifted by the mock offset when one is set
pub fn now() -> DateTime<Local> {
    let real = Local::now();
    mock_offset().map_or(real, |offset| real + offset)
}

/// A point in monotonic time. Idle timers use this so wall-clock
/// adjustments never shorten or stretch a grace period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MonotonicInstant(Instant);

impl MonotonicInstant {
    pub fn now() -> Self {
        Self(Instant::now())
    }

    /// Duration since `earlier`, or zero if `earlier` is later than `self`
    pub fn duration_since(&self, earlier: MonotonicInstant) -> Duration {
        self.0.saturating_duration_since(earlier.0)
    }
}

impl std::ops::Add<Duration> for MonotonicInstant {
    type Output = MonotonicInstant;

    fn add(self, rhs: Duration) -> Self::Output {
        MonotonicInstant(self.0 + rhs)
    }
}

/// Time of day (hour and minute)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WallClock {
    pub hour: u8,
    pub minute: u8,
}

impl WallClock {
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        if hour < 24 && minute < 60 {
            Some(Self { hour, minute })
        } else {
            None
        }
    }

    pub fn from_naive_time(time: NaiveTime) -> Self {
        Self {
            hour: time.hour() as u8,
            minute: time.minute() as u8,
        }
    }

    pub fn minutes_from_midnight(&self) -> u32 {
        (self.hour as u32) * 60 + self.minute as u32
    }

    /// Distance in minutes to `other`, going around midnight when shorter
    pub fn circular_distance(&self, other: &WallClock) -> u32 {
        let a = self.minutes_from_midnight();
        let b = other.minutes_from_midnight();
        let diff = a.abs_diff(b);
        diff.min(MINUTES_PER_DAY - diff)
    }

    /// Whether `dt` falls within `tolerance_minutes` of this time of day
    pub fn is_near(&self, dt: &DateTime<Local>, tolerance_minutes: u32) -> bool {
        let current = WallClock::from_naive_time(dt.time());
        self.circular_distance(&current) <= tolerance_minutes
    }
}

impl PartialOrd for WallClock {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for WallClock {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.minutes_from_midnight()
            .cmp(&other.minutes_from_midnight())
    }
}

impl std::fmt::Display for WallClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// Helper to format durations in human-readable form
pub fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}
