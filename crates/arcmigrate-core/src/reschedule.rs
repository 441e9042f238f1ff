//! Calendar rescheduling for stored test-session schedules.
//!
//! A schedule groups sessions into 26-week test cycles. Rescheduling moves
//! one whole cycle so that its first session lands on an operator-chosen
//! calendar date at the same local wall-clock time, shifting every session
//! in the cycle by one shared delta. The stored document carries fields
//! this tool does not model; they are preserved byte-for-byte through the
//! flattened maps.

use std::collections::BTreeSet;

use chrono::{FixedOffset, LocalResult, NaiveDate, TimeZone};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::{MigrationError, MigrationResult};

const SECONDS_PER_DAY: i64 = 86_400;
pub const SECONDS_PER_HOUR: i64 = 3_600;

/// One scheduled test session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleSession {
    #[serde(default)]
    pub session_id: String,
    /// Scheduled instant, epoch seconds, possibly fractional.
    #[serde(default)]
    pub session_date: f64,
    #[serde(default)]
    pub week: i32,
    #[serde(default)]
    pub day: i32,
    #[serde(default)]
    pub session: i32,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A participant's full test-session schedule document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestSchedule {
    #[serde(default)]
    pub participant_id: Option<String>,
    /// Offset string such as `UTC-05:00`, `-05:00`, or `-5`.
    #[serde(default)]
    pub timezone_offset: Option<String>,
    #[serde(default)]
    pub timezone_name: Option<String>,
    #[serde(default)]
    pub sessions: Vec<ScheduleSession>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Test cycle containing the given week, 1-indexed.
///
/// Cycles are 26 weeks with the boundary rounded to the nearest multiple,
/// so week 13 already belongs to cycle 2.
#[must_use]
pub fn cycle_of_week(week: i32) -> u32 {
    let rounded = (f64::from(week) / 26.0).round() as i64 + 1;
    u32::try_from(rounded.max(1)).unwrap_or(1)
}

/// Indexes into `schedule.sessions` belonging to the given cycle.
#[must_use]
pub fn sessions_in_cycle(schedule: &TestSchedule, cycle: u32) -> Vec<usize> {
    schedule
        .sessions
        .iter()
        .enumerate()
        .filter(|(_, s)| cycle_of_week(s.week) == cycle)
        .map(|(i, _)| i)
        .collect()
}

/// Every cycle the schedule has sessions for, ascending.
#[must_use]
pub fn available_cycles(schedule: &TestSchedule) -> BTreeSet<u32> {
    schedule
        .sessions
        .iter()
        .map(|s| cycle_of_week(s.week))
        .collect()
}

/// Find the session anchoring the cycle's calendar position: day 0 session
/// 0, falling back to day 1 session 0 for schedules whose first day was
/// consumed by onboarding.
pub fn find_anchor(schedule: &TestSchedule, cycle: u32) -> MigrationResult<usize> {
    let indexes = sessions_in_cycle(schedule, cycle);
    if indexes.is_empty() {
        return Err(MigrationError::EmptyCycle { cycle });
    }

    for day in [0, 1] {
        let anchor = indexes.iter().copied().find(|&i| {
            let s = &schedule.sessions[i];
            s.day == day && s.session == 0
        });
        if let Some(i) = anchor {
            return Ok(i);
        }
    }
    Err(MigrationError::NoAnchorSession { cycle })
}

/// Parse a stored time-zone offset.
///
/// Accepted forms: `UTC±HH:MM`, `±HH:MM`, and bare signed hours (`-5`).
pub fn parse_zone_offset(offset: &str) -> MigrationResult<FixedOffset> {
    let invalid = || MigrationError::InvalidZoneOffset {
        offset: offset.to_string(),
    };

    let trimmed = offset.trim();
    let trimmed = trimmed.strip_prefix("UTC").unwrap_or(trimmed).trim();

    let seconds = if let Some((hours, minutes)) = trimmed.split_once(':') {
        let hours: i32 = hours.parse().map_err(|_| invalid())?;
        let minutes: i32 = minutes.parse().map_err(|_| invalid())?;
        if !(0..60).contains(&minutes) {
            return Err(invalid());
        }
        let magnitude = hours.abs() * SECONDS_PER_HOUR as i32 + minutes * 60;
        if hours < 0 || trimmed.starts_with('-') {
            -magnitude
        } else {
            magnitude
        }
    } else {
        let hours: i32 = trimmed.parse().map_err(|_| invalid())?;
        hours * SECONDS_PER_HOUR as i32
    };

    FixedOffset::east_opt(seconds).ok_or_else(invalid)
}

/// The schedule's fixed offset; schedules with no stored offset are
/// treated as UTC.
pub fn schedule_zone(schedule: &TestSchedule) -> MigrationResult<FixedOffset> {
    match &schedule.timezone_offset {
        Some(offset) => parse_zone_offset(offset),
        None => Ok(FixedOffset::east_opt(0).ok_or_else(|| {
            MigrationError::External(anyhow::anyhow!("UTC offset construction failed"))
        })?),
    }
}

/// Signed shift, in seconds, that moves the anchor instant to `target_date`
/// (YYYY-MM-DD) at the same local wall-clock time under the fixed offset.
///
/// Daylight-saving transitions are deliberately ignored; the study apps
/// store fixed offsets, not named zones.
pub fn shift_delta(
    anchor_date: f64,
    target_date: &str,
    zone: FixedOffset,
) -> MigrationResult<f64> {
    let target = NaiveDate::parse_from_str(target_date, "%Y-%m-%d").map_err(|_| {
        MigrationError::InvalidDate {
            date: target_date.to_string(),
        }
    })?;

    let anchor_secs = anchor_date.floor() as i64;
    let LocalResult::Single(anchor_local) = zone.timestamp_opt(anchor_secs, 0) else {
        return Err(MigrationError::External(anyhow::anyhow!(
            "anchor instant {anchor_secs} is not representable"
        )));
    };

    let delta_days = (target - anchor_local.date_naive()).num_days();
    Ok((delta_days * SECONDS_PER_DAY) as f64)
}

/// Add `delta` seconds to every session in the cycle.
pub fn apply_shift(schedule: &mut TestSchedule, cycle: u32, delta: f64) {
    for i in sessions_in_cycle(schedule, cycle) {
        schedule.sessions[i].session_date += delta;
    }
    tracing::debug!(cycle, delta, "applied cycle shift");
}

/// Move a single session by whole hours.
pub fn nudge_session(session: &mut ScheduleSession, hours: i64) {
    session.session_date += (hours * SECONDS_PER_HOUR) as f64;
}
