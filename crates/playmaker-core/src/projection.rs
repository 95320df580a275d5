//! View projections: pure derivations of what a screen renders.
//!
//! Every function here takes cached state and returns a fresh value. They
//! tolerate partially malformed payloads by skipping what they cannot read,
//! so re-running them on every cache change never fails.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::models::ResourceState;

/// Update feed priority, lowest first
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl Priority {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

impl FromStr for Priority {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "normal" | "medium" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            "urgent" | "critical" => Ok(Self::Urgent),
            other => Err(Error::InvalidInput(format!("unknown priority '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedItem {
    pub id: String,
    pub title: String,
    pub body: Option<String>,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
}

/// Feed entries sorted most urgent first, then newest first.
///
/// Accepts `{ "updates": [...] }` or a bare array. Entries without an id or
/// a parseable `created_at` are skipped; an unknown priority reads as normal.
pub fn update_feed(payload: &Value) -> Vec<FeedItem> {
    let entries = payload
        .get("updates")
        .and_then(Value::as_array)
        .or_else(|| payload.as_array());
    let Some(entries) = entries else {
        return Vec::new();
    };

    let mut items: Vec<FeedItem> = entries.iter().filter_map(feed_item).collect();
    items.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| b.created_at.cmp(&a.created_at))
            .then_with(|| a.id.cmp(&b.id))
    });
    items
}

fn feed_item(entry: &Value) -> Option<FeedItem> {
    let id = match entry.get("id")? {
        Value::String(id) if !id.trim().is_empty() => id.trim().to_string(),
        Value::Number(id) => id.to_string(),
        _ => return None,
    };
    let created_at = timestamp(entry.get("created_at")?)?;
    let priority = entry
        .get("priority")
        .and_then(Value::as_str)
        .and_then(|raw| raw.parse().ok())
        .unwrap_or_default();
    Some(FeedItem {
        id,
        title: text(entry, "title").unwrap_or_default(),
        body: text(entry, "body"),
        priority,
        created_at,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct WorkloadStats {
    pub total_hours: f64,
    /// Sessions with both a start and an end
    pub completed_sessions: usize,
    /// Sessions that started but have no end yet
    pub open_sessions: usize,
}

/// Hours summed over sessions where both start and end are present.
///
/// Sessions ending before they start are ignored.
pub fn workload_stats(payload: &Value) -> WorkloadStats {
    let Some(sessions) = payload.get("sessions").and_then(Value::as_array) else {
        return WorkloadStats::default();
    };

    let mut stats = WorkloadStats::default();
    let mut total_seconds: i64 = 0;
    for session in sessions {
        let start = field(session, "start", "start_time").and_then(timestamp);
        let end = field(session, "end", "end_time").and_then(timestamp);
        match (start, end) {
            (Some(start), Some(end)) if end >= start => {
                total_seconds += (end - start).num_seconds();
                stats.completed_sessions += 1;
            }
            (Some(_), None) => stats.open_sessions += 1,
            _ => {}
        }
    }
    #[allow(clippy::cast_precision_loss)]
    {
        stats.total_hours = total_seconds as f64 / 3600.0;
    }
    stats
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Home,
    Away,
}

impl Side {
    /// Payload field holding this side's score
    pub const fn score_field(self) -> &'static str {
        match self {
            Self::Home => "home_score",
            Self::Away => "away_score",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Home => "home",
            Self::Away => "away",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Scoreboard {
    pub home: i64,
    pub away: i64,
    pub status: String,
}

impl Scoreboard {
    /// Side currently ahead, `None` on a draw
    pub fn leader(&self) -> Option<Side> {
        match self.home.cmp(&self.away) {
            Ordering::Greater => Some(Side::Home),
            Ordering::Less => Some(Side::Away),
            Ordering::Equal => None,
        }
    }
}

pub fn scoreboard(payload: &Value) -> Scoreboard {
    let score = |side: Side| {
        payload
            .get(side.score_field())
            .and_then(Value::as_i64)
            .unwrap_or_default()
    };
    Scoreboard {
        home: score(Side::Home),
        away: score(Side::Away),
        status: text(payload, "status").unwrap_or_else(|| "scheduled".to_string()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceMark {
    Present,
    Late,
    Absent,
    Excused,
}

impl AttendanceMark {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Late => "late",
            Self::Absent => "absent",
            Self::Excused => "excused",
        }
    }
}

impl FromStr for AttendanceMark {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "present" => Ok(Self::Present),
            "late" => Ok(Self::Late),
            "absent" => Ok(Self::Absent),
            "excused" => Ok(Self::Excused),
            other => Err(Error::InvalidInput(format!(
                "unknown attendance mark '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct AttendanceSummary {
    pub present: usize,
    pub late: usize,
    pub absent: usize,
    pub excused: usize,
    /// Share of non-excused players who attended (present or late)
    pub rate: f64,
}

/// Counts marks in `{ "attendance": { "<player>": "<mark>" } }`.
pub fn attendance_summary(payload: &Value) -> AttendanceSummary {
    let mut summary = AttendanceSummary::default();
    let Some(marks) = payload.get("attendance").and_then(Value::as_object) else {
        return summary;
    };

    for mark in marks.values().filter_map(Value::as_str) {
        match mark.parse() {
            Ok(AttendanceMark::Present) => summary.present += 1,
            Ok(AttendanceMark::Late) => summary.late += 1,
            Ok(AttendanceMark::Absent) => summary.absent += 1,
            Ok(AttendanceMark::Excused) => summary.excused += 1,
            Err(_) => {}
        }
    }

    let attended = summary.present + summary.late;
    let expected = attended + summary.absent;
    if expected > 0 {
        #[allow(clippy::cast_precision_loss)]
        {
            summary.rate = attended as f64 / expected as f64;
        }
    }
    summary
}

/// Indicator for how far a rendered resource can be trusted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Live,
    /// Optimistic changes awaiting the server
    Pending(usize),
    /// Reconciliation failed; data may be out of date
    Stale,
}

impl fmt::Display for Freshness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Live => f.write_str("live"),
            Self::Pending(count) => write!(f, "{count} pending"),
            Self::Stale => f.write_str("data may be out of date"),
        }
    }
}

pub fn freshness(state: &ResourceState) -> Freshness {
    if state.is_stale() {
        Freshness::Stale
    } else if state.has_pending() {
        Freshness::Pending(state.pending_mutations.len())
    } else {
        Freshness::Live
    }
}

fn text(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

fn field<'a>(value: &'a Value, key: &str, alias: &str) -> Option<&'a Value> {
    value
        .get(key)
        .or_else(|| value.get(alias))
        .filter(|value| !value.is_null())
}

fn timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(raw) => DateTime::parse_from_rfc3339(raw.trim())
            .ok()
            .map(|parsed| parsed.with_timezone(&Utc)),
        Value::Number(millis) => DateTime::from_timestamp_millis(millis.as_i64()?),
        _ => None,
    }
}
