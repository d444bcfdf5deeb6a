//! Plant entities: machines, shifts, operators, reason codes, production runs
//! and downtime events.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A machine whose runs are scored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Machine {
    pub id: i64,
    pub name: String,
    /// Seconds per part at the rated speed.
    pub ideal_cycle_time: f64,
    pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shift {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operator {
    pub id: i64,
    pub name: String,
}

/// Cause code attached to downtime. Planned codes are scheduled stoppages
/// (changeovers, maintenance windows), unplanned ones are failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasonCode {
    pub code: String,
    pub description: String,
    pub is_planned: bool,
}

/// Lifecycle state of a run, derived from which actual times are set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Pending => write!(f, "Pending"),
            RunStatus::Running => write!(f, "Running"),
            RunStatus::Completed => write!(f, "Completed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionRun {
    pub id: i64,
    pub machine_id: i64,
    pub shift_id: i64,
    pub operator_id: i64,
    pub planned_start_time: NaiveDateTime,
    pub planned_end_time: NaiveDateTime,
    pub actual_start_time: Option<NaiveDateTime>,
    pub actual_end_time: Option<NaiveDateTime>,
    pub good_parts_count: Option<u32>,
    pub rejected_parts_count: Option<u32>,
}

impl ProductionRun {
    pub fn status(&self) -> RunStatus {
        match (self.actual_start_time, self.actual_end_time) {
            (_, Some(_)) => RunStatus::Completed,
            (Some(_), None) => RunStatus::Running,
            (None, None) => RunStatus::Pending,
        }
    }
}

/// A stoppage logged against a run. `end_time == None` means still ongoing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DowntimeEvent {
    pub id: i64,
    pub production_run_id: i64,
    pub reason_code: String,
    pub start_time: NaiveDateTime,
    pub end_time: Option<NaiveDateTime>,
}

impl DowntimeEvent {
    pub fn is_active(&self) -> bool {
        self.end_time.is_none()
    }

    /// Closed interval length in fractional seconds.
    pub fn duration_secs(&self) -> Option<f64> {
        self.end_time.map(|end| seconds_between(self.start_time, end))
    }
}

/// Downtime joined with its reason and the actual window of its parent run,
/// as consumed by the downtime-reason report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DowntimeContext {
    pub event: DowntimeEvent,
    pub description: String,
    pub is_planned: bool,
    pub run_actual_start: Option<NaiveDateTime>,
    pub run_actual_end: Option<NaiveDateTime>,
}

/// Half-open intervals `[a_start, a_end)` and `[b_start, b_end)` share time.
/// Intervals that only touch do not overlap.
pub fn intervals_overlap(
    a_start: NaiveDateTime,
    a_end: NaiveDateTime,
    b_start: NaiveDateTime,
    b_end: NaiveDateTime,
) -> bool {
    a_start < b_end && b_start < a_end
}

/// Signed difference `end - start` in seconds, keeping sub-second precision.
pub fn seconds_between(start: NaiveDateTime, end: NaiveDateTime) -> f64 {
    let delta = end - start;
    match delta.num_microseconds() {
        Some(us) => us as f64 / 1_000_000.0,
        None => delta.num_milliseconds() as f64 / 1_000.0,
    }
}

/// Accepted input layouts for timestamps typed by operators.
const TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

/// Parse `YYYY-MM-DD HH:MM:SS` (also `T`-separated or without seconds).
pub fn parse_timestamp(input: &str) -> Option<NaiveDateTime> {
    let input = input.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(input, fmt).ok())
}
