//! Availability, Performance, Quality and OEE for a single run.
//!
//! - Availability = RunTime / PlannedTime
//! - Performance  = (ideal cycle time x total parts) / RunTime
//! - Quality      = good parts / total parts
//! - OEE          = Availability x Performance x Quality
//!
//! RunTime is the actual elapsed time minus every *closed* downtime interval
//! of the run. Ongoing downtime counts as zero until it is stopped.

use chrono::NaiveDateTime;

use super::{Ineligible, OeeResult};
use crate::model::{intervals_overlap, seconds_between, DowntimeEvent, ProductionRun};

/// Everything needed to score one run.
#[derive(Debug, Clone, Copy)]
pub struct RunSnapshot<'a> {
    pub run: &'a ProductionRun,
    /// `None` when the run's machine could not be loaded.
    pub ideal_cycle_time: Option<f64>,
    /// Downtime events of this run.
    pub downtime: &'a [DowntimeEvent],
}

/// Scheduled duration in seconds.
pub fn planned_time(run: &ProductionRun) -> f64 {
    seconds_between(run.planned_start_time, run.planned_end_time)
}

/// Closed downtime intervals must not end before they start or overlap each
/// other; otherwise subtracting them would misstate run time. Overlap uses the
/// same half-open rule as the store, so touching and zero-length intervals at
/// a boundary are accepted.
pub fn check_downtime(events: &[DowntimeEvent]) -> Result<(), Ineligible> {
    let mut closed: Vec<_> = events
        .iter()
        .filter_map(|e| e.end_time.map(|end| (e.start_time, end, e.id)))
        .collect();
    // Ending earlier first, so an empty interval at a shared start is
    // compared against what precedes it rather than what follows.
    closed.sort_by_key(|&(start, end, id)| (start, end, id));

    // The interval reaching furthest so far.
    let mut latest: Option<(NaiveDateTime, NaiveDateTime, i64)> = None;
    for (start, end, id) in closed {
        if end < start {
            return Err(Ineligible::InvertedDowntime { event_id: id });
        }
        if let Some((latest_start, latest_end, latest_id)) = latest {
            if intervals_overlap(latest_start, latest_end, start, end) {
                return Err(Ineligible::OverlappingDowntime {
                    first: latest_id,
                    second: id,
                });
            }
        }
        if latest.map_or(true, |(_, latest_end, _)| end > latest_end) {
            latest = Some((start, end, id));
        }
    }
    Ok(())
}

/// Sum of closed downtime in seconds.
pub fn downtime_secs(events: &[DowntimeEvent]) -> f64 {
    events.iter().filter_map(DowntimeEvent::duration_secs).sum()
}

/// Actual elapsed time minus closed downtime, in seconds.
pub fn run_time(snapshot: &RunSnapshot<'_>) -> Result<f64, Ineligible> {
    let run = snapshot.run;
    let start = run.actual_start_time.ok_or(Ineligible::NotStarted)?;
    let end = run.actual_end_time.ok_or(Ineligible::NotStopped)?;
    check_downtime(snapshot.downtime)?;

    Ok(seconds_between(start, end) - downtime_secs(snapshot.downtime))
}

pub fn availability(snapshot: &RunSnapshot<'_>) -> Result<f64, Ineligible> {
    let run_time = run_time(snapshot)?;
    availability_from(snapshot.run, run_time)
}

fn availability_from(run: &ProductionRun, run_time: f64) -> Result<f64, Ineligible> {
    let planned = planned_time(run);
    if planned <= 0.0 {
        return Err(Ineligible::ZeroPlannedTime { seconds: planned });
    }
    Ok(run_time / planned)
}

/// Good plus rejected parts; requires both counts.
fn total_parts(run: &ProductionRun) -> Result<u64, Ineligible> {
    match (run.good_parts_count, run.rejected_parts_count) {
        (Some(good), Some(rejected)) => Ok(u64::from(good) + u64::from(rejected)),
        _ => Err(Ineligible::MissingPartCounts),
    }
}

pub fn performance(snapshot: &RunSnapshot<'_>) -> Result<f64, Ineligible> {
    let run_time = run_time(snapshot)?;
    performance_from(snapshot, run_time)
}

fn performance_from(snapshot: &RunSnapshot<'_>, run_time: f64) -> Result<f64, Ineligible> {
    let total = total_parts(snapshot.run)?;
    if run_time <= 0.0 {
        return Err(Ineligible::NonPositiveRunTime { seconds: run_time });
    }
    let cycle = snapshot
        .ideal_cycle_time
        .filter(|c| c.is_finite())
        .ok_or(Ineligible::UnknownCycleTime)?;
    Ok(cycle * total as f64 / run_time)
}

/// Only needs part counts; zero total parts is undefined, not zero.
pub fn quality(run: &ProductionRun) -> Result<f64, Ineligible> {
    let total = total_parts(run)?;
    if total == 0 {
        return Err(Ineligible::NoPartsProduced);
    }
    let good = run.good_parts_count.unwrap_or_default();
    Ok(f64::from(good) / total as f64)
}

/// Score a run. Fails with the first reason any sub-metric is undefined.
pub fn evaluate(snapshot: &RunSnapshot<'_>) -> Result<OeeResult, Ineligible> {
    let run_time = run_time(snapshot)?;
    let availability = availability_from(snapshot.run, run_time)?;
    let performance = performance_from(snapshot, run_time)?;
    let quality = quality(snapshot.run)?;

    Ok(OeeResult {
        availability,
        performance,
        quality,
        oee: availability * performance * quality,
    })
}
