//! Report entry points: load snapshots from the store, score them with the
//! `oee` engine and attach display names.
//!
//! Each function runs inside one read transaction of the caller's session.
//! "Nothing to report" comes back as `None`, [`GroupOutcome::NoData`] or an
//! empty `Vec`; only storage failures are errors.

pub mod format;

use std::collections::{BTreeMap, HashMap};
use std::num::NonZeroUsize;

use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::model::{DowntimeEvent, ProductionRun};
use crate::oee::{
    self, DateRange, DowntimeReasonTotal, Ineligible, OeeAggregate, OeeResult, Ranked, RunSnapshot,
};
use crate::storage::{downtime, machines, runs, shifts, Session, StoreError};

/// Aggregate for one named machine or shift.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupReport {
    pub id: i64,
    pub name: String,
    pub range: DateRange,
    #[serde(flatten)]
    pub aggregate: OeeAggregate,
}

/// Outcome of a machine or shift aggregate.
#[derive(Debug, Clone, PartialEq)]
pub enum GroupOutcome {
    Scored(GroupReport),
    /// Candidates were considered but none could be scored.
    NoData {
        id: i64,
        name: String,
        range: DateRange,
        runs_total: usize,
    },
}

impl GroupOutcome {
    pub fn runs_total(&self) -> usize {
        match self {
            Self::Scored(report) => report.aggregate.runs_total,
            Self::NoData { runs_total, .. } => *runs_total,
        }
    }

    pub fn runs_included(&self) -> usize {
        match self {
            Self::Scored(report) => report.aggregate.runs_included,
            Self::NoData { .. } => 0,
        }
    }

    pub fn scored(self) -> Option<GroupReport> {
        match self {
            Self::Scored(report) => Some(report),
            Self::NoData { .. } => None,
        }
    }
}

pub fn machine_label(id: i64) -> String {
    format!("Machine {id}")
}

pub fn shift_label(id: i64) -> String {
    format!("Shift {id}")
}

/// OEE for a single run, or `None` if the run is unknown or cannot be scored.
#[instrument(skip(session))]
pub fn run_oee(session: &mut Session, run_id: i64) -> Result<Option<OeeResult>, StoreError> {
    session.read(|conn| {
        let Some(run) = runs::get(conn, run_id)? else {
            debug!(run_id, "run not found");
            return Ok(None);
        };
        let cycle = machines::get(conn, run.machine_id)?.map(|m| m.ideal_cycle_time);
        let events = downtime::list_by_run(conn, run_id)?;
        let snapshot = RunSnapshot {
            run: &run,
            ideal_cycle_time: cycle,
            downtime: &events,
        };
        Ok(score(&snapshot).ok())
    })
}

#[instrument(skip(session))]
pub fn machine_oee(
    session: &mut Session,
    machine_id: i64,
    range: &DateRange,
) -> Result<GroupOutcome, StoreError> {
    session.read(|conn| {
        let machine = machines::get(conn, machine_id)?;
        let name = machine
            .as_ref()
            .map(|m| m.name.clone())
            .unwrap_or_else(|| machine_label(machine_id));
        let cycle_times: HashMap<i64, f64> = machine
            .into_iter()
            .map(|m| (m.id, m.ideal_cycle_time))
            .collect();

        let runs = runs::list_by_machine(conn, machine_id)?;
        let events = downtime::list_by_machine(conn, machine_id)?;
        Ok(group_report(machine_id, name, &runs, &cycle_times, &events, range))
    })
}

#[instrument(skip(session))]
pub fn shift_oee(
    session: &mut Session,
    shift_id: i64,
    range: &DateRange,
) -> Result<GroupOutcome, StoreError> {
    session.read(|conn| {
        let name = shifts::get(conn, shift_id)?
            .map(|s| s.name)
            .unwrap_or_else(|| shift_label(shift_id));
        let cycle_times = cycle_times(conn)?;
        let runs = runs::list_by_shift(conn, shift_id)?;
        let events = downtime::list_by_shift(conn, shift_id)?;
        Ok(group_report(shift_id, name, &runs, &cycle_times, &events, range))
    })
}

/// Machines with at least one scored run, best mean OEE first.
#[instrument(skip(session))]
pub fn rank_machines(session: &mut Session, range: &DateRange) -> Result<Vec<Ranked>, StoreError> {
    session.read(|conn| {
        let names: HashMap<i64, String> = machines::list(conn)?
            .into_iter()
            .map(|m| (m.id, m.name))
            .collect();
        let cycle_times = cycle_times(conn)?;
        let all_runs = runs::list(conn)?;
        let events = downtime::list(conn)?;

        Ok(ranking(&all_runs, |r| r.machine_id, &cycle_times, &events, range, |id| {
            names.get(&id).cloned().unwrap_or_else(|| machine_label(id))
        }))
    })
}

/// Shifts with at least one scored run, best mean OEE first.
#[instrument(skip(session))]
pub fn compare_shifts(session: &mut Session, range: &DateRange) -> Result<Vec<Ranked>, StoreError> {
    session.read(|conn| {
        let names: HashMap<i64, String> = shifts::list(conn)?
            .into_iter()
            .map(|s| (s.id, s.name))
            .collect();
        let cycle_times = cycle_times(conn)?;
        let all_runs = runs::list(conn)?;
        let events = downtime::list(conn)?;

        Ok(ranking(&all_runs, |r| r.shift_id, &cycle_times, &events, range, |id| {
            names.get(&id).cloned().unwrap_or_else(|| shift_label(id))
        }))
    })
}

#[instrument(skip(session))]
pub fn top_downtime_reasons(
    session: &mut Session,
    range: &DateRange,
    limit: NonZeroUsize,
) -> Result<Vec<DowntimeReasonTotal>, StoreError> {
    session.read(|conn| {
        let events = downtime::list_with_context(conn)?;
        let top = oee::top_downtime_reasons(&events, range, limit);
        debug!(events = events.len(), reasons = top.len(), "downtime reasons summed");
        Ok(top)
    })
}

fn cycle_times(conn: &Connection) -> Result<HashMap<i64, f64>, StoreError> {
    Ok(machines::list(conn)?
        .into_iter()
        .map(|m| (m.id, m.ideal_cycle_time))
        .collect())
}

fn score(snapshot: &RunSnapshot<'_>) -> Result<OeeResult, Ineligible> {
    let result = oee::evaluate(snapshot);
    if let Err(reason) = &result {
        debug!(run_id = snapshot.run.id, %reason, "run excluded from OEE");
    }
    result
}

/// Score every run of `runs` admitted by `range`. Returns the aggregate
/// (if any run scored) and the candidate count.
fn aggregate_runs<'a>(
    runs: impl IntoIterator<Item = &'a ProductionRun>,
    cycle_times: &HashMap<i64, f64>,
    downtime_by_run: &HashMap<i64, Vec<DowntimeEvent>>,
    range: &DateRange,
) -> (Option<OeeAggregate>, usize) {
    let results: Vec<_> = runs
        .into_iter()
        .filter(|run| range.admits_run(run))
        .map(|run| {
            let events = downtime_by_run.get(&run.id).map_or(&[][..], Vec::as_slice);
            score(&RunSnapshot {
                run,
                ideal_cycle_time: cycle_times.get(&run.machine_id).copied(),
                downtime: events,
            })
        })
        .collect();
    let total = results.len();
    (oee::summarize(results), total)
}

fn group_by_run(events: &[DowntimeEvent]) -> HashMap<i64, Vec<DowntimeEvent>> {
    let mut by_run: HashMap<i64, Vec<DowntimeEvent>> = HashMap::new();
    for event in events {
        by_run
            .entry(event.production_run_id)
            .or_default()
            .push(event.clone());
    }
    by_run
}

fn group_report(
    id: i64,
    name: String,
    runs: &[ProductionRun],
    cycle_times: &HashMap<i64, f64>,
    events: &[DowntimeEvent],
    range: &DateRange,
) -> GroupOutcome {
    let downtime_by_run = group_by_run(events);
    let (aggregate, runs_total) = aggregate_runs(runs, cycle_times, &downtime_by_run, range);
    match aggregate {
        Some(aggregate) => GroupOutcome::Scored(GroupReport {
            id,
            name,
            range: *range,
            aggregate,
        }),
        None => {
            info!(id, runs_total, "no scorable runs in range");
            GroupOutcome::NoData {
                id,
                name,
                range: *range,
                runs_total,
            }
        }
    }
}

fn ranking(
    all_runs: &[ProductionRun],
    key: impl Fn(&ProductionRun) -> i64,
    cycle_times: &HashMap<i64, f64>,
    events: &[DowntimeEvent],
    range: &DateRange,
    name_of: impl Fn(i64) -> String,
) -> Vec<Ranked> {
    let downtime_by_run = group_by_run(events);
    let mut groups: BTreeMap<i64, Vec<&ProductionRun>> = BTreeMap::new();
    for run in all_runs {
        groups.entry(key(run)).or_default().push(run);
    }

    oee::rank(groups.into_iter().filter_map(|(id, runs)| {
        let (aggregate, _) = aggregate_runs(runs, cycle_times, &downtime_by_run, range);
        aggregate.map(|aggregate| Ranked {
            id,
            name: name_of(id),
            aggregate,
        })
    }))
}
