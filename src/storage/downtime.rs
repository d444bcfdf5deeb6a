//! Downtime events logged against production runs.
//!
//! Closed intervals of one run must not overlap: both `create` (with an end
//! time) and `stop` refuse an interval that shares time with another closed
//! interval of the same run. Ongoing events are not checked until they close.

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use super::StoreError;
use crate::model::{intervals_overlap, DowntimeContext, DowntimeEvent};

const COLUMNS: &str = "id, production_run_id, reason_code, start_time, end_time";

fn from_row(row: &Row<'_>) -> rusqlite::Result<DowntimeEvent> {
    Ok(DowntimeEvent {
        id: row.get(0)?,
        production_run_id: row.get(1)?,
        reason_code: row.get(2)?,
        start_time: row.get(3)?,
        end_time: row.get(4)?,
    })
}

fn query_events(
    conn: &Connection,
    filter: &str,
    args: impl rusqlite::Params,
) -> Result<Vec<DowntimeEvent>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM downtime_events {filter} ORDER BY start_time, id"
    ))?;
    let events = stmt
        .query_map(args, from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(events)
}

/// Reject `[start, end)` if it inverts or overlaps another closed event of
/// the same run. `exclude` skips the event being closed.
fn check_interval(
    conn: &Connection,
    run_id: i64,
    exclude: Option<i64>,
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> Result<(), StoreError> {
    if end < start {
        return Err(StoreError::validation(
            "end_time",
            format!("downtime end {end} is before its start {start}"),
        ));
    }

    for other in list_by_run(conn, run_id)? {
        if Some(other.id) == exclude {
            continue;
        }
        if let Some(other_end) = other.end_time {
            if intervals_overlap(start, end, other.start_time, other_end) {
                return Err(StoreError::validation(
                    "downtime",
                    format!(
                        "interval {start} - {end} overlaps downtime event {} ({} - {other_end}) on run {run_id}",
                        other.id, other.start_time
                    ),
                ));
            }
        }
    }
    Ok(())
}

/// Log downtime for a run. `start` defaults to `now`; leaving `end` empty
/// records an ongoing stoppage.
pub fn create(
    conn: &Connection,
    run_id: i64,
    reason_code: &str,
    start: Option<NaiveDateTime>,
    end: Option<NaiveDateTime>,
    now: NaiveDateTime,
) -> Result<DowntimeEvent, StoreError> {
    let start = start.unwrap_or(now);
    if let Some(end) = end {
        check_interval(conn, run_id, None, start, end)?;
    }

    conn.execute(
        "INSERT INTO downtime_events (production_run_id, reason_code, start_time, end_time)
         VALUES (?1, ?2, ?3, ?4)",
        params![run_id, reason_code, start, end],
    )?;
    let id = conn.last_insert_rowid();
    info!(event_id = id, run_id, %reason_code, "downtime logged");

    Ok(DowntimeEvent {
        id,
        production_run_id: run_id,
        reason_code: reason_code.to_string(),
        start_time: start,
        end_time: end,
    })
}

/// Insert an event keeping its ID. Interval rules still apply.
pub fn import(conn: &Connection, event: &DowntimeEvent) -> Result<(), StoreError> {
    if let Some(end) = event.end_time {
        check_interval(conn, event.production_run_id, None, event.start_time, end)?;
    }
    conn.execute(
        &format!("INSERT INTO downtime_events ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5)"),
        params![
            event.id,
            event.production_run_id,
            event.reason_code,
            event.start_time,
            event.end_time
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, id: i64) -> Result<Option<DowntimeEvent>, StoreError> {
    Ok(conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM downtime_events WHERE id = ?1"),
            params![id],
            from_row,
        )
        .optional()?)
}

pub fn list(conn: &Connection) -> Result<Vec<DowntimeEvent>, StoreError> {
    query_events(conn, "", [])
}

pub fn list_by_run(conn: &Connection, run_id: i64) -> Result<Vec<DowntimeEvent>, StoreError> {
    query_events(conn, "WHERE production_run_id = ?1", params![run_id])
}

/// Ongoing stoppages across all runs.
pub fn list_active(conn: &Connection) -> Result<Vec<DowntimeEvent>, StoreError> {
    query_events(conn, "WHERE end_time IS NULL", [])
}

/// Downtime of every run on a machine.
pub fn list_by_machine(conn: &Connection, machine_id: i64) -> Result<Vec<DowntimeEvent>, StoreError> {
    query_events(
        conn,
        "WHERE production_run_id IN (SELECT id FROM production_runs WHERE machine_id = ?1)",
        params![machine_id],
    )
}

/// Downtime of every run in a shift.
pub fn list_by_shift(conn: &Connection, shift_id: i64) -> Result<Vec<DowntimeEvent>, StoreError> {
    query_events(
        conn,
        "WHERE production_run_id IN (SELECT id FROM production_runs WHERE shift_id = ?1)",
        params![shift_id],
    )
}

/// Every event with its reason description and its parent run's actual window.
pub fn list_with_context(conn: &Connection) -> Result<Vec<DowntimeContext>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT d.id, d.production_run_id, d.reason_code, d.start_time, d.end_time,
                rc.description, rc.is_planned, r.actual_start_time, r.actual_end_time
         FROM downtime_events d
         JOIN reason_codes rc ON rc.code = d.reason_code
         JOIN production_runs r ON r.id = d.production_run_id
         ORDER BY d.id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(DowntimeContext {
            event: from_row(row)?,
            description: row.get(5)?,
            is_planned: row.get(6)?,
            run_actual_start: row.get(7)?,
            run_actual_end: row.get(8)?,
        })
    })?;

    let mut events = Vec::new();
    for r in rows {
        events.push(r?);
    }
    Ok(events)
}

/// Close an ongoing event at `at`. Closing an already closed event moves its
/// end time (last writer wins).
pub fn stop(
    conn: &Connection,
    id: i64,
    at: NaiveDateTime,
) -> Result<Option<DowntimeEvent>, StoreError> {
    let Some(mut event) = get(conn, id)? else {
        return Ok(None);
    };
    check_interval(conn, event.production_run_id, Some(id), event.start_time, at)?;

    conn.execute(
        "UPDATE downtime_events SET end_time = ?1 WHERE id = ?2",
        params![at, id],
    )?;
    event.end_time = Some(at);
    info!(event_id = id, %at, "downtime stopped");
    Ok(Some(event))
}

pub fn delete(conn: &Connection, id: i64, is_admin: bool) -> Result<bool, StoreError> {
    debug!(event_id = id, is_admin, "deleting downtime event");
    let changed = conn.execute("DELETE FROM downtime_events WHERE id = ?1", params![id])?;
    Ok(changed > 0)
}
