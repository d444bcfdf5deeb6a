//! Production runs and their Pending -> Running -> Completed lifecycle.

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info, warn};

use super::StoreError;
use crate::model::{ProductionRun, RunStatus};

const COLUMNS: &str = "id, machine_id, shift_id, operator_id, planned_start_time, planned_end_time,
     actual_start_time, actual_end_time, good_parts_count, rejected_parts_count";

/// A scheduled run that has not started yet.
#[derive(Debug, Clone)]
pub struct NewRun {
    pub machine_id: i64,
    pub shift_id: i64,
    pub operator_id: i64,
    pub planned_start_time: NaiveDateTime,
    pub planned_end_time: NaiveDateTime,
}

fn from_row(row: &Row<'_>) -> rusqlite::Result<ProductionRun> {
    Ok(ProductionRun {
        id: row.get(0)?,
        machine_id: row.get(1)?,
        shift_id: row.get(2)?,
        operator_id: row.get(3)?,
        planned_start_time: row.get(4)?,
        planned_end_time: row.get(5)?,
        actual_start_time: row.get(6)?,
        actual_end_time: row.get(7)?,
        good_parts_count: row.get(8)?,
        rejected_parts_count: row.get(9)?,
    })
}

fn check_planned_window(start: NaiveDateTime, end: NaiveDateTime) -> Result<(), StoreError> {
    if end <= start {
        return Err(StoreError::validation(
            "planned_end_time",
            format!("planned end {end} must be after planned start {start}"),
        ));
    }
    Ok(())
}

fn query_runs(
    conn: &Connection,
    filter: &str,
    args: impl rusqlite::Params,
) -> Result<Vec<ProductionRun>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM production_runs {filter} ORDER BY id"
    ))?;
    let runs = stmt
        .query_map(args, from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(runs)
}

pub fn create(conn: &Connection, new: &NewRun) -> Result<ProductionRun, StoreError> {
    check_planned_window(new.planned_start_time, new.planned_end_time)?;
    conn.execute(
        "INSERT INTO production_runs
            (machine_id, shift_id, operator_id, planned_start_time, planned_end_time)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            new.machine_id,
            new.shift_id,
            new.operator_id,
            new.planned_start_time,
            new.planned_end_time
        ],
    )?;
    let id = conn.last_insert_rowid();
    info!(run_id = id, machine_id = new.machine_id, "production run scheduled");

    Ok(ProductionRun {
        id,
        machine_id: new.machine_id,
        shift_id: new.shift_id,
        operator_id: new.operator_id,
        planned_start_time: new.planned_start_time,
        planned_end_time: new.planned_end_time,
        actual_start_time: None,
        actual_end_time: None,
        good_parts_count: None,
        rejected_parts_count: None,
    })
}

/// Insert a run as-is, keeping its ID and any recorded actuals.
pub fn import(conn: &Connection, run: &ProductionRun) -> Result<(), StoreError> {
    check_planned_window(run.planned_start_time, run.planned_end_time)?;
    conn.execute(
        &format!("INSERT INTO production_runs ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"),
        params![
            run.id,
            run.machine_id,
            run.shift_id,
            run.operator_id,
            run.planned_start_time,
            run.planned_end_time,
            run.actual_start_time,
            run.actual_end_time,
            run.good_parts_count,
            run.rejected_parts_count
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, id: i64) -> Result<Option<ProductionRun>, StoreError> {
    Ok(conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM production_runs WHERE id = ?1"),
            params![id],
            from_row,
        )
        .optional()?)
}

pub fn list(conn: &Connection) -> Result<Vec<ProductionRun>, StoreError> {
    query_runs(conn, "", [])
}

/// Runs that have started but not stopped.
pub fn list_active(conn: &Connection) -> Result<Vec<ProductionRun>, StoreError> {
    query_runs(
        conn,
        "WHERE actual_start_time IS NOT NULL AND actual_end_time IS NULL",
        [],
    )
}

pub fn list_by_machine(conn: &Connection, machine_id: i64) -> Result<Vec<ProductionRun>, StoreError> {
    query_runs(conn, "WHERE machine_id = ?1", params![machine_id])
}

pub fn list_by_shift(conn: &Connection, shift_id: i64) -> Result<Vec<ProductionRun>, StoreError> {
    query_runs(conn, "WHERE shift_id = ?1", params![shift_id])
}

/// Mark a run as started at `at`. Restarting a running run overwrites the
/// start time (last writer wins); a completed run cannot be restarted.
pub fn start(
    conn: &Connection,
    id: i64,
    at: NaiveDateTime,
) -> Result<Option<ProductionRun>, StoreError> {
    let Some(mut run) = get(conn, id)? else {
        return Ok(None);
    };

    match run.status() {
        RunStatus::Completed => {
            return Err(StoreError::InvalidTransition {
                run_id: id,
                status: RunStatus::Completed,
                action: "start",
            })
        }
        RunStatus::Running => {
            warn!(run_id = id, previous = ?run.actual_start_time, "run already started; overwriting start time");
        }
        RunStatus::Pending => {}
    }

    conn.execute(
        "UPDATE production_runs SET actual_start_time = ?1 WHERE id = ?2",
        params![at, id],
    )?;
    run.actual_start_time = Some(at);
    info!(run_id = id, %at, "production run started");
    Ok(Some(run))
}

/// Stop a running run at `at` and record its part counts.
pub fn stop(
    conn: &Connection,
    id: i64,
    good_parts: u32,
    rejected_parts: u32,
    at: NaiveDateTime,
) -> Result<Option<ProductionRun>, StoreError> {
    let Some(mut run) = get(conn, id)? else {
        return Ok(None);
    };

    let started = match (run.status(), run.actual_start_time) {
        (RunStatus::Running, Some(started)) => started,
        (status, _) => {
            return Err(StoreError::InvalidTransition {
                run_id: id,
                status,
                action: "stop",
            })
        }
    };
    if at < started {
        return Err(StoreError::validation(
            "actual_end_time",
            format!("stop time {at} is before the run started at {started}"),
        ));
    }

    conn.execute(
        "UPDATE production_runs
         SET actual_end_time = ?1, good_parts_count = ?2, rejected_parts_count = ?3
         WHERE id = ?4",
        params![at, good_parts, rejected_parts, id],
    )?;
    run.actual_end_time = Some(at);
    run.good_parts_count = Some(good_parts);
    run.rejected_parts_count = Some(rejected_parts);
    info!(run_id = id, good_parts, rejected_parts, "production run stopped");
    Ok(Some(run))
}

/// Correct recorded part counts; `None` keeps the stored value.
pub fn update_counts(
    conn: &Connection,
    id: i64,
    good_parts: Option<u32>,
    rejected_parts: Option<u32>,
) -> Result<Option<ProductionRun>, StoreError> {
    let Some(mut run) = get(conn, id)? else {
        return Ok(None);
    };
    if good_parts.is_some() {
        run.good_parts_count = good_parts;
    }
    if rejected_parts.is_some() {
        run.rejected_parts_count = rejected_parts;
    }
    conn.execute(
        "UPDATE production_runs SET good_parts_count = ?1, rejected_parts_count = ?2 WHERE id = ?3",
        params![run.good_parts_count, run.rejected_parts_count, id],
    )?;
    debug!(run_id = id, ?good_parts, ?rejected_parts, "part counts corrected");
    Ok(Some(run))
}

/// Cascades to the run's downtime events. `is_admin` is not enforced.
pub fn delete(conn: &Connection, id: i64, is_admin: bool) -> Result<bool, StoreError> {
    debug!(run_id = id, is_admin, "deleting production run");
    let changed = conn.execute("DELETE FROM production_runs WHERE id = ?1", params![id])?;
    Ok(changed > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::parse_timestamp;
    use crate::storage::{machines, operators, shifts, testing::temp_pool};

    fn ts(s: &str) -> NaiveDateTime {
        parse_timestamp(s).unwrap()
    }

    fn seed(conn: &Connection) -> NewRun {
        let m = machines::create(conn, "Lathe", 30.0, None).unwrap();
        let s = shifts::create(conn, "Day").unwrap();
        let o = operators::create(conn, "Ana").unwrap();
        NewRun {
            machine_id: m.id,
            shift_id: s.id,
            operator_id: o.id,
            planned_start_time: ts("2024-05-06 06:00:00"),
            planned_end_time: ts("2024-05-06 14:00:00"),
        }
    }

    #[test]
    fn test_lifecycle_roundtrip() {
        let (_dir, pool) = temp_pool();
        let conn = pool.get().unwrap();
        let new = seed(&conn);

        let run = create(&conn, &new).unwrap();
        assert_eq!(run.status(), RunStatus::Pending);
        assert_eq!(get(&conn, run.id).unwrap().unwrap(), run);

        start(&conn, run.id, ts("2024-05-06 06:10:00")).unwrap().unwrap();
        assert_eq!(list_active(&conn).unwrap().len(), 1);

        let stopped = stop(&conn, run.id, 400, 12, ts("2024-05-06 13:50:00"))
            .unwrap()
            .unwrap();
        assert_eq!(stopped.status(), RunStatus::Completed);
        assert_eq!(stopped.good_parts_count, Some(400));
        assert_eq!(stopped.rejected_parts_count, Some(12));
        assert_eq!(get(&conn, run.id).unwrap().unwrap(), stopped);
        assert!(list_active(&conn).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_transitions() {
        let (_dir, pool) = temp_pool();
        let conn = pool.get().unwrap();
        let run = create(&conn, &seed(&conn)).unwrap();

        let err = stop(&conn, run.id, 1, 0, ts("2024-05-06 07:00:00")).unwrap_err();
        assert!(matches!(
            err,
            StoreError::InvalidTransition { status: RunStatus::Pending, .. }
        ));

        start(&conn, run.id, ts("2024-05-06 06:00:00")).unwrap();
        let err = stop(&conn, run.id, 1, 0, ts("2024-05-06 05:00:00")).unwrap_err();
        assert!(matches!(err, StoreError::Validation { .. }));

        stop(&conn, run.id, 1, 0, ts("2024-05-06 07:00:00")).unwrap();
        let err = start(&conn, run.id, ts("2024-05-06 08:00:00")).unwrap_err();
        assert!(matches!(
            err,
            StoreError::InvalidTransition { status: RunStatus::Completed, .. }
        ));
    }

    #[test]
    fn test_restart_overwrites_start_time() {
        let (_dir, pool) = temp_pool();
        let conn = pool.get().unwrap();
        let run = create(&conn, &seed(&conn)).unwrap();

        start(&conn, run.id, ts("2024-05-06 06:00:00")).unwrap();
        start(&conn, run.id, ts("2024-05-06 06:30:00")).unwrap();
        let stored = get(&conn, run.id).unwrap().unwrap();
        assert_eq!(stored.actual_start_time, Some(ts("2024-05-06 06:30:00")));
    }

    #[test]
    fn test_rejects_inverted_planned_window() {
        let (_dir, pool) = temp_pool();
        let conn = pool.get().unwrap();
        let mut new = seed(&conn);
        new.planned_end_time = new.planned_start_time;
        assert!(matches!(
            create(&conn, &new).unwrap_err(),
            StoreError::Validation { .. }
        ));
    }

    #[test]
    fn test_unknown_machine_is_invalid_reference() {
        let (_dir, pool) = temp_pool();
        let conn = pool.get().unwrap();
        let mut new = seed(&conn);
        new.machine_id = 9_999;
        assert!(matches!(
            create(&conn, &new).unwrap_err(),
            StoreError::InvalidReference(_)
        ));
    }

    #[test]
    fn test_update_counts_keeps_missing_values() {
        let (_dir, pool) = temp_pool();
        let conn = pool.get().unwrap();
        let run = create(&conn, &seed(&conn)).unwrap();
        start(&conn, run.id, ts("2024-05-06 06:00:00")).unwrap();
        stop(&conn, run.id, 100, 5, ts("2024-05-06 14:00:00")).unwrap();

        let fixed = update_counts(&conn, run.id, None, Some(3)).unwrap().unwrap();
        assert_eq!(fixed.good_parts_count, Some(100));
        assert_eq!(fixed.rejected_parts_count, Some(3));
    }

    #[test]
    fn test_deleting_machine_cascades_to_runs() {
        let (_dir, pool) = temp_pool();
        let conn = pool.get().unwrap();
        let new = seed(&conn);
        let run = create(&conn, &new).unwrap();

        assert!(machines::delete(&conn, new.machine_id, false).unwrap());
        assert!(get(&conn, run.id).unwrap().is_none());
    }
}
