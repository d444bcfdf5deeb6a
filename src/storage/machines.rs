use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use super::StoreError;
use crate::model::Machine;

const COLUMNS: &str = "id, name, ideal_cycle_time, location";

/// Partial update; `None` leaves the column untouched.
#[derive(Debug, Default, Clone)]
pub struct MachineUpdate {
    pub name: Option<String>,
    pub ideal_cycle_time: Option<f64>,
    pub location: Option<String>,
}

fn from_row(row: &Row<'_>) -> rusqlite::Result<Machine> {
    Ok(Machine {
        id: row.get(0)?,
        name: row.get(1)?,
        ideal_cycle_time: row.get(2)?,
        location: row.get(3)?,
    })
}

fn check_cycle_time(value: f64) -> Result<(), StoreError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(StoreError::validation(
            "ideal_cycle_time",
            format!("must be a positive number of seconds, got {value}"),
        ));
    }
    Ok(())
}

pub fn create(
    conn: &Connection,
    name: &str,
    ideal_cycle_time: f64,
    location: Option<&str>,
) -> Result<Machine, StoreError> {
    check_cycle_time(ideal_cycle_time)?;
    conn.execute(
        "INSERT INTO machines (name, ideal_cycle_time, location) VALUES (?1, ?2, ?3)",
        params![name, ideal_cycle_time, location],
    )?;
    let id = conn.last_insert_rowid();
    info!(machine_id = id, %name, "machine created");

    Ok(Machine {
        id,
        name: name.to_string(),
        ideal_cycle_time,
        location: location.map(str::to_string),
    })
}

/// Insert a machine keeping its ID (bulk import).
pub fn import(conn: &Connection, machine: &Machine) -> Result<(), StoreError> {
    check_cycle_time(machine.ideal_cycle_time)?;
    conn.execute(
        "INSERT INTO machines (id, name, ideal_cycle_time, location) VALUES (?1, ?2, ?3, ?4)",
        params![
            machine.id,
            machine.name,
            machine.ideal_cycle_time,
            machine.location
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, id: i64) -> Result<Option<Machine>, StoreError> {
    let machine = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM machines WHERE id = ?1"),
            params![id],
            from_row,
        )
        .optional()?;
    Ok(machine)
}

pub fn list(conn: &Connection) -> Result<Vec<Machine>, StoreError> {
    let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM machines ORDER BY id"))?;
    let rows = stmt.query_map([], from_row)?;

    let mut machines = Vec::new();
    for r in rows {
        machines.push(r?);
    }
    Ok(machines)
}

/// Returns `None` if the machine does not exist.
pub fn update(
    conn: &Connection,
    id: i64,
    changes: MachineUpdate,
) -> Result<Option<Machine>, StoreError> {
    let Some(mut machine) = get(conn, id)? else {
        return Ok(None);
    };

    if let Some(name) = changes.name {
        machine.name = name;
    }
    if let Some(cycle) = changes.ideal_cycle_time {
        check_cycle_time(cycle)?;
        machine.ideal_cycle_time = cycle;
    }
    if let Some(location) = changes.location {
        machine.location = Some(location);
    }

    conn.execute(
        "UPDATE machines SET name = ?1, ideal_cycle_time = ?2, location = ?3 WHERE id = ?4",
        params![machine.name, machine.ideal_cycle_time, machine.location, id],
    )?;
    Ok(Some(machine))
}

/// Delete a machine and, through the foreign keys, its runs and their
/// downtime. `is_admin` is accepted but not enforced.
pub fn delete(conn: &Connection, id: i64, is_admin: bool) -> Result<bool, StoreError> {
    debug!(machine_id = id, is_admin, "deleting machine");
    let changed = conn.execute("DELETE FROM machines WHERE id = ?1", params![id])?;
    Ok(changed > 0)
}
