use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use super::StoreError;
use crate::model::Shift;

pub fn create(conn: &Connection, name: &str) -> Result<Shift, StoreError> {
    conn.execute("INSERT INTO shifts (name) VALUES (?1)", params![name])?;
    let id = conn.last_insert_rowid();
    info!(shift_id = id, %name, "shift created");
    Ok(Shift {
        id,
        name: name.to_string(),
    })
}

pub fn import(conn: &Connection, shift: &Shift) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO shifts (id, name) VALUES (?1, ?2)",
        params![shift.id, shift.name],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, id: i64) -> Result<Option<Shift>, StoreError> {
    let shift = conn
        .query_row(
            "SELECT id, name FROM shifts WHERE id = ?1",
            params![id],
            |row| {
                Ok(Shift {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            },
        )
        .optional()?;
    Ok(shift)
}

pub fn list(conn: &Connection) -> Result<Vec<Shift>, StoreError> {
    let mut stmt = conn.prepare("SELECT id, name FROM shifts ORDER BY id")?;
    let rows = stmt.query_map([], |row| {
        Ok(Shift {
            id: row.get(0)?,
            name: row.get(1)?,
        })
    })?;

    let mut shifts = Vec::new();
    for r in rows {
        shifts.push(r?);
    }
    Ok(shifts)
}

pub fn update(conn: &Connection, id: i64, name: &str) -> Result<Option<Shift>, StoreError> {
    let changed = conn.execute(
        "UPDATE shifts SET name = ?1 WHERE id = ?2",
        params![name, id],
    )?;
    if changed == 0 {
        return Ok(None);
    }
    Ok(Some(Shift {
        id,
        name: name.to_string(),
    }))
}

/// Cascades to the shift's runs. `is_admin` is not enforced.
pub fn delete(conn: &Connection, id: i64, is_admin: bool) -> Result<bool, StoreError> {
    debug!(shift_id = id, is_admin, "deleting shift");
    let changed = conn.execute("DELETE FROM shifts WHERE id = ?1", params![id])?;
    Ok(changed > 0)
}
