use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use super::StoreError;
use crate::model::Operator;

fn from_row(row: &Row<'_>) -> rusqlite::Result<Operator> {
    Ok(Operator {
        id: row.get(0)?,
        name: row.get(1)?,
    })
}

pub fn create(conn: &Connection, name: &str) -> Result<Operator, StoreError> {
    conn.execute("INSERT INTO operators (name) VALUES (?1)", params![name])?;
    let id = conn.last_insert_rowid();
    info!(operator_id = id, "operator created");
    Ok(Operator {
        id,
        name: name.to_string(),
    })
}

pub fn import(conn: &Connection, operator: &Operator) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO operators (id, name) VALUES (?1, ?2)",
        params![operator.id, operator.name],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, id: i64) -> Result<Option<Operator>, StoreError> {
    Ok(conn
        .query_row(
            "SELECT id, name FROM operators WHERE id = ?1",
            params![id],
            from_row,
        )
        .optional()?)
}

pub fn list(conn: &Connection) -> Result<Vec<Operator>, StoreError> {
    let mut stmt = conn.prepare("SELECT id, name FROM operators ORDER BY id")?;
    let operators = stmt
        .query_map([], from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(operators)
}

pub fn update(conn: &Connection, id: i64, name: &str) -> Result<Option<Operator>, StoreError> {
    let changed = conn.execute(
        "UPDATE operators SET name = ?1 WHERE id = ?2",
        params![name, id],
    )?;
    Ok((changed > 0).then(|| Operator {
        id,
        name: name.to_string(),
    }))
}

pub fn delete(conn: &Connection, id: i64, is_admin: bool) -> Result<bool, StoreError> {
    debug!(operator_id = id, is_admin, "deleting operator");
    let changed = conn.execute("DELETE FROM operators WHERE id = ?1", params![id])?;
    Ok(changed > 0)
}
