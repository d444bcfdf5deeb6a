//! Downtime reason codes, keyed by their short code.

use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use super::StoreError;
use crate::model::ReasonCode;

#[derive(Debug, Default, Clone)]
pub struct ReasonUpdate {
    pub description: Option<String>,
    pub is_planned: Option<bool>,
}

fn from_row(row: &Row<'_>) -> rusqlite::Result<ReasonCode> {
    Ok(ReasonCode {
        code: row.get(0)?,
        description: row.get(1)?,
        is_planned: row.get(2)?,
    })
}

pub fn create(
    conn: &Connection,
    code: &str,
    description: &str,
    is_planned: bool,
) -> Result<ReasonCode, StoreError> {
    let reason = ReasonCode {
        code: code.trim().to_string(),
        description: description.to_string(),
        is_planned,
    };
    import(conn, &reason)?;
    info!(code = %reason.code, is_planned, "reason code created");
    Ok(reason)
}

pub fn import(conn: &Connection, reason: &ReasonCode) -> Result<(), StoreError> {
    if reason.code.is_empty() {
        return Err(StoreError::validation("code", "must not be empty"));
    }
    conn.execute(
        "INSERT INTO reason_codes (code, description, is_planned) VALUES (?1, ?2, ?3)",
        params![reason.code, reason.description, reason.is_planned],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, code: &str) -> Result<Option<ReasonCode>, StoreError> {
    Ok(conn
        .query_row(
            "SELECT code, description, is_planned FROM reason_codes WHERE code = ?1",
            params![code],
            from_row,
        )
        .optional()?)
}

pub fn list(conn: &Connection) -> Result<Vec<ReasonCode>, StoreError> {
    let mut stmt =
        conn.prepare("SELECT code, description, is_planned FROM reason_codes ORDER BY code")?;
    let reasons = stmt
        .query_map([], from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(reasons)
}

/// Only planned (`true`) or only unplanned (`false`) codes.
pub fn list_by_planned(conn: &Connection, is_planned: bool) -> Result<Vec<ReasonCode>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT code, description, is_planned FROM reason_codes
         WHERE is_planned = ?1 ORDER BY code",
    )?;
    let reasons = stmt
        .query_map(params![is_planned], from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(reasons)
}

pub fn update(
    conn: &Connection,
    code: &str,
    changes: ReasonUpdate,
) -> Result<Option<ReasonCode>, StoreError> {
    let Some(mut reason) = get(conn, code)? else {
        return Ok(None);
    };
    if let Some(description) = changes.description {
        reason.description = description;
    }
    if let Some(is_planned) = changes.is_planned {
        reason.is_planned = is_planned;
    }
    conn.execute(
        "UPDATE reason_codes SET description = ?1, is_planned = ?2 WHERE code = ?3",
        params![reason.description, reason.is_planned, code],
    )?;
    Ok(Some(reason))
}

/// Cascades to every downtime event carrying this code.
pub fn delete(conn: &Connection, code: &str, is_admin: bool) -> Result<bool, StoreError> {
    debug!(%code, is_admin, "deleting reason code");
    let changed = conn.execute("DELETE FROM reason_codes WHERE code = ?1", params![code])?;
    Ok(changed > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::testing::temp_pool;

    #[test]
    fn test_planned_filter() {
        let (_dir, pool) = temp_pool();
        let conn = pool.get().unwrap();
        create(&conn, "CHG", "Changeover", true).unwrap();
        create(&conn, "JAM", "Material jam", false).unwrap();
        create(&conn, "ELEC", "Electrical fault", false).unwrap();

        let planned = list_by_planned(&conn, true).unwrap();
        assert_eq!(planned.len(), 1);
        assert_eq!(planned[0].code, "CHG");

        let unplanned: Vec<_> = list_by_planned(&conn, false)
            .unwrap()
            .into_iter()
            .map(|r| r.code)
            .collect();
        assert_eq!(unplanned, vec!["ELEC", "JAM"]);
    }

    #[test]
    fn test_update_partial() {
        let (_dir, pool) = temp_pool();
        let conn = pool.get().unwrap();
        create(&conn, "PM", "Preventive maintenance", false).unwrap();

        let r = update(
            &conn,
            "PM",
            ReasonUpdate {
                is_planned: Some(true),
                ..Default::default()
            },
        )
        .unwrap()
        .unwrap();
        assert!(r.is_planned);
        assert_eq!(r.description, "Preventive maintenance");
        assert!(update(&conn, "NOPE", ReasonUpdate::default()).unwrap().is_none());
    }

    #[test]
    fn test_rejects_empty_code() {
        let (_dir, pool) = temp_pool();
        let conn = pool.get().unwrap();
        assert!(create(&conn, "  ", "blank", false).is_err());
    }
}
