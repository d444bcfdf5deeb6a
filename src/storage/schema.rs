//! Database schema and migrations.

use rusqlite::{params, Connection};

/// Version recorded in `schema_version` once `migrate` has run.
pub const SCHEMA_VERSION: i64 = 1;

/// Run all pending migrations.
pub fn migrate(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS machines (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            ideal_cycle_time REAL NOT NULL,
            location TEXT
        );

        CREATE TABLE IF NOT EXISTS shifts (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS operators (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS reason_codes (
            code TEXT PRIMARY KEY,
            description TEXT NOT NULL,
            is_planned INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS production_runs (
            id INTEGER PRIMARY KEY,
            machine_id INTEGER NOT NULL REFERENCES machines(id) ON DELETE CASCADE,
            shift_id INTEGER NOT NULL REFERENCES shifts(id) ON DELETE CASCADE,
            operator_id INTEGER NOT NULL REFERENCES operators(id) ON DELETE CASCADE,
            planned_start_time TEXT NOT NULL,
            planned_end_time TEXT NOT NULL,
            actual_start_time TEXT,
            actual_end_time TEXT,
            good_parts_count INTEGER,
            rejected_parts_count INTEGER
        );

        CREATE TABLE IF NOT EXISTS downtime_events (
            id INTEGER PRIMARY KEY,
            production_run_id INTEGER NOT NULL REFERENCES production_runs(id) ON DELETE CASCADE,
            reason_code TEXT NOT NULL REFERENCES reason_codes(code) ON DELETE CASCADE,
            start_time TEXT NOT NULL,
            end_time TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_runs_machine ON production_runs(machine_id);
        CREATE INDEX IF NOT EXISTS idx_runs_shift ON production_runs(shift_id);
        CREATE INDEX IF NOT EXISTS idx_downtime_run ON downtime_events(production_run_id);
        CREATE INDEX IF NOT EXISTS idx_downtime_reason ON downtime_events(reason_code);",
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        params![SCHEMA_VERSION],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrate_creates_tables() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();

        for table in [
            "machines",
            "shifts",
            "operators",
            "reason_codes",
            "production_runs",
            "downtime_events",
        ] {
            let count: i64 = conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
                .unwrap();
            assert_eq!(count, 0, "{table} should start empty");
        }

        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap(); // Should not error
    }
}
