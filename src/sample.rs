//! Bulk import of sample plant data from a directory of CSV files.
//!
//! Expected files (headers on the first line):
//!
//! | file | columns |
//! |---|---|
//! | `machines.csv` | id, name, ideal_cycle_time, location |
//! | `shifts.csv` | id, name |
//! | `operators.csv` | id, name |
//! | `reason_codes.csv` | code, description, is_planned |
//! | `production_runs.csv` | id, machine_id, shift_id, operator_id, planned_start_time, planned_end_time, actual_start_time, actual_end_time, good_parts_count, rejected_parts_count |
//! | `downtime_events.csv` (optional) | id, production_run_id, reason_code, start_time, end_time |
//!
//! Every file is parsed before anything is written, then all rows are
//! imported with their explicit IDs in one transaction.

use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::model::{parse_timestamp, DowntimeEvent, Machine, Operator, ProductionRun, ReasonCode, Shift};
use crate::storage::{downtime, machines, operators, reasons, runs, shifts, Session, StoreError};

#[derive(Debug, Error)]
pub enum SampleError {
    #[error("cannot open {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed row in {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Rows imported per table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    pub machines: usize,
    pub shifts: usize,
    pub operators: usize,
    pub reason_codes: usize,
    pub production_runs: usize,
    pub downtime_events: usize,
}

impl std::fmt::Display for LoadSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} machines, {} shifts, {} operators, {} reason codes, {} runs, {} downtime events",
            self.machines,
            self.shifts,
            self.operators,
            self.reason_codes,
            self.production_runs,
            self.downtime_events
        )
    }
}

fn timestamp<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
    let raw = String::deserialize(d)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{raw}'")))
}

fn optional_timestamp<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveDateTime>, D::Error> {
    match Option::<String>::deserialize(d)? {
        Some(raw) if !raw.trim().is_empty() => parse_timestamp(&raw)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{raw}'"))),
        _ => Ok(None),
    }
}

fn flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    let raw = String::deserialize(d)?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" | "" => Ok(false),
        other => Err(serde::de::Error::custom(format!("invalid boolean '{other}'"))),
    }
}

#[derive(Debug, Deserialize)]
struct ReasonRow {
    code: String,
    description: String,
    #[serde(deserialize_with = "flag")]
    is_planned: bool,
}

#[derive(Debug, Deserialize)]
struct RunRow {
    id: i64,
    machine_id: i64,
    shift_id: i64,
    operator_id: i64,
    #[serde(deserialize_with = "timestamp")]
    planned_start_time: NaiveDateTime,
    #[serde(deserialize_with = "timestamp")]
    planned_end_time: NaiveDateTime,
    #[serde(default, deserialize_with = "optional_timestamp")]
    actual_start_time: Option<NaiveDateTime>,
    #[serde(default, deserialize_with = "optional_timestamp")]
    actual_end_time: Option<NaiveDateTime>,
    #[serde(default)]
    good_parts_count: Option<u32>,
    #[serde(default)]
    rejected_parts_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct DowntimeRow {
    id: i64,
    production_run_id: i64,
    reason_code: String,
    #[serde(deserialize_with = "timestamp")]
    start_time: NaiveDateTime,
    #[serde(default, deserialize_with = "optional_timestamp")]
    end_time: Option<NaiveDateTime>,
}

fn read_csv<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, SampleError> {
    let file = File::open(path).map_err(|source| SampleError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let rows = reader
        .deserialize()
        .collect::<Result<Vec<T>, _>>()
        .map_err(|source| SampleError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
    debug!(path = %path.display(), rows = rows.len(), "parsed csv");
    Ok(rows)
}

/// Parsed contents of a sample directory.
#[derive(Debug, Default)]
pub struct SampleData {
    pub machines: Vec<Machine>,
    pub shifts: Vec<Shift>,
    pub operators: Vec<Operator>,
    pub reason_codes: Vec<ReasonCode>,
    pub production_runs: Vec<ProductionRun>,
    pub downtime_events: Vec<DowntimeEvent>,
}

impl SampleData {
    pub fn read(dir: &Path) -> Result<Self, SampleError> {
        let reason_codes = read_csv::<ReasonRow>(&dir.join("reason_codes.csv"))?
            .into_iter()
            .map(|r| ReasonCode {
                code: r.code,
                description: r.description,
                is_planned: r.is_planned,
            })
            .collect();

        let production_runs = read_csv::<RunRow>(&dir.join("production_runs.csv"))?
            .into_iter()
            .map(|r| ProductionRun {
                id: r.id,
                machine_id: r.machine_id,
                shift_id: r.shift_id,
                operator_id: r.operator_id,
                planned_start_time: r.planned_start_time,
                planned_end_time: r.planned_end_time,
                actual_start_time: r.actual_start_time,
                actual_end_time: r.actual_end_time,
                good_parts_count: r.good_parts_count,
                rejected_parts_count: r.rejected_parts_count,
            })
            .collect();

        let downtime_path = dir.join("downtime_events.csv");
        let downtime_events = if downtime_path.exists() {
            read_csv::<DowntimeRow>(&downtime_path)?
                .into_iter()
                .map(|r| DowntimeEvent {
                    id: r.id,
                    production_run_id: r.production_run_id,
                    reason_code: r.reason_code,
                    start_time: r.start_time,
                    end_time: r.end_time,
                })
                .collect()
        } else {
            debug!(path = %downtime_path.display(), "no downtime file, skipping");
            Vec::new()
        };

        Ok(Self {
            machines: read_csv(&dir.join("machines.csv"))?,
            shifts: read_csv(&dir.join("shifts.csv"))?,
            operators: read_csv(&dir.join("operators.csv"))?,
            reason_codes,
            production_runs,
            downtime_events,
        })
    }

    /// Insert everything in dependency order; any failure rolls back all rows.
    pub fn import(&self, session: &mut Session) -> Result<LoadSummary, StoreError> {
        session.write(|conn| {
            for m in &self.machines {
                machines::import(conn, m)?;
            }
            for s in &self.shifts {
                shifts::import(conn, s)?;
            }
            for o in &self.operators {
                operators::import(conn, o)?;
            }
            for r in &self.reason_codes {
                reasons::import(conn, r)?;
            }
            for r in &self.production_runs {
                runs::import(conn, r)?;
            }
            for e in &self.downtime_events {
                downtime::import(conn, e)?;
            }
            Ok(LoadSummary {
                machines: self.machines.len(),
                shifts: self.shifts.len(),
                operators: self.operators.len(),
                reason_codes: self.reason_codes.len(),
                production_runs: self.production_runs.len(),
                downtime_events: self.downtime_events.len(),
            })
        })
    }
}

/// Read `dir` and import it.
#[instrument(skip(session, dir), fields(dir = %dir.display()))]
pub fn load_dir(session: &mut Session, dir: &Path) -> Result<LoadSummary, SampleError> {
    let data = SampleData::read(dir)?;
    let summary = data.import(session)?;
    info!(%summary, "sample data loaded");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::testing::temp_pool;

    fn write(dir: &Path, name: &str, body: &str) {
        std::fs::write(dir.join(name), body).unwrap();
    }

    fn sample_dir(with_downtime: bool) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path();
        write(p, "machines.csv", "id,name,ideal_cycle_time,location\n1,CNC Mill,60,Bay 1\n2,Press,30,\n");
        write(p, "shifts.csv", "id,name\n1,Day\n2,Night\n");
        write(p, "operators.csv", "id,name\n1,Avery\n");
        write(
            p,
            "reason_codes.csv",
            "code,description,is_planned\nJAM,Material jam,False\nPM,Preventive maintenance,True\n",
        );
        write(
            p,
            "production_runs.csv",
            "id,machine_id,shift_id,operator_id,planned_start_time,planned_end_time,actual_start_time,actual_end_time,good_parts_count,rejected_parts_count\n\
             1,1,1,1,2024-01-15 08:00:00,2024-01-15 16:00:00,2024-01-15 08:00:00,2024-01-15 16:00:00,100,10\n\
             2,2,2,1,2024-01-15 22:00:00,2024-01-16 06:00:00,,,,\n",
        );
        if with_downtime {
            write(
                p,
                "downtime_events.csv",
                "id,production_run_id,reason_code,start_time,end_time\n1,1,JAM,2024-01-15 10:00:00,2024-01-15 10:30:00\n",
            );
        }
        dir
    }

    #[test]
    fn test_load_dir_imports_everything() {
        let (_db, pool) = temp_pool();
        let mut session = Session::open(&pool).unwrap();
        let dir = sample_dir(true);

        let summary = load_dir(&mut session, dir.path()).unwrap();
        assert_eq!(summary.machines, 2);
        assert_eq!(summary.production_runs, 2);
        assert_eq!(summary.downtime_events, 1);

        let conn = session.conn();
        let press = machines::get(conn, 2).unwrap().unwrap();
        assert_eq!(press.location, None);
        assert!(reasons::get(conn, "PM").unwrap().unwrap().is_planned);
        assert!(!reasons::get(conn, "JAM").unwrap().unwrap().is_planned);

        let pending = runs::get(conn, 2).unwrap().unwrap();
        assert_eq!(pending.actual_start_time, None);
        assert_eq!(pending.good_parts_count, None);
    }

    #[test]
    fn test_downtime_file_is_optional() {
        let (_db, pool) = temp_pool();
        let mut session = Session::open(&pool).unwrap();
        let dir = sample_dir(false);
        let summary = load_dir(&mut session, dir.path()).unwrap();
        assert_eq!(summary.downtime_events, 0);
    }

    #[test]
    fn test_missing_required_file() {
        let (_db, pool) = temp_pool();
        let mut session = Session::open(&pool).unwrap();
        let dir = sample_dir(false);
        std::fs::remove_file(dir.path().join("shifts.csv")).unwrap();
        let err = load_dir(&mut session, dir.path()).unwrap_err();
        assert!(matches!(err, SampleError::Io { .. }), "got {err:?}");
    }

    #[test]
    fn test_bad_timestamp_is_csv_error() {
        let dir = sample_dir(false);
        write(
            dir.path(),
            "production_runs.csv",
            "id,machine_id,shift_id,operator_id,planned_start_time,planned_end_time,actual_start_time,actual_end_time,good_parts_count,rejected_parts_count\n\
             1,1,1,1,15/01/2024,2024-01-15 16:00:00,,,,\n",
        );
        assert!(matches!(SampleData::read(dir.path()), Err(SampleError::Csv { .. })));
    }

    #[test]
    fn test_second_load_rolls_back() {
        let (_db, pool) = temp_pool();
        let mut session = Session::open(&pool).unwrap();
        let dir = sample_dir(true);
        load_dir(&mut session, dir.path()).unwrap();

        let err = load_dir(&mut session, dir.path()).unwrap_err();
        assert!(matches!(err, SampleError::Store(StoreError::Conflict(_))), "got {err:?}");
        assert_eq!(machines::list(session.conn()).unwrap().len(), 2);
    }
}
