//! OEE Tracker -- equipment utilization tracking and Overall Equipment
//! Effectiveness reporting.
//!
//! This crate provides the entity store for machines, shifts, operators,
//! reason codes, production runs and downtime, the OEE engine that scores
//! runs and rolls them up, and the report layer the CLI prints from.

pub mod config;
pub mod model;
pub mod oee;
pub mod report;
pub mod sample;
pub mod storage;

use anyhow::{Context, Result};

use crate::config::Config;
use crate::storage::{Pool, Session};

/// Open the configured database and check out a session on it.
pub fn connect(config: &Config) -> Result<(Pool, Session)> {
    let path = &config.database.path;
    tracing::debug!(path = %path.display(), "opening database");
    let pool = storage::open_pool(path, config.database.pool_size)
        .with_context(|| format!("failed to open database {}", path.display()))?;
    let session = Session::open(&pool)?;
    Ok((pool, session))
}
