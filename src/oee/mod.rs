//! OEE engine: per-run metrics, time-window filtering and aggregation.
//!
//! Everything in here is a pure function over owned snapshots of entity data.
//! Nothing touches the database; the `report` module loads snapshots and
//! hands them in.

pub mod aggregate;
pub mod calc;
pub mod window;

use std::num::NonZeroUsize;

use serde::Serialize;
use thiserror::Error;

pub use aggregate::{rank, summarize, top_downtime_reasons, DowntimeReasonTotal, Ranked};
pub use calc::{evaluate, RunSnapshot};
pub use window::DateRange;

/// Default number of reasons in the downtime report.
pub const DEFAULT_DOWNTIME_LIMIT: NonZeroUsize = match NonZeroUsize::new(3) {
    Some(limit) => limit,
    None => panic!("downtime limit must be non-zero"),
};

/// Metrics of one completed run. Ratios are unitless and nominally in 0..=1;
/// values above 1 point at bad input (cycle time or downtime) and are kept.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OeeResult {
    pub availability: f64,
    pub performance: f64,
    pub quality: f64,
    pub oee: f64,
}

/// Arithmetic means over the runs of a group that could be scored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OeeAggregate {
    pub avg_availability: f64,
    pub avg_performance: f64,
    pub avg_quality: f64,
    pub avg_oee: f64,
    pub runs_included: usize,
    pub runs_total: usize,
}

/// Why a run cannot be scored.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Ineligible {
    #[error("run has not started")]
    NotStarted,

    #[error("run has not stopped")]
    NotStopped,

    #[error("part counts are not recorded")]
    MissingPartCounts,

    #[error("planned time is not positive ({seconds}s)")]
    ZeroPlannedTime { seconds: f64 },

    #[error("run time after downtime is not positive ({seconds}s)")]
    NonPositiveRunTime { seconds: f64 },

    #[error("no parts were produced")]
    NoPartsProduced,

    #[error("machine ideal cycle time is unavailable")]
    UnknownCycleTime,

    #[error("downtime event {event_id} ends before it starts")]
    InvertedDowntime { event_id: i64 },

    #[error("downtime events {first} and {second} overlap")]
    OverlappingDowntime { first: i64, second: i64 },
}
