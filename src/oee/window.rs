//! Optional date bounds applied to a run's actual window.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use thiserror::Error;

use crate::model::{parse_timestamp, ProductionRun};

#[derive(Debug, Error, PartialEq)]
pub enum WindowError {
    #[error("invalid date or timestamp '{0}' (expected YYYY-MM-DD or YYYY-MM-DD HH:MM:SS)")]
    Unparseable(String),

    #[error("window start {start} is after end {end}")]
    Inverted {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },
}

/// A run is admitted when its actual start is at or after `start` and its
/// actual end is at or before `end`. A missing bound is not checked; a
/// missing actual time fails any bound that looks at it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
}

impl DateRange {
    pub const UNBOUNDED: DateRange = DateRange {
        start: None,
        end: None,
    };

    pub fn new(
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> Result<Self, WindowError> {
        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                return Err(WindowError::Inverted { start, end });
            }
        }
        Ok(Self { start, end })
    }

    /// Build from user input; either side may be absent.
    pub fn parse(start: Option<&str>, end: Option<&str>) -> Result<Self, WindowError> {
        let start = start.map(parse_bound).transpose()?;
        let end = end.map(parse_bound).transpose()?;
        Self::new(start, end)
    }

    pub fn admits(
        &self,
        actual_start: Option<NaiveDateTime>,
        actual_end: Option<NaiveDateTime>,
    ) -> bool {
        let start_ok = match self.start {
            Some(bound) => actual_start.is_some_and(|t| t >= bound),
            None => true,
        };
        let end_ok = match self.end {
            Some(bound) => actual_end.is_some_and(|t| t <= bound),
            None => true,
        };
        start_ok && end_ok
    }

    pub fn admits_run(&self, run: &ProductionRun) -> bool {
        self.admits(run.actual_start_time, run.actual_end_time)
    }
}

/// A calendar date means midnight at the start of that day; full
/// timestamps are taken as given.
pub fn parse_bound(input: &str) -> Result<NaiveDateTime, WindowError> {
    let trimmed = input.trim();
    if let Some(ts) = parse_timestamp(trimmed) {
        return Ok(ts);
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| WindowError::Unparseable(input.to_string()))
}
