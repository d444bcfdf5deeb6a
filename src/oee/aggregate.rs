//! Rollups over many runs: group means, rankings and downtime by reason.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;

use serde::Serialize;

use super::{DateRange, Ineligible, OeeAggregate, OeeResult};
use crate::model::DowntimeContext;

/// Mean of every scored run. `runs_total` counts all candidates, scored or
/// not. Returns `None` when nothing could be scored.
pub fn summarize<I>(results: I) -> Option<OeeAggregate>
where
    I: IntoIterator<Item = Result<OeeResult, Ineligible>>,
{
    let mut total = 0usize;
    let mut included = 0usize;
    let mut sum = OeeResult {
        availability: 0.0,
        performance: 0.0,
        quality: 0.0,
        oee: 0.0,
    };

    for result in results {
        total += 1;
        if let Ok(r) = result {
            included += 1;
            sum.availability += r.availability;
            sum.performance += r.performance;
            sum.quality += r.quality;
            sum.oee += r.oee;
        }
    }

    if included == 0 {
        return None;
    }
    let n = included as f64;
    Some(OeeAggregate {
        avg_availability: sum.availability / n,
        avg_performance: sum.performance / n,
        avg_quality: sum.quality / n,
        avg_oee: sum.oee / n,
        runs_included: included,
        runs_total: total,
    })
}

/// One machine or shift with its aggregate, as listed in a ranking.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ranked {
    pub id: i64,
    pub name: String,
    #[serde(flatten)]
    pub aggregate: OeeAggregate,
}

/// Best mean OEE first; equal means fall back to the lower ID.
pub fn rank(entries: impl IntoIterator<Item = Ranked>) -> Vec<Ranked> {
    let mut ranked: Vec<Ranked> = entries.into_iter().collect();
    ranked.sort_by(|a, b| {
        b.aggregate
            .avg_oee
            .total_cmp(&a.aggregate.avg_oee)
            .then(a.id.cmp(&b.id))
    });
    ranked
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DowntimeReasonTotal {
    pub reason_code: String,
    pub description: String,
    pub is_planned: bool,
    pub total_duration_minutes: f64,
    pub event_count: usize,
}

/// Sum closed downtime per reason over runs admitted by `range`, longest
/// first, ties by reason code. Reasons totalling zero minutes are dropped.
pub fn top_downtime_reasons(
    events: &[DowntimeContext],
    range: &DateRange,
    limit: NonZeroUsize,
) -> Vec<DowntimeReasonTotal> {
    let mut by_code: BTreeMap<&str, DowntimeReasonTotal> = BTreeMap::new();

    for ctx in events {
        let Some(secs) = ctx.event.duration_secs() else {
            continue;
        };
        if !range.admits(ctx.run_actual_start, ctx.run_actual_end) {
            continue;
        }
        let entry = by_code
            .entry(ctx.event.reason_code.as_str())
            .or_insert_with(|| DowntimeReasonTotal {
                reason_code: ctx.event.reason_code.clone(),
                description: ctx.description.clone(),
                is_planned: ctx.is_planned,
                total_duration_minutes: 0.0,
                event_count: 0,
            });
        entry.total_duration_minutes += secs / 60.0;
        entry.event_count += 1;
    }

    // BTreeMap iteration is already in code order, so a stable sort keeps
    // ties ordered by code.
    let mut totals: Vec<_> = by_code
        .into_values()
        .filter(|t| t.total_duration_minutes > 0.0)
        .collect();
    totals.sort_by(|a, b| b.total_duration_minutes.total_cmp(&a.total_duration_minutes));
    totals.truncate(limit.get());
    totals
}
