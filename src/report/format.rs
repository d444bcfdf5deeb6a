//! Plain-text rendering of reports.

use std::fmt::Write as _;

use super::GroupReport;
use crate::oee::{DateRange, DowntimeReasonTotal, OeeAggregate, OeeResult, Ranked};

pub const NO_DATA: &str = "no data available for the requested scope";

/// Ratio as a percentage with one decimal. `0.0` prints as `0.0%`.
pub fn percent(ratio: f64) -> String {
    format!("{:.1}%", ratio * 100.0)
}

fn describe_range(range: &DateRange) -> String {
    match (range.start, range.end) {
        (None, None) => "all time".to_string(),
        (Some(s), None) => format!("from {s}"),
        (None, Some(e)) => format!("until {e}"),
        (Some(s), Some(e)) => format!("{s} to {e}"),
    }
}

pub fn format_run(run_id: i64, result: &OeeResult) -> String {
    format!(
        "Run {run_id}\n  Availability: {}\n  Performance:  {}\n  Quality:      {}\n  OEE:          {}",
        percent(result.availability),
        percent(result.performance),
        percent(result.quality),
        percent(result.oee),
    )
}

fn format_aggregate(out: &mut String, agg: &OeeAggregate) {
    let _ = writeln!(out, "  Availability: {}", percent(agg.avg_availability));
    let _ = writeln!(out, "  Performance:  {}", percent(agg.avg_performance));
    let _ = writeln!(out, "  Quality:      {}", percent(agg.avg_quality));
    let _ = writeln!(out, "  OEE:          {}", percent(agg.avg_oee));
    let _ = write!(
        out,
        "  Runs:         {} of {} scored",
        agg.runs_included, agg.runs_total
    );
}

/// Aggregate for one machine or shift.
pub fn format_group(report: &GroupReport) -> String {
    let mut out = format!("{} ({})\n", report.name, describe_range(&report.range));
    format_aggregate(&mut out, &report.aggregate);
    out
}

/// Ranked table; `label` names the grouping column ("Machine", "Shift").
pub fn format_ranking(label: &str, entries: &[Ranked]) -> String {
    if entries.is_empty() {
        return NO_DATA.to_string();
    }
    let width = entries
        .iter()
        .map(|e| e.name.chars().count())
        .chain(std::iter::once(label.chars().count()))
        .max()
        .unwrap_or_default();

    let mut out = format!(
        "{:>4}  {:<width$}  {:>7}  {:>7}  {:>7}  {:>7}  {:>5}\n",
        "#", label, "Avail", "Perf", "Qual", "OEE", "Runs"
    );
    for (pos, e) in entries.iter().enumerate() {
        let a = &e.aggregate;
        let _ = writeln!(
            out,
            "{:>4}  {:<width$}  {:>7}  {:>7}  {:>7}  {:>7}  {:>5}",
            pos + 1,
            e.name,
            percent(a.avg_availability),
            percent(a.avg_performance),
            percent(a.avg_quality),
            percent(a.avg_oee),
            format!("{}/{}", a.runs_included, a.runs_total),
        );
    }
    out.truncate(out.trim_end().len());
    out
}

pub fn format_downtime(totals: &[DowntimeReasonTotal]) -> String {
    if totals.is_empty() {
        return NO_DATA.to_string();
    }
    let mut out = String::new();
    for t in totals {
        let kind = if t.is_planned { "planned" } else { "unplanned" };
        let _ = writeln!(
            out,
            "{:<8} {:>9.1} min  {} event{}  {} ({kind})",
            t.reason_code,
            t.total_duration_minutes,
            t.event_count,
            if t.event_count == 1 { "" } else { "s" },
            t.description,
        );
    }
    out.truncate(out.trim_end().len());
    out
}
