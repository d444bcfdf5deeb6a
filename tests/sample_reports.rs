//! Report façade over the bundled sample data.

use std::num::NonZeroUsize;
use std::path::Path;

use oee_tracker::oee::DateRange;
use oee_tracker::report;
use oee_tracker::storage::{self, runs, Session};

fn loaded() -> (tempfile::TempDir, storage::Pool) {
    let dir = tempfile::tempdir().unwrap();
    let pool = storage::open_pool(dir.path().join("sample.db"), 2).unwrap();
    let mut session = Session::open(&pool).unwrap();
    let sample = Path::new(env!("CARGO_MANIFEST_DIR")).join("sample").join("data");
    oee_tracker::sample::load_dir(&mut session, &sample).unwrap();
    (dir, pool)
}

#[test]
fn test_running_run_counts_only_without_bounds() {
    let (_dir, pool) = loaded();
    let mut session = Session::open(&pool).unwrap();

    // Run 41 on machine 1 is still running, so it is a candidate that
    // cannot be scored.
    let active = runs::list_active(session.conn()).unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].machine_id, 1);

    let all = report::machine_oee(&mut session, 1, &DateRange::UNBOUNDED)
        .unwrap()
        .scored()
        .unwrap();
    assert_eq!(all.aggregate.runs_total, all.aggregate.runs_included + 1);

    let bounded = DateRange::parse(None, Some("2024-02-01")).unwrap();
    let report = report::machine_oee(&mut session, 1, &bounded)
        .unwrap()
        .scored()
        .unwrap();
    assert_eq!(report.aggregate.runs_total, report.aggregate.runs_included);
}

#[test]
fn test_rankings_cover_every_group() {
    let (_dir, pool) = loaded();
    let mut session = Session::open(&pool).unwrap();

    let machines = report::rank_machines(&mut session, &DateRange::UNBOUNDED).unwrap();
    assert_eq!(machines.len(), 4);
    for pair in machines.windows(2) {
        assert!(pair[0].aggregate.avg_oee >= pair[1].aggregate.avg_oee);
    }

    let shifts = report::compare_shifts(&mut session, &DateRange::UNBOUNDED).unwrap();
    let included: usize = shifts.iter().map(|s| s.aggregate.runs_included).sum();
    let machine_included: usize = machines.iter().map(|m| m.aggregate.runs_included).sum();
    assert_eq!(included, machine_included);
}

#[test]
fn test_downtime_report_respects_limit_and_order() {
    let (_dir, pool) = loaded();
    let mut session = Session::open(&pool).unwrap();

    let all = report::top_downtime_reasons(
        &mut session,
        &DateRange::UNBOUNDED,
        NonZeroUsize::new(50).unwrap(),
    )
    .unwrap();
    assert!(all.len() > 3);
    for pair in all.windows(2) {
        assert!(pair[0].total_duration_minutes >= pair[1].total_duration_minutes);
    }

    let top = report::top_downtime_reasons(
        &mut session,
        &DateRange::UNBOUNDED,
        NonZeroUsize::new(3).unwrap(),
    )
    .unwrap();
    assert_eq!(top, all[..3].to_vec());
}
