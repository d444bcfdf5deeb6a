use std::num::NonZeroUsize;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::NaiveDateTime;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use oee_tracker::config::{Config, LogFormat, LoggingConfig};
use oee_tracker::model::{parse_timestamp, DowntimeEvent, ProductionRun};
use oee_tracker::oee::DateRange;
use oee_tracker::report::{self, format, GroupOutcome, GroupReport};
use oee_tracker::storage::machines::{self, MachineUpdate};
use oee_tracker::storage::reasons::{self, ReasonUpdate};
use oee_tracker::storage::runs::{self, NewRun};
use oee_tracker::storage::{downtime, operators, shifts, Session};

#[derive(Parser)]
#[command(
    name = "oee-tracker",
    about = "Equipment utilization tracking and OEE reporting",
    version,
    long_about = None
)]
struct Cli {
    /// SQLite database file (overrides the config file)
    #[arg(long, global = true, env = "OEE_TRACKER_DB")]
    db: Option<PathBuf>,

    /// Config file (default: $OEE_TRACKER_CONFIG, then ./oee-tracker.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// JSON output for machine parsing
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage machines
    Machine {
        #[command(subcommand)]
        action: MachineAction,
    },

    /// Manage shifts
    Shift {
        #[command(subcommand)]
        action: NamedAction,
    },

    /// Manage operators
    Operator {
        #[command(subcommand)]
        action: NamedAction,
    },

    /// Manage downtime reason codes
    Reason {
        #[command(subcommand)]
        action: ReasonAction,
    },

    /// Manage production runs
    Run {
        #[command(subcommand)]
        action: RunAction,
    },

    /// Manage downtime events
    Downtime {
        #[command(subcommand)]
        action: DowntimeAction,
    },

    /// OEE calculations and reports
    Report {
        #[command(subcommand)]
        action: ReportAction,
    },

    /// Load the bundled CSV sample data
    LoadSample {
        /// Directory holding the CSV files
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum MachineAction {
    /// Create a machine
    Create {
        name: String,
        /// Seconds per part at rated speed
        ideal_cycle_time: f64,
        #[arg(long)]
        location: Option<String>,
    },
    /// List all machines
    List,
    /// Show one machine
    Get { id: i64 },
    /// Change name, cycle time or location
    Update {
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        ideal_cycle_time: Option<f64>,
        #[arg(long)]
        location: Option<String>,
    },
    /// Delete a machine with its runs and downtime
    Delete {
        id: i64,
        #[arg(long)]
        admin: bool,
    },
}

/// Shifts and operators only carry a name.
#[derive(Subcommand)]
enum NamedAction {
    Create { name: String },
    List,
    Get { id: i64 },
    Update { id: i64, name: String },
    Delete {
        id: i64,
        #[arg(long)]
        admin: bool,
    },
}

#[derive(Subcommand)]
enum ReasonAction {
    /// Create a reason code
    Create {
        code: String,
        description: String,
        /// Scheduled stoppage (changeover, maintenance)
        #[arg(long)]
        planned: bool,
    },
    /// List reason codes
    List {
        #[arg(long, conflicts_with = "unplanned")]
        planned: bool,
        #[arg(long)]
        unplanned: bool,
    },
    Get { code: String },
    Update {
        code: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        planned: Option<bool>,
    },
    Delete {
        code: String,
        #[arg(long)]
        admin: bool,
    },
}

#[derive(Subcommand)]
enum RunAction {
    /// Schedule a production run
    Create {
        machine_id: i64,
        shift_id: i64,
        operator_id: i64,
        /// Planned start (YYYY-MM-DD HH:MM:SS)
        #[arg(value_parser = timestamp_arg)]
        planned_start: NaiveDateTime,
        /// Planned end (YYYY-MM-DD HH:MM:SS)
        #[arg(value_parser = timestamp_arg)]
        planned_end: NaiveDateTime,
    },
    /// List runs, optionally for one machine or shift
    List {
        #[arg(long, conflicts_with = "shift")]
        machine: Option<i64>,
        #[arg(long)]
        shift: Option<i64>,
    },
    Get { id: i64 },
    /// List running runs
    Active,
    /// Start a run
    Start {
        id: i64,
        /// Start time (default: now)
        #[arg(long, value_parser = timestamp_arg)]
        at: Option<NaiveDateTime>,
    },
    /// Stop a running run with its part counts
    Stop {
        id: i64,
        good_parts: u32,
        rejected_parts: u32,
        /// Stop time (default: now)
        #[arg(long, value_parser = timestamp_arg)]
        at: Option<NaiveDateTime>,
    },
    /// Correct part counts
    Update {
        id: i64,
        #[arg(long)]
        good_parts: Option<u32>,
        #[arg(long)]
        rejected_parts: Option<u32>,
    },
    Delete {
        id: i64,
        #[arg(long)]
        admin: bool,
    },
}

#[derive(Subcommand)]
enum DowntimeAction {
    /// Log downtime against a run (starts now unless --start is given)
    Create {
        run_id: i64,
        reason_code: String,
        #[arg(long, value_parser = timestamp_arg)]
        start: Option<NaiveDateTime>,
        #[arg(long, value_parser = timestamp_arg)]
        end: Option<NaiveDateTime>,
    },
    /// List downtime events
    List {
        #[arg(long)]
        run_id: Option<i64>,
    },
    Get { id: i64 },
    /// List ongoing downtime
    Active,
    /// Close an ongoing event
    Stop {
        id: i64,
        #[arg(long, value_parser = timestamp_arg)]
        at: Option<NaiveDateTime>,
    },
    Delete {
        id: i64,
        #[arg(long)]
        admin: bool,
    },
}

/// Optional bounds on the runs' actual start and end.
#[derive(Args)]
struct RangeArgs {
    /// Earliest actual start (YYYY-MM-DD or YYYY-MM-DD HH:MM:SS)
    #[arg(long)]
    start: Option<String>,
    /// Latest actual end (YYYY-MM-DD or YYYY-MM-DD HH:MM:SS)
    #[arg(long)]
    end: Option<String>,
}

impl RangeArgs {
    fn parse(&self) -> Result<DateRange> {
        Ok(DateRange::parse(self.start.as_deref(), self.end.as_deref())?)
    }
}

#[derive(Subcommand)]
enum ReportAction {
    /// OEE of a single run
    Oee { run_id: i64 },
    /// Average OEE of a machine
    Machine {
        id: i64,
        #[command(flatten)]
        range: RangeArgs,
    },
    /// Average OEE of a shift
    Shift {
        id: i64,
        #[command(flatten)]
        range: RangeArgs,
    },
    /// Top downtime reasons by total minutes
    Downtime {
        #[arg(long)]
        limit: Option<NonZeroUsize>,
        #[command(flatten)]
        range: RangeArgs,
    },
    /// Rank machines by average OEE
    Machines {
        #[command(flatten)]
        range: RangeArgs,
    },
    /// Compare shifts by average OEE
    Shifts {
        #[command(flatten)]
        range: RangeArgs,
    },
}

fn timestamp_arg(s: &str) -> Result<NaiveDateTime, String> {
    parse_timestamp(s).ok_or_else(|| format!("invalid timestamp '{s}' (use YYYY-MM-DD HH:MM:SS)"))
}

fn now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

/// Print `value` as JSON, or the text rendering otherwise.
fn emit<T: Serialize>(json: bool, value: &T, text: impl FnOnce(&T) -> String) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", text(value));
    }
    Ok(())
}

/// Unwrap a group aggregate, failing with the candidate count when nothing
/// in range could be scored.
fn scored(outcome: GroupOutcome) -> Result<GroupReport> {
    match outcome {
        GroupOutcome::Scored(report) => Ok(report),
        GroupOutcome::NoData {
            name, runs_total, ..
        } => bail!(
            "{} ({name}: {runs_total} candidate runs, none scored)",
            format::NO_DATA
        ),
    }
}

fn run_line(run: &ProductionRun) -> String {
    format!(
        "{}: Machine {} | Shift {} | {}",
        run.id,
        run.machine_id,
        run.shift_id,
        run.status()
    )
}

fn run_detail(run: &ProductionRun) -> String {
    let mut out = format!(
        "Production Run {} ({})\n  Machine: {}, Shift: {}, Operator: {}\n  Planned: {} - {}",
        run.id,
        run.status(),
        run.machine_id,
        run.shift_id,
        run.operator_id,
        run.planned_start_time,
        run.planned_end_time
    );
    if let Some(at) = run.actual_start_time {
        out.push_str(&format!("\n  Actual Start: {at}"));
    }
    if let Some(at) = run.actual_end_time {
        out.push_str(&format!("\n  Actual End: {at}"));
    }
    if run.good_parts_count.is_some() || run.rejected_parts_count.is_some() {
        let show = |c: Option<u32>| c.map_or("-".to_string(), |c| c.to_string());
        out.push_str(&format!(
            "\n  Good Parts: {}, Rejected: {}",
            show(run.good_parts_count),
            show(run.rejected_parts_count)
        ));
    }
    out
}

fn downtime_line(event: &DowntimeEvent) -> String {
    let status = if event.is_active() { "Active" } else { "Ended" };
    format!(
        "{}: Run {} | {} | {} - {} | {status}",
        event.id,
        event.production_run_id,
        event.reason_code,
        event.start_time,
        event
            .end_time
            .map_or("ongoing".to_string(), |t| t.to_string()),
    )
}

fn lines<T>(items: &[T], empty: &str, line: impl Fn(&T) -> String) -> String {
    if items.is_empty() {
        return empty.to_string();
    }
    items.iter().map(line).collect::<Vec<_>>().join("\n")
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::resolve(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        config.database.path = db;
    }
    init_tracing(&config.logging);

    let (_pool, mut session) = oee_tracker::connect(&config)?;
    let json = cli.json;

    match cli.command {
        Commands::Machine { action } => machine_cmd(&mut session, json, action),
        Commands::Shift { action } => shift_cmd(&mut session, json, action),
        Commands::Operator { action } => operator_cmd(&mut session, json, action),
        Commands::Reason { action } => reason_cmd(&mut session, json, action),
        Commands::Run { action } => run_cmd(&mut session, json, action),
        Commands::Downtime { action } => downtime_cmd(&mut session, json, action),
        Commands::Report { action } => report_cmd(&mut session, json, &config, action),
        Commands::LoadSample { dir } => {
            let dir = dir.unwrap_or_else(|| config.report.sample_dir.clone());
            tracing::info!(dir = %dir.display(), "loading sample data");
            let summary = oee_tracker::sample::load_dir(&mut session, &dir)
                .with_context(|| format!("failed to load sample data from {}", dir.display()))?;
            emit(json, &summary, |s| format!("Loaded {s}"))
        }
    }
}

fn machine_cmd(session: &mut Session, json: bool, action: MachineAction) -> Result<()> {
    let conn = session.conn();
    match action {
        MachineAction::Create {
            name,
            ideal_cycle_time,
            location,
        } => {
            let m = machines::create(conn, &name, ideal_cycle_time, location.as_deref())?;
            emit(json, &m, |m| format!("Machine created: {} ({})", m.id, m.name))
        }
        MachineAction::List => {
            let all = machines::list(conn)?;
            emit(json, &all, |all| {
                lines(all, "No machines found.", |m| {
                    format!(
                        "{}: {} | cycle {}s | {}",
                        m.id,
                        m.name,
                        m.ideal_cycle_time,
                        m.location.as_deref().unwrap_or("-")
                    )
                })
            })
        }
        MachineAction::Get { id } => {
            let Some(m) = machines::get(conn, id)? else {
                bail!("machine {id} not found");
            };
            emit(json, &m, |m| {
                format!(
                    "Machine {}: {}\n  Ideal cycle time: {}s\n  Location: {}",
                    m.id,
                    m.name,
                    m.ideal_cycle_time,
                    m.location.as_deref().unwrap_or("-")
                )
            })
        }
        MachineAction::Update {
            id,
            name,
            ideal_cycle_time,
            location,
        } => {
            let changes = MachineUpdate {
                name,
                ideal_cycle_time,
                location,
            };
            let Some(m) = machines::update(conn, id, changes)? else {
                bail!("machine {id} not found");
            };
            emit(json, &m, |m| format!("Machine {} updated", m.id))
        }
        MachineAction::Delete { id, admin } => {
            if !machines::delete(conn, id, admin)? {
                bail!("machine {id} not found");
            }
            println!("Machine {id} deleted");
            Ok(())
        }
    }
}

fn shift_cmd(session: &mut Session, json: bool, action: NamedAction) -> Result<()> {
    let conn = session.conn();
    match action {
        NamedAction::Create { name } => {
            let s = shifts::create(conn, &name)?;
            emit(json, &s, |s| format!("Shift created: {} ({})", s.id, s.name))
        }
        NamedAction::List => {
            let all = shifts::list(conn)?;
            emit(json, &all, |all| {
                lines(all, "No shifts found.", |s| format!("{}: {}", s.id, s.name))
            })
        }
        NamedAction::Get { id } => {
            let Some(s) = shifts::get(conn, id)? else {
                bail!("shift {id} not found");
            };
            emit(json, &s, |s| format!("Shift {}: {}", s.id, s.name))
        }
        NamedAction::Update { id, name } => {
            let Some(s) = shifts::update(conn, id, &name)? else {
                bail!("shift {id} not found");
            };
            emit(json, &s, |s| format!("Shift {} renamed to {}", s.id, s.name))
        }
        NamedAction::Delete { id, admin } => {
            if !shifts::delete(conn, id, admin)? {
                bail!("shift {id} not found");
            }
            println!("Shift {id} deleted");
            Ok(())
        }
    }
}

fn operator_cmd(session: &mut Session, json: bool, action: NamedAction) -> Result<()> {
    let conn = session.conn();
    match action {
        NamedAction::Create { name } => {
            let o = operators::create(conn, &name)?;
            emit(json, &o, |o| format!("Operator created: {} ({})", o.id, o.name))
        }
        NamedAction::List => {
            let all = operators::list(conn)?;
            emit(json, &all, |all| {
                lines(all, "No operators found.", |o| format!("{}: {}", o.id, o.name))
            })
        }
        NamedAction::Get { id } => {
            let Some(o) = operators::get(conn, id)? else {
                bail!("operator {id} not found");
            };
            emit(json, &o, |o| format!("Operator {}: {}", o.id, o.name))
        }
        NamedAction::Update { id, name } => {
            let Some(o) = operators::update(conn, id, &name)? else {
                bail!("operator {id} not found");
            };
            emit(json, &o, |o| format!("Operator {} renamed to {}", o.id, o.name))
        }
        NamedAction::Delete { id, admin } => {
            if !operators::delete(conn, id, admin)? {
                bail!("operator {id} not found");
            }
            println!("Operator {id} deleted");
            Ok(())
        }
    }
}

fn reason_cmd(session: &mut Session, json: bool, action: ReasonAction) -> Result<()> {
    let conn = session.conn();
    let kind = |planned: bool| if planned { "planned" } else { "unplanned" };
    match action {
        ReasonAction::Create {
            code,
            description,
            planned,
        } => {
            let r = reasons::create(conn, &code, &description, planned)?;
            emit(json, &r, |r| {
                format!("Reason code created: {} ({})", r.code, kind(r.is_planned))
            })
        }
        ReasonAction::List { planned, unplanned } => {
            let all = match (planned, unplanned) {
                (true, _) => reasons::list_by_planned(conn, true)?,
                (_, true) => reasons::list_by_planned(conn, false)?,
                _ => reasons::list(conn)?,
            };
            emit(json, &all, |all| {
                lines(all, "No reason codes found.", |r| {
                    format!("{}: {} | {}", r.code, r.description, kind(r.is_planned))
                })
            })
        }
        ReasonAction::Get { code } => {
            let Some(r) = reasons::get(conn, &code)? else {
                bail!("reason code {code} not found");
            };
            emit(json, &r, |r| {
                format!("{}: {} ({})", r.code, r.description, kind(r.is_planned))
            })
        }
        ReasonAction::Update {
            code,
            description,
            planned,
        } => {
            let changes = ReasonUpdate {
                description,
                is_planned: planned,
            };
            let Some(r) = reasons::update(conn, &code, changes)? else {
                bail!("reason code {code} not found");
            };
            emit(json, &r, |r| format!("Reason code {} updated", r.code))
        }
        ReasonAction::Delete { code, admin } => {
            if !reasons::delete(conn, &code, admin)? {
                bail!("reason code {code} not found");
            }
            println!("Reason code {code} deleted");
            Ok(())
        }
    }
}

fn run_cmd(session: &mut Session, json: bool, action: RunAction) -> Result<()> {
    match action {
        RunAction::Create {
            machine_id,
            shift_id,
            operator_id,
            planned_start,
            planned_end,
        } => {
            let new = NewRun {
                machine_id,
                shift_id,
                operator_id,
                planned_start_time: planned_start,
                planned_end_time: planned_end,
            };
            let run = runs::create(session.conn(), &new)?;
            emit(json, &run, |r| format!("Production run created: {}\n{}", r.id, run_detail(r)))
        }
        RunAction::List { machine, shift } => {
            let conn = session.conn();
            let all = match (machine, shift) {
                (Some(m), _) => runs::list_by_machine(conn, m)?,
                (_, Some(s)) => runs::list_by_shift(conn, s)?,
                _ => runs::list(conn)?,
            };
            emit(json, &all, |all| lines(all, "No production runs found.", run_line))
        }
        RunAction::Get { id } => {
            let Some(run) = runs::get(session.conn(), id)? else {
                bail!("production run {id} not found");
            };
            emit(json, &run, run_detail)
        }
        RunAction::Active => {
            let active = runs::list_active(session.conn())?;
            emit(json, &active, |all| {
                lines(all, "No active production runs.", |r| {
                    format!(
                        "{}: Machine {} | Started: {}",
                        r.id,
                        r.machine_id,
                        r.actual_start_time.map_or("-".to_string(), |t| t.to_string())
                    )
                })
            })
        }
        RunAction::Start { id, at } => {
            let at = at.unwrap_or_else(now);
            let Some(run) = session.write(|c| runs::start(c, id, at))? else {
                bail!("production run {id} not found");
            };
            emit(json, &run, |r| format!("Production run {} started at {at}", r.id))
        }
        RunAction::Stop {
            id,
            good_parts,
            rejected_parts,
            at,
        } => {
            let at = at.unwrap_or_else(now);
            let Some(run) = session.write(|c| runs::stop(c, id, good_parts, rejected_parts, at))?
            else {
                bail!("production run {id} not found");
            };
            emit(json, &run, |r| {
                format!(
                    "Production run {} stopped\n  Good parts: {good_parts}, Rejected: {rejected_parts}",
                    r.id
                )
            })
        }
        RunAction::Update {
            id,
            good_parts,
            rejected_parts,
        } => {
            let Some(run) =
                session.write(|c| runs::update_counts(c, id, good_parts, rejected_parts))?
            else {
                bail!("production run {id} not found");
            };
            emit(json, &run, |r| format!("Production run {} updated\n{}", r.id, run_detail(r)))
        }
        RunAction::Delete { id, admin } => {
            if !runs::delete(session.conn(), id, admin)? {
                bail!("production run {id} not found");
            }
            println!("Production run {id} deleted");
            Ok(())
        }
    }
}

fn downtime_cmd(session: &mut Session, json: bool, action: DowntimeAction) -> Result<()> {
    match action {
        DowntimeAction::Create {
            run_id,
            reason_code,
            start,
            end,
        } => {
            let now = now();
            let event =
                session.write(|c| downtime::create(c, run_id, &reason_code, start, end, now))?;
            emit(json, &event, |e| {
                format!("Downtime event created: {}\n  {}", e.id, downtime_line(e))
            })
        }
        DowntimeAction::List { run_id } => {
            let conn = session.conn();
            let events = match run_id {
                Some(run_id) => downtime::list_by_run(conn, run_id)?,
                None => downtime::list(conn)?,
            };
            emit(json, &events, |all| lines(all, "No downtime events found.", downtime_line))
        }
        DowntimeAction::Get { id } => {
            let Some(event) = downtime::get(session.conn(), id)? else {
                bail!("downtime event {id} not found");
            };
            emit(json, &event, downtime_line)
        }
        DowntimeAction::Active => {
            let events = downtime::list_active(session.conn())?;
            emit(json, &events, |all| lines(all, "No active downtime events.", downtime_line))
        }
        DowntimeAction::Stop { id, at } => {
            let at = at.unwrap_or_else(now);
            let Some(event) = session.write(|c| downtime::stop(c, id, at))? else {
                bail!("downtime event {id} not found");
            };
            emit(json, &event, |e| format!("Downtime event {} stopped at {at}", e.id))
        }
        DowntimeAction::Delete { id, admin } => {
            if !downtime::delete(session.conn(), id, admin)? {
                bail!("downtime event {id} not found");
            }
            println!("Downtime event {id} deleted");
            Ok(())
        }
    }
}

fn report_cmd(
    session: &mut Session,
    json: bool,
    config: &Config,
    action: ReportAction,
) -> Result<()> {
    match action {
        ReportAction::Oee { run_id } => {
            let Some(result) = report::run_oee(session, run_id)? else {
                bail!("{} (run {run_id} may not exist, be incomplete, or be missing part counts)", format::NO_DATA);
            };
            emit(json, &result, |r| format::format_run(run_id, r))
        }
        ReportAction::Machine { id, range } => {
            let group = scored(report::machine_oee(session, id, &range.parse()?)?)?;
            emit(json, &group, format::format_group)
        }
        ReportAction::Shift { id, range } => {
            let group = scored(report::shift_oee(session, id, &range.parse()?)?)?;
            emit(json, &group, format::format_group)
        }
        ReportAction::Downtime { limit, range } => {
            let limit = limit.unwrap_or(config.report.downtime_limit);
            let totals = report::top_downtime_reasons(session, &range.parse()?, limit)?;
            if totals.is_empty() {
                bail!(format::NO_DATA);
            }
            emit(json, &totals, |t| format::format_downtime(t))
        }
        ReportAction::Machines { range } => {
            let ranked = report::rank_machines(session, &range.parse()?)?;
            if ranked.is_empty() {
                bail!(format::NO_DATA);
            }
            emit(json, &ranked, |r| format::format_ranking("Machine", r))
        }
        ReportAction::Shifts { range } => {
            let ranked = report::compare_shifts(session, &range.parse()?)?;
            if ranked.is_empty() {
                bail!(format::NO_DATA);
            }
            emit(json, &ranked, |r| format::format_ranking("Shift", r))
        }
    }
}
