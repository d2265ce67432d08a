pub mod dates;
pub mod output;
pub mod shutdown;

use std::{
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{anyhow, Result};
use chrono::{DateTime, Local};
use clap::{Parser, Subcommand, ValueEnum};
use dates::{parse_instant, DateStyle, DayArgs, RangeArgs};
use output::{
    print_conflicts, print_grid, print_snapshot, print_summary, print_sweep, shift_line,
    snapshot_line,
};
use shutdown::detect_shutdown;
use tokio::{select, sync::mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{info, level_filters::LevelFilter, warn};

use crate::{
    api::{entities::ShiftQuery, http::HttpApiClient, TimekeepingApi},
    attendance::{
        report::AttendanceReportAggregator,
        session::TimeClockSession,
        ticker::{ElapsedTicker, DEFAULT_TICK},
    },
    schedule::{
        conflict::{conflicting_pairs, ShiftPlanner},
        missed::{
            MissedShiftPolicy, MissedShiftSweep, DEFAULT_CREATION_EXEMPTION_HOURS,
            DEFAULT_GRACE_PERIOD_MINUTES,
        },
        slots::{parse_slots, Slot, SlotGrid},
    },
    utils::{
        clock::{Clock, DefaultClock},
        dir::create_application_default_path,
        logging::{enable_logging, CLI_PREFIX},
    },
};

/// How often `watch` reloads records, to pick up changes made on other devices.
const WATCH_REFRESH: Duration = Duration::from_secs(60);

#[derive(Parser, Debug)]
#[command(name = "shiftclock", version, long_about = None)]
#[command(about = "Time clock and shift scheduling client", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(long, env = "SHIFTCLOCK_API_URL", help = "Base url of the timekeeping API")]
    api_url: String,
    #[arg(
        long,
        env = "SHIFTCLOCK_API_TOKEN",
        hide_env_values = true,
        help = "Bearer token sent with every request"
    )]
    token: Option<String>,
    #[arg(long, default_value_t = 15, help = "Request timeout in seconds")]
    timeout_secs: u64,
    #[arg(long, help = "Enable logging")]
    log: bool,
    #[arg(
        long,
        help = "Directory for log files. Defaults to $XDG_STATE_HOME/shiftclock/logs"
    )]
    log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, clap::Args)]
struct EmployeeArg {
    #[arg(long, short, env = "SHIFTCLOCK_EMPLOYEE", help = "Employee id")]
    employee: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Period {
    Day,
    Week,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Show the current attendance state")]
    Status {
        #[command(flatten)]
        employee: EmployeeArg,
    },
    #[command(about = "Show worked and break time live until ctrl-c")]
    Watch {
        #[command(flatten)]
        employee: EmployeeArg,
    },
    #[command(about = "Clock in, optionally against a scheduled shift")]
    ClockIn {
        #[command(flatten)]
        employee: EmployeeArg,
        #[arg(long, help = "Id of the shift being worked")]
        shift: Option<String>,
    },
    #[command(about = "Clock out of the open record")]
    ClockOut {
        #[command(flatten)]
        employee: EmployeeArg,
    },
    #[command(about = "Start a break")]
    BreakStart {
        #[command(flatten)]
        employee: EmployeeArg,
    },
    #[command(about = "End the running break")]
    BreakEnd {
        #[command(flatten)]
        employee: EmployeeArg,
    },
    #[command(about = "Worked and break time for a day or the week containing it")]
    Report {
        #[arg(value_enum, default_value_t = Period::Day)]
        period: Period,
        #[command(flatten)]
        employee: EmployeeArg,
        #[command(flatten)]
        day: DayArgs,
    },
    #[command(about = "Flag overdue scheduled shifts without a clock in as missed")]
    Sweep {
        #[arg(long, help = "Only look at shifts of this company")]
        company: Option<String>,
        #[arg(long, help = "Only look at shifts of this employee")]
        employee: Option<String>,
        #[arg(
            long,
            default_value_t = DEFAULT_GRACE_PERIOD_MINUTES,
            help = "Minutes after the start a shift can still be clocked into"
        )]
        grace_minutes: i64,
        #[arg(
            long,
            default_value_t = DEFAULT_CREATION_EXEMPTION_HOURS,
            help = "Shifts created less than this many hours ago are never flagged"
        )]
        exemption_hours: i64,
    },
    #[command(about = "List double booked shifts")]
    Conflicts {
        #[arg(long)]
        company: Option<String>,
        #[arg(long)]
        employee: Option<String>,
        #[command(flatten)]
        range: RangeArgs,
    },
    #[command(about = "Show the shifts of a day laid out by slot")]
    Grid {
        #[arg(long)]
        company: String,
        #[arg(long, help = "JSON file with slot definitions")]
        slots: PathBuf,
        #[command(flatten)]
        day: DayArgs,
    },
    #[command(about = "Schedule an employee into a slot")]
    Plan {
        #[arg(long)]
        employee: String,
        #[arg(long)]
        company: String,
        #[arg(long)]
        department: Option<String>,
        #[arg(long, help = "JSON file with slot definitions")]
        slots: PathBuf,
        #[arg(long, help = "Id of the slot to schedule")]
        slot: String,
        #[command(flatten)]
        day: DayArgs,
    },
    #[command(about = "Move a shift to another time")]
    Move {
        #[arg(long)]
        employee: String,
        #[arg(long)]
        shift: String,
        #[arg(
            long,
            help = "Day the shift currently starts on. Defaults to the day of the new start"
        )]
        date: Option<String>,
        #[arg(long, help = "New start, for example \"17/03/2025 09:00\"")]
        start: String,
        #[arg(long, help = "New end, for example \"17/03/2025 17:00\"")]
        end: String,
        #[arg(
            long,
            default_value_t = DateStyle::Uk,
            help = "Date order used when parsing. Uk is day/month/year, Us is month/day/year"
        )]
        date_style: DateStyle,
    },
    #[command(about = "Delete a shift")]
    Cancel {
        #[arg(long)]
        shift: String,
    },
}

/// Things every command needs.
struct Context {
    api: Arc<dyn TimekeepingApi>,
    clock: Arc<dyn Clock>,
}

impl Context {
    fn now(&self) -> DateTime<Local> {
        self.clock.time().with_timezone(&Local)
    }

    async fn session(&self, employee: EmployeeArg) -> Result<TimeClockSession<Local>> {
        let session =
            TimeClockSession::new(employee.employee, self.api.clone(), self.clock.clone(), Local);
        session.refresh().await?;
        Ok(session)
    }
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };
    let log_dir = match args.log_dir {
        Some(dir) => dir,
        None => create_application_default_path()?.join("logs"),
    };
    enable_logging(CLI_PREFIX, &log_dir, logging_level, args.log)?;

    let api = HttpApiClient::new(
        &args.api_url,
        args.token,
        Duration::from_secs(args.timeout_secs),
    )?;
    let context = Context {
        api: Arc::new(api),
        clock: Arc::new(DefaultClock),
    };

    process_command(&context, args.commands).await
}

async fn process_command(context: &Context, command: Commands) -> Result<()> {
    match command {
        Commands::Status { employee } => {
            let session = context.session(employee).await?;
            print_snapshot(&session.snapshot());
        }
        Commands::Watch { employee } => watch(context, employee).await?,
        Commands::ClockIn { employee, shift } => {
            let session = context.session(employee).await?;
            session.clock_in(shift.as_deref()).await?;
            print_snapshot(&session.snapshot());
        }
        Commands::ClockOut { employee } => {
            let session = context.session(employee).await?;
            session.clock_out().await?;
            print_snapshot(&session.snapshot());
        }
        Commands::BreakStart { employee } => {
            let session = context.session(employee).await?;
            session.start_break().await?;
            print_snapshot(&session.snapshot());
        }
        Commands::BreakEnd { employee } => {
            let session = context.session(employee).await?;
            session.end_break().await?;
            print_snapshot(&session.snapshot());
        }
        Commands::Report {
            period,
            employee,
            day,
        } => {
            let date = day.resolve(context.now())?;
            let session = context.session(employee).await?;
            let aggregator = AttendanceReportAggregator::new(Local);
            let records = session.records();
            let summary = match period {
                Period::Day => aggregator.daily(&records, date, context.clock.time())?,
                Period::Week => aggregator.weekly(&records, date, context.clock.time())?,
            };
            print_summary(&summary);
        }
        Commands::Sweep {
            company,
            employee,
            grace_minutes,
            exemption_hours,
        } => {
            let policy = MissedShiftPolicy {
                grace_period: chrono::Duration::minutes(grace_minutes),
                creation_exemption: chrono::Duration::hours(exemption_hours),
            };
            let sweep = MissedShiftSweep::new(context.api.clone(), policy, context.clock.clone());
            let report = sweep
                .run(ShiftQuery {
                    company,
                    employee,
                    ..Default::default()
                })
                .await?;
            print_sweep(&report);
        }
        Commands::Conflicts {
            company,
            employee,
            range,
        } => {
            let (from, to) = range.resolve(context.now())?;
            let shifts = context
                .api
                .list_shifts(ShiftQuery {
                    company,
                    employee,
                    start_date: Some(from),
                    end_date: Some(to),
                    ..Default::default()
                })
                .await?;
            print_conflicts(&conflicting_pairs(&shifts, &Local));
        }
        Commands::Grid {
            company,
            slots,
            day,
        } => {
            let date = day.resolve(context.now())?;
            let slots = load_slots(&slots).await?;
            let shifts = context
                .api
                .list_shifts(ShiftQuery {
                    company: Some(company),
                    start_date: Some(date),
                    end_date: Some(date),
                    ..Default::default()
                })
                .await?;
            print_grid(&SlotGrid::build(&slots, &shifts, date, &Local));
        }
        Commands::Plan {
            employee,
            company,
            department,
            slots,
            slot,
            day,
        } => {
            let date = day.resolve(context.now())?;
            let slots = load_slots(&slots).await?;
            let slot = slots
                .iter()
                .find(|v| v.id == slot)
                .ok_or_else(|| anyhow!("No slot with id {slot}"))?;
            let draft = slot.draft_for(&employee, &company, department.as_deref(), date, &Local)?;
            let shift = ShiftPlanner::new(context.api.clone(), Local)
                .create_shift(draft)
                .await?;
            println!("{}", shift_line(&shift));
        }
        Commands::Move {
            employee,
            shift,
            date,
            start,
            end,
            date_style,
        } => {
            let now = context.now();
            let start = parse_instant(&start, date_style, now)?;
            let end = parse_instant(&end, date_style, now)?;
            let current_day = match date {
                Some(date) => dates::parse_day(Some(&date), date_style, now)?,
                None => start.with_timezone(&Local).date_naive(),
            };
            let roster = context
                .api
                .list_shifts(ShiftQuery {
                    employee: Some(employee),
                    start_date: Some(current_day),
                    end_date: Some(current_day),
                    ..Default::default()
                })
                .await?;
            let existing = roster
                .iter()
                .find(|v| v.id == shift)
                .ok_or_else(|| anyhow!("Shift {shift} doesn't start on {current_day}"))?;
            let moved = ShiftPlanner::new(context.api.clone(), Local)
                .move_shift(existing, start, end)
                .await?;
            println!("{}", shift_line(&moved));
        }
        Commands::Cancel { shift } => {
            context.api.delete_shift(&shift).await?;
            info!("Deleted shift {shift}");
            println!("Deleted shift {shift}");
        }
    }
    Ok(())
}

async fn load_slots(path: &Path) -> Result<Vec<Slot>> {
    let json = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| anyhow!("Failed to read slots from {}: {e}", path.display()))?;
    Ok(parse_slots(&json)?)
}

/// Prints the live session until ctrl-c. Records are reloaded every [WATCH_REFRESH] so clock
/// actions made elsewhere show up.
async fn watch(context: &Context, employee: EmployeeArg) -> Result<()> {
    let session = context.session(employee).await?;
    let (sender, mut receiver) = mpsc::channel(4);
    let shutdown = CancellationToken::new();
    let ticker = ElapsedTicker::new(
        session.view(),
        sender,
        shutdown.clone(),
        context.clock.clone(),
        DEFAULT_TICK,
    );

    let printer = async {
        while let Some(snapshot) = receiver.recv().await {
            print!("\r\x1b[2K{}", snapshot_line(&snapshot));
            let _ = std::io::stdout().flush();
        }
    };
    let refresher = async {
        loop {
            select! {
                _ = shutdown.cancelled() => return,
                _ = tokio::time::sleep(WATCH_REFRESH) => {
                    if let Err(e) = session.refresh().await {
                        warn!("Failed to refresh records {e}");
                    }
                }
            }
        }
    };

    tokio::join!(detect_shutdown(shutdown.clone()), ticker.run(), printer, refresher);
    session.detach();
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use clap::Parser;
    use tempfile::NamedTempFile;

    use super::{load_slots, Args, Commands};

    #[tokio::test]
    async fn loads_slot_file() -> anyhow::Result<()> {
        let mut file = NamedTempFile::new()?;
        write!(
            file,
            r#"[{{"id": "m", "name": "Morning", "startHour": 6, "endHour": 14}}]"#
        )?;
        let slots = load_slots(file.path()).await?;
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].name, "Morning");
        Ok(())
    }

    #[tokio::test]
    async fn rejects_invalid_slot_file() -> anyhow::Result<()> {
        let mut file = NamedTempFile::new()?;
        write!(file, r#"[{{"id": "x", "name": "Broken", "startHour": 9, "endHour": 9}}]"#)?;
        assert!(load_slots(file.path()).await.is_err());
        assert!(load_slots(&file.path().join("missing")).await.is_err());
        Ok(())
    }

    #[test]
    fn parses_sweep_defaults() {
        let args = Args::try_parse_from([
            "shiftclock",
            "--api-url",
            "http://localhost/api",
            "sweep",
            "--company",
            "c1",
        ])
        .unwrap();
        assert_eq!(args.timeout_secs, 15);
        match args.commands {
            Commands::Sweep {
                company,
                grace_minutes,
                exemption_hours,
                ..
            } => {
                assert_eq!(company.as_deref(), Some("c1"));
                assert_eq!(grace_minutes, 15);
                assert_eq!(exemption_hours, 24);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parses_clock_in_against_shift() {
        let args = Args::try_parse_from([
            "shiftclock",
            "--api-url",
            "http://localhost/api",
            "clock-in",
            "--employee",
            "e1",
            "--shift",
            "s1",
        ])
        .unwrap();
        match args.commands {
            Commands::ClockIn { employee, shift } => {
                assert_eq!(employee.employee.as_deref(), Some("e1"));
                assert_eq!(shift.as_deref(), Some("s1"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
