//! # CarePulse — reminder scheduler CLI
//!
//! Usage:
//!   carepulse run                              # Run the three scheduler loops until Ctrl-C
//!   carepulse tick --at 2024-01-05T09:00:00Z   # One pass of every loop at a fixed time
//!   carepulse next --from 2024-01-31T09:00:00Z --rule monthly --count 3
//!   carepulse complete-task 1712000000000 --resolution clone
//!   carepulse log-dose 1712000000000
//!   carepulse summary

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use carepulse_core::config::{CarePulseConfig, StoreBackend};
use carepulse_core::traits::{Clock, ManualClock, SystemClock};
use carepulse_scheduler::actions::{self, CompletionOutcome, TaskResolution};
use carepulse_scheduler::models::{pending_tasks, upcoming_appointments};
use carepulse_scheduler::{CareScheduler, NotifyRouter, RecurrenceSpec, Schedulable, TickReport};

#[derive(Parser)]
#[command(
    name = "carepulse",
    version,
    about = "💊 CarePulse — recurring appointment, medication and task reminders"
)]
struct Cli {
    /// Config file (default: ~/.carepulse/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the configured store backend
    #[arg(long, global = true)]
    store: Option<StoreBackend>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler loops until Ctrl-C
    Run,
    /// Run one tick of every loop and print what happened
    Tick {
        /// Pretend it is this instant (RFC 3339)
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    /// Print the next occurrences of a recurrence rule
    Next {
        /// Anchor occurrence (RFC 3339)
        #[arg(long)]
        from: DateTime<Utc>,
        #[arg(long, value_enum)]
        rule: RuleArg,
        /// Interval for daily, monthly and yearly rules
        #[arg(long, default_value_t = 1)]
        interval: i64,
        /// Weekdays for weekly rules, 0 = Sunday
        #[arg(long, value_delimiter = ',')]
        days: Vec<i64>,
        #[arg(long, default_value_t = 5)]
        count: usize,
    },
    /// Complete (or un-complete) a task
    CompleteTask {
        id: String,
        /// How to resolve a recurring task: clone or advance
        #[arg(long, default_value = "clone")]
        resolution: TaskResolution,
    },
    /// Log today's dose of a medication
    LogDose { id: String },
    /// Show upcoming appointments, medications and pending tasks
    Summary,
}

#[derive(Clone, Copy, ValueEnum)]
enum RuleArg {
    None,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl RuleArg {
    fn to_spec(self, interval: i64, days: &[i64]) -> RecurrenceSpec {
        match self {
            RuleArg::None => RecurrenceSpec::none(),
            RuleArg::Daily => RecurrenceSpec::daily(interval),
            RuleArg::Weekly => RecurrenceSpec::weekly(days),
            RuleArg::Monthly => RecurrenceSpec::monthly(interval),
            RuleArg::Yearly => RecurrenceSpec::yearly(interval),
        }
    }
}

fn load_config(cli: &Cli) -> Result<CarePulseConfig> {
    let mut config = match &cli.config {
        Some(path) => CarePulseConfig::load_from(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => CarePulseConfig::load()?,
    };
    if let Some(backend) = cli.store {
        config.store.backend = backend;
    }
    Ok(config)
}

fn build_service(config: &CarePulseConfig, clock: Arc<dyn Clock>) -> Result<CareScheduler> {
    let store = carepulse_scheduler::open_store(config)?;
    let router = Arc::new(NotifyRouter::from_config(&config.notifications));
    Ok(CareScheduler::new(store, router, clock, config))
}

fn print_reports(reports: &[TickReport]) {
    for report in reports {
        println!(
            "{:<13} advanced {:>2}, fired {:>2}",
            report.kind.to_string(),
            report.advanced,
            report.fired.len()
        );
        for fired in &report.fired {
            println!("   🔔 {} — {}", fired.title, fired.body);
        }
    }
}

/// " [text]", or nothing for an empty label.
fn bracketed(label: &str) -> String {
    if label.is_empty() { String::new() } else { format!(" [{label}]") }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "carepulse=debug,carepulse_scheduler=debug,carepulse_core=debug"
    } else {
        "carepulse=info,carepulse_scheduler=info,carepulse_core=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    match &cli.command {
        Command::Next {
            from,
            rule,
            interval,
            days,
            count,
        } => {
            let rule = rule.to_spec(*interval, days).normalize();
            let label = rule.describe();
            println!("📅 {}", if label.is_empty() { "does not repeat" } else { label.as_str() });
            let mut current = *from;
            for _ in 0..*count {
                let next = carepulse_scheduler::next_occurrence(current, &rule);
                if next <= current {
                    break;
                }
                println!("   {}", next.with_timezone(&Local).format("%a %Y-%m-%d %H:%M %Z"));
                current = next;
            }
            return Ok(());
        }
        Command::Run => {
            let config = load_config(&cli)?;
            let service = build_service(&config, Arc::new(SystemClock))?;
            println!("💊 CarePulse v{}", env!("CARGO_PKG_VERSION"));
            println!("   📂 Data Dir:  {}", config.data_path()?.display());
            println!("   🗄️  Store:     {:?}", config.store.backend);
            println!("   ⏰ Poll:      every {}s", service.poll_interval().as_secs());
            println!();

            let handles = service.spawn_all();
            tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
            tracing::info!("🛑 Shutting down");
            carepulse_scheduler::stop_all(handles).await;
        }
        Command::Tick { at } => {
            let config = load_config(&cli)?;
            let clock: Arc<dyn Clock> = match at {
                Some(at) => Arc::new(ManualClock::new(*at)),
                None => Arc::new(SystemClock),
            };
            let service = build_service(&config, clock)?;
            let reports = service.tick_all()?;
            print_reports(&reports);
        }
        Command::CompleteTask { id, resolution } => {
            let config = load_config(&cli)?;
            let service = build_service(&config, Arc::new(SystemClock))?;
            match actions::complete_task(service.tasks(), id, *resolution, Utc::now())? {
                CompletionOutcome::Toggled { completed } => {
                    println!("✅ Task {id} {}", if completed { "completed" } else { "reopened" });
                }
                CompletionOutcome::Cloned { new_id, due } => {
                    println!("✅ Task {id} completed; next instance {new_id} due {}", due.with_timezone(&Local));
                }
                CompletionOutcome::Advanced { due } => {
                    println!("⏭️  Task {id} moved to {}", due.with_timezone(&Local));
                }
            }
        }
        Command::LogDose { id } => {
            let config = load_config(&cli)?;
            let service = build_service(&config, Arc::new(SystemClock))?;
            let streak = actions::log_dose(service.medications(), id, Local::now().date_naive())?;
            println!("💊 Dose logged — streak {streak} day(s)");
        }
        Command::Summary => {
            let config = load_config(&cli)?;
            let service = build_service(&config, Arc::new(SystemClock))?;
            let now = Utc::now();
            let today = Local::now().date_naive();

            let appointments = service.appointments().load()?;
            let start_of_today = today
                .and_hms_opt(0, 0, 0)
                .and_then(|t| t.and_local_timezone(Local).earliest())
                .map_or(now, |t| t.with_timezone(&Utc));
            println!("📅 Appointments");
            for appt in upcoming_appointments(&appointments, start_of_today) {
                println!(
                    "   {} {} with {} {}{}",
                    appt.date.with_timezone(&Local).format("%a %d %b %H:%M"),
                    appt.display_type(),
                    appt.provider,
                    appt.recurrence.normalize().describe(),
                    bracketed(&appt.reminder().label())
                );
            }

            println!("💊 Medications");
            for med in service.medications().load()? {
                let streak = med
                    .streak
                    .as_ref()
                    .and_then(|s| s.last_logged_label(today).map(|label| format!("🔥 {} · {label}", s.count)))
                    .unwrap_or_default();
                let taken = med.streak.as_ref().is_some_and(|s| s.logged_on(today));
                println!(
                    "   {}{} {} {} {}",
                    if taken { "✅ " } else { "" },
                    med.name,
                    med.dosage,
                    med.display_unit(),
                    streak
                );
            }

            println!("📝 Tasks");
            let tasks = service.tasks().load()?;
            for task in pending_tasks(&tasks) {
                let due = task
                    .due_date
                    .map(|d| d.with_timezone(&Local).format("%a %d %b %H:%M").to_string())
                    .unwrap_or_else(|| "no due date".into());
                let overdue = if task.is_overdue(now) { " ⚠️ overdue" } else { "" };
                println!(
                    "   {} ({due}){overdue}{}",
                    task.title,
                    bracketed(&task.reminder().label())
                );
            }
        }
    }

    Ok(())
}
