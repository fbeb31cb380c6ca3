//! `curriculum`: command-line host for the progression engine.
//!
//! Each subcommand maps onto one engine operation for the acting user and
//! prints its result as JSON on stdout. Logs go to stderr.

mod config;
mod seed;
mod sqlite_url;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use curriculum_core::model::{Identity, LessonId, ModuleId, Role, SemesterLabel, UserId};
use serde::Serialize;
use services::{Clock, CurriculumServices};
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;

/// Largest user id the SQLite store can key on.
const MAX_USER_ID: u64 = i64::MAX.unsigned_abs();

#[derive(Parser)]
#[command(name = "curriculum")]
#[command(about = "Curriculum progression and module unlocking", long_about = None)]
struct Cli {
    /// SQLite URL or file path; overrides CURRICULUM__DATABASE__URL
    #[arg(long, global = true)]
    db: Option<String>,
    /// Acting user id
    #[arg(
        long,
        global = true,
        env = "CURRICULUM_USER_ID",
        default_value_t = 1,
        value_parser = clap::value_parser!(u64).range(..=MAX_USER_ID)
    )]
    user: u64,
    /// Roles of the acting user, comma separated
    #[arg(long = "roles", global = true, value_delimiter = ',', default_value = "student")]
    roles: Vec<Role>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List modules with their effective unlock status
    Modules,
    /// Show the stored progress of one module
    Progress { module_id: ModuleId },
    /// Unlock a module
    Unlock { module_id: ModuleId },
    /// Set the completion percentage of a module (clamped to 0..=100)
    Percent {
        module_id: ModuleId,
        #[arg(allow_negative_numbers = true)]
        percentage: i64,
    },
    /// Mark a module completed
    Complete { module_id: ModuleId },
    /// Per-semester completion summary
    Dashboard,
    /// Unlock the semester after the given one if it is complete
    UnlockNext { semester: String },
    /// Show stored progress of one semester's modules
    Semester { semester: SemesterLabel },
    /// Mark a lesson completed, or not completed with --undo
    Lesson {
        lesson_id: LessonId,
        #[arg(long)]
        undo: bool,
    },
    /// Lesson completion per module
    Lessons,
    /// Write a demo catalog (admin or teacher only)
    Seed,
}

fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("encoding output")?;
    println!("{out}");
    Ok(())
}

async fn execute(
    command: Command,
    services: &CurriculumServices,
    identity: &Identity,
) -> anyhow::Result<()> {
    let catalog = services.catalog().load().await.context("loading catalog")?;
    let engine = services.progression();
    match command {
        Command::Seed => {
            if !(identity.has_role(Role::Admin) || identity.has_role(Role::Teacher)) {
                bail!("seeding the catalog requires the admin or teacher role");
            }
            let seeded = seed::demo_catalog(&services.catalog()).await?;
            print_json(&seeded.modules())
        }
        Command::Modules => print_json(&engine.module_statuses(identity, &catalog).await?),
        Command::Progress { module_id } => {
            print_json(&engine.module_progress(identity, &catalog, module_id).await?)
        }
        Command::Unlock { module_id } => {
            print_json(&engine.unlock_module(identity, &catalog, module_id).await?)
        }
        Command::Percent {
            module_id,
            percentage,
        } => print_json(
            &engine
                .update_progress_percentage(identity, &catalog, module_id, percentage)
                .await?,
        ),
        Command::Complete { module_id } => print_json(
            &engine
                .mark_module_completed(identity, &catalog, module_id)
                .await?,
        ),
        Command::Dashboard => print_json(&engine.dashboard(identity, &catalog).await?),
        Command::UnlockNext { semester } => print_json(
            &engine
                .unlock_next_semester(identity, &catalog, &semester)
                .await?,
        ),
        Command::Semester { semester } => print_json(
            &engine
                .semester_progress(identity, &catalog, &semester)
                .await?,
        ),
        Command::Lesson { lesson_id, undo } => print_json(
            &services
                .lessons()
                .record_lesson(identity, &catalog, lesson_id, !undo)
                .await?,
        ),
        Command::Lessons => print_json(
            &services
                .lessons()
                .module_lesson_progress(identity, &catalog)
                .await?,
        ),
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load().context("loading configuration")?;
    config.validate()?;
    init_tracing(&config.log.filter);

    let db_url = sqlite_url::normalize(cli.db.as_deref().unwrap_or(&config.database.url));
    sqlite_url::prepare_file(&db_url)?;
    let services = CurriculumServices::new_sqlite(
        &db_url,
        config.database.pool_settings(),
        Clock::default_clock(),
        config.progression,
    )
    .await
    .with_context(|| format!("opening {db_url}"))?;

    let identity = Identity::new(UserId::new(cli.user), cli.roles);
    tracing::debug!(user_id = cli.user, roles = ?identity.roles(), "acting identity");
    execute(cli.command, &services, &identity).await
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err:#}");
        std::process::exit(2);
    }
}
