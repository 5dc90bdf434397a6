use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use groupscholar_standards_mastery::config::AppConfig;
use groupscholar_standards_mastery::db::{self, PgStore};
use groupscholar_standards_mastery::models::{
    InterventionStatus, Mark, QuickCheckMark, Selection, StandardView,
};
use groupscholar_standards_mastery::report;
use groupscholar_standards_mastery::thresholds::ThresholdConfig;
use groupscholar_standards_mastery::MasteryEngine;

#[derive(Parser)]
#[command(name = "standards-mastery")]
#[command(about = "Standards mastery tracker for Group Scholar classrooms", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import quick-check marks from a CSV file
    ImportQuickChecks {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Record a single quick-check observation
    RecordCheck {
        #[arg(long)]
        class: String,
        #[arg(long)]
        grade: String,
        #[arg(long)]
        student: String,
        #[arg(long)]
        standard: String,
        /// got_it, almost or not_yet
        #[arg(long)]
        mark: Mark,
    },
    /// Compute mastery, reconcile stored statuses and print them
    Status {
        #[arg(long)]
        class: String,
        #[arg(long)]
        grade: String,
        #[arg(long)]
        semester: Option<String>,
    },
    /// Advance a standard to its next manual status
    Cycle {
        #[arg(long)]
        class: String,
        #[arg(long)]
        grade: String,
        #[arg(long)]
        standard: String,
        #[arg(long, default_value = "teacher")]
        by: String,
    },
    /// Set the intervention status of a standard that is not yet mastered
    Intervene {
        #[arg(long)]
        class: String,
        #[arg(long)]
        grade: String,
        #[arg(long)]
        standard: String,
        /// none, not_yet_taught, taught_needs_reteach, reteaching or reassessing
        #[arg(long)]
        status: InterventionStatus,
        #[arg(long, default_value = "teacher")]
        by: String,
    },
    /// Show or change per-class mastery cutoffs
    Thresholds {
        #[command(subcommand)]
        command: ThresholdCommands,
    },
    /// Generate a markdown report
    Report {
        #[arg(long)]
        class: String,
        #[arg(long)]
        grade: String,
        #[arg(long)]
        semester: Option<String>,
        #[arg(long, default_value = "mastery-report.md")]
        out: PathBuf,
    },
}

#[derive(Subcommand)]
enum ThresholdCommands {
    /// Print every configured class
    Show,
    /// Replace the cutoffs for one class
    Set {
        #[arg(long)]
        class: String,
        #[arg(long)]
        above: f64,
        #[arg(long)]
        on: f64,
        #[arg(long)]
        approaching: f64,
    },
}

fn print_views(views: &[StandardView]) {
    if views.is_empty() {
        println!("No standards defined for this grade.");
        return;
    }

    for view in views {
        let marker = if view.has_manual_override { " (set)" } else { "" };
        let intervention = view
            .intervention_status
            .map(|status| format!(", intervention {status}"))
            .unwrap_or_default();
        println!(
            "- {} {}{} ({}){}",
            view.code,
            view.effective_status,
            marker,
            report::format_percentage(view.computed_percentage),
            intervention
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "groupscholar_standards_mastery=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")?;
    let store = Arc::new(PgStore::new(pool.clone()));

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::ImportQuickChecks { csv } => {
            let inserted = db::import_quick_checks(&pool, &csv).await?;
            println!("Inserted {inserted} quick checks from {}.", csv.display());
        }
        Commands::RecordCheck {
            class,
            grade,
            student,
            standard,
            mark,
        } => {
            let engine = MasteryEngine::new(store, config.engine_config(None));
            engine
                .record_quick_check(QuickCheckMark {
                    id: Uuid::new_v4(),
                    student_id: student,
                    standard_code: standard.clone(),
                    class_name: class,
                    grade,
                    mark,
                    recorded_at: Utc::now(),
                })
                .await?;
            println!("Recorded {} for {standard}.", mark.as_str());
        }
        Commands::Status {
            class,
            grade,
            semester,
        } => {
            let engine = MasteryEngine::new(store, config.engine_config(semester.as_deref()));
            let selection = Selection::new(class, grade);
            let (outcome, views) = engine.open(selection.clone()).await?;

            if let Some(outcome) = &outcome {
                println!(
                    "Reconciled {selection}: {} new, {} updated, {} unchanged, {} kept above.",
                    outcome.summary.inserted,
                    outcome.summary.overwritten,
                    outcome.summary.unchanged,
                    outcome.summary.sticky
                );
                for (code, err) in &outcome.failed {
                    println!("  write failed for {code}: {err}");
                }
            }

            let retry = engine.retry_pending().await?;
            if retry.written > 0 || retry.still_pending > 0 {
                println!(
                    "Retried failed writes: {} saved, {} still pending.",
                    retry.written, retry.still_pending
                );
            }

            print_views(&views);
        }
        Commands::Cycle {
            class,
            grade,
            standard,
            by,
        } => {
            let engine = MasteryEngine::new(store, config.engine_config(None));
            engine.select(Selection::new(class, grade)).await;
            let status = engine.cycle(&standard, &by).await?;
            println!("{standard} is now {status}.");
        }
        Commands::Intervene {
            class,
            grade,
            standard,
            status,
            by,
        } => {
            let engine = MasteryEngine::new(store, config.engine_config(None));
            engine.select(Selection::new(class, grade)).await;
            engine.set_intervention(&standard, status, &by).await?;
            println!("{standard} intervention set to {status}.");
        }
        Commands::Thresholds { command } => {
            let engine = MasteryEngine::new(store, config.engine_config(None));
            match command {
                ThresholdCommands::Show => {
                    let book = engine.thresholds().await?;
                    let mut any = false;
                    for (class, cfg) in book.classes() {
                        any = true;
                        println!(
                            "- {class}: above {}, on {}, approaching {}",
                            cfg.above, cfg.on, cfg.approaching
                        );
                    }
                    if !any {
                        let cfg = ThresholdConfig::default();
                        println!(
                            "No classes configured; defaults are above {}, on {}, approaching {}.",
                            cfg.above, cfg.on, cfg.approaching
                        );
                    }
                }
                ThresholdCommands::Set {
                    class,
                    above,
                    on,
                    approaching,
                } => {
                    engine
                        .set_thresholds(&class, ThresholdConfig::new(above, on, approaching))
                        .await?;
                    println!("Thresholds saved for {class}.");
                }
            }
        }
        Commands::Report {
            class,
            grade,
            semester,
            out,
        } => {
            let engine_config = config.engine_config(semester.as_deref());
            let semester = engine_config.semester.clone();
            let engine = MasteryEngine::new(store, engine_config);
            let selection = Selection::new(class, grade);
            engine.select(selection.clone()).await;
            let views = engine.refresh().await?;
            let thresholds = engine.thresholds().await?.for_class(&selection.class_name);
            let report = report::build_report(&selection, &semester, &thresholds, &views);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
