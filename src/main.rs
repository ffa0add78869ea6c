use std::path::PathBuf;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{ArgGroup, Parser, Subcommand};
use serde::Serialize;

mod config;
mod db;
mod diagnostics;
mod error;
mod essays;
mod exams;
mod filter;
mod logging;
mod metrics;
mod models;
mod panels;
mod ranking;
mod report;
mod sheets;
mod source;

use crate::config::AnalyticsConfig;
use crate::error::Error;
use crate::filter::ActivityFilter;
use crate::models::{SittingId, Snapshot, Student};
use crate::ranking::{RankingView, ScoreColumn};
use crate::source::DataSource;

#[derive(Parser)]
#[command(name = "mentoring-analytics")]
#[command(about = "Study, mock exam and essay analytics for mentoring groups", long_about = None)]
struct Cli {
    /// Directory with the spreadsheet tabs exported as CSV; Postgres is used otherwise
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    /// TOML file overriding the built-in subjects, areas and thresholds
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Reference date for windows, streaks and retention (defaults to today)
    #[arg(long, global = true)]
    today: Option<NaiveDate>,
    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import the spreadsheet tabs from a directory of CSV exports
    Import {
        #[arg(long)]
        dir: PathBuf,
    },
    /// List students, optionally for one mentoring group
    Students {
        #[arg(long)]
        group: Option<String>,
    },
    /// Accuracy, volatility and trend of a student's study log
    Performance {
        #[arg(long)]
        student: String,
        #[arg(long)]
        subject: Option<String>,
        #[arg(long)]
        since_days: Option<i64>,
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
    },
    /// Streak, hiatus, weak topics and retention for a student
    Diagnose {
        #[arg(long)]
        student: String,
        #[arg(long)]
        subject: Option<String>,
        #[arg(long)]
        since_days: Option<i64>,
    },
    /// Mock exam cards and area overview for a student or group
    #[command(group(
        ArgGroup::new("scope")
            .args(["student", "group"])
            .multiple(false)
    ))]
    Exams {
        #[arg(long)]
        student: Option<String>,
        #[arg(long)]
        group: Option<String>,
        /// Area to chart day by day
        #[arg(long)]
        area: Option<String>,
    },
    /// Rank a group on one mock exam sitting
    Ranking {
        #[arg(long, default_value = "Simulado")]
        exam_type: String,
        #[arg(long)]
        number: u32,
        #[arg(long)]
        year: i32,
        #[arg(long, value_enum, default_value_t = RankingView::Full)]
        view: RankingView,
        /// Area name, day1, day2 or total
        #[arg(long)]
        sort_by: Option<String>,
        #[arg(long)]
        group: Option<String>,
    },
    /// Position of a student in every sitting they took
    Standing {
        #[arg(long)]
        student: String,
        #[arg(long, value_enum, default_value_t = RankingView::Full)]
        view: RankingView,
    },
    /// Essay scores for a student or group
    #[command(group(
        ArgGroup::new("scope")
            .args(["student", "group"])
            .multiple(false)
    ))]
    Essays {
        #[arg(long)]
        student: Option<String>,
        #[arg(long)]
        group: Option<String>,
        /// How many top students the group is compared against
        #[arg(long)]
        top: Option<usize>,
    },
    /// Generate a markdown report for one student
    Report {
        #[arg(long)]
        student: String,
        #[arg(long, default_value_t = 30)]
        since_days: i64,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

fn find_student<'a>(snapshot: &'a Snapshot, key: &str) -> anyhow::Result<&'a Student> {
    snapshot
        .find_student(key)
        .ok_or_else(|| Error::StudentNotFound(key.to_string()).into())
}

fn resolve_group(config: &AnalyticsConfig, group: Option<&str>) -> anyhow::Result<Option<u32>> {
    match group {
        None => Ok(None),
        Some(key) => config
            .group_id(key)
            .map(Some)
            .with_context(|| format!("unknown mentoring group {key:?}")),
    }
}

fn check_subject(config: &AnalyticsConfig, subject: Option<&str>) -> anyhow::Result<()> {
    if let Some(subject) = subject {
        if !config.subjects.iter().any(|known| known == subject) {
            anyhow::bail!("unknown subject {subject:?}; expected one of {:?}", config.subjects);
        }
    }
    Ok(())
}

fn emit<T: Serialize>(json: bool, value: &T, render: impl FnOnce() -> String) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        print!("{}", render());
    }
    Ok(())
}

async fn load_snapshot(data_dir: Option<PathBuf>) -> anyhow::Result<Snapshot> {
    let source = DataSource::connect(data_dir)
        .await
        .context("failed to open the data source")?;
    Ok(source.load().await?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AnalyticsConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => AnalyticsConfig::default(),
    };
    logging::init(&config.logging)?;

    let today = cli.today.unwrap_or_else(|| chrono::Local::now().date_naive());
    let json = cli.json;

    match cli.command {
        Commands::InitDb => {
            let pool = source::connect_postgres().await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let pool = source::connect_postgres().await?;
            let counts = db::seed(&pool, today).await?;
            println!(
                "Seed data inserted: {} students, {} activities, {} exam rows, {} essays.",
                counts.students, counts.activities, counts.exams, counts.essays
            );
        }
        Commands::Import { dir } => {
            let snapshot = sheets::load_snapshot(&dir)?;
            let pool = source::connect_postgres().await?;
            let counts = db::import_snapshot(&pool, &snapshot).await?;
            println!(
                "Imported {} students, {} activities, {} exam rows, {} essays from {}.",
                counts.students,
                counts.activities,
                counts.exams,
                counts.essays,
                dir.display()
            );
        }
        Commands::Students { group } => {
            let snapshot = load_snapshot(cli.data_dir).await?;
            let group = resolve_group(&config, group.as_deref())?;
            let roster = filter::roster(&snapshot.students, group);
            emit(json, &roster, || {
                roster
                    .iter()
                    .map(|student| {
                        format!(
                            "- {} ({}, {})\n",
                            student.name,
                            student.student_id,
                            config.group_label(student.mentoring_group_id)
                        )
                    })
                    .collect()
            })?;
        }
        Commands::Performance {
            student,
            subject,
            since_days,
            from,
            to,
        } => {
            check_subject(&config, subject.as_deref())?;
            let snapshot = load_snapshot(cli.data_dir).await?;
            let student = find_student(&snapshot, &student)?;
            let mut filter = ActivityFilter::for_student(student.student_id).with_subject(subject);
            if from.is_none() && to.is_none() {
                filter = filter.with_window(today, since_days.unwrap_or(config.default_window_days));
            } else {
                filter.from = from;
                filter.to = to;
            }
            let panel = panels::performance(&snapshot, student, &filter, &config);
            emit(json, &panel, || report::render_performance(&panel))?;
        }
        Commands::Diagnose {
            student,
            subject,
            since_days,
        } => {
            check_subject(&config, subject.as_deref())?;
            let snapshot = load_snapshot(cli.data_dir).await?;
            let student = find_student(&snapshot, &student)?;
            let filter = ActivityFilter::for_student(student.student_id)
                .with_subject(subject)
                .with_window(today, since_days.unwrap_or(config.default_window_days));
            let panel = panels::diagnosis(&snapshot, student, &filter, today, &config);
            emit(json, &panel, || report::render_diagnosis(&panel, &config))?;
        }
        Commands::Exams {
            student,
            group,
            area,
        } => {
            if let Some(area) = &area {
                if config.area_index(area).is_none() {
                    anyhow::bail!("unknown area {area:?}; expected one of {:?}", config.areas);
                }
            }
            let group = resolve_group(&config, group.as_deref())?;
            let snapshot = load_snapshot(cli.data_dir).await?;
            let student = student
                .as_deref()
                .map(|key| find_student(&snapshot, key))
                .transpose()?;
            let panel = panels::exams(&snapshot, student, group, area.as_deref(), &config);
            emit(json, &panel, || report::render_exams(&panel))?;
        }
        Commands::Ranking {
            exam_type,
            number,
            year,
            view,
            sort_by,
            group,
        } => {
            let sort_by = sort_by
                .as_deref()
                .map(|key| ScoreColumn::parse(key, &config))
                .transpose()?;
            let group = resolve_group(&config, group.as_deref())?;
            let snapshot = load_snapshot(cli.data_dir).await?;
            let roster = filter::roster(&snapshot.students, group);
            let sitting = SittingId {
                exam_type,
                exam_number: number,
                exam_year: year,
            };
            let outcome =
                ranking::rank_sitting(&snapshot.exams, &roster, &sitting, view, sort_by, &config)?;
            emit(json, &outcome, || report::render_ranking(&outcome))?;
        }
        Commands::Standing { student, view } => {
            let snapshot = load_snapshot(cli.data_dir).await?;
            let student = find_student(&snapshot, &student)?;
            let history = ranking::standing_history(
                &snapshot.exams,
                &snapshot.students,
                student.student_id,
                view,
                &config,
            );
            emit(json, &history, || report::render_standing(&history, &student.name))?;
        }
        Commands::Essays {
            student,
            group,
            top,
        } => {
            let group = resolve_group(&config, group.as_deref())?;
            let snapshot = load_snapshot(cli.data_dir).await?;
            let student = student
                .as_deref()
                .map(|key| find_student(&snapshot, key))
                .transpose()?;
            let top = top.unwrap_or(config.essay_top_n);
            match panels::essays(&snapshot, student, group, top, &config) {
                Some(panel) => emit(json, &panel, || report::render_essays(&panel))?,
                None if json => println!("null"),
                None => println!("No essays found for this selection."),
            }
        }
        Commands::Report {
            student,
            since_days,
            out,
        } => {
            let snapshot = load_snapshot(cli.data_dir).await?;
            let student = find_student(&snapshot, &student)?;
            let report = report::build_student_report(&snapshot, student, since_days, today, &config);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
