use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod analysis;
mod config;
mod db;
mod models;
mod provider;
mod report;

use config::AppConfig;
use models::{CohortSummary, StudentInsight};
use provider::{CsvRoster, GradeHistoryProvider, SampleRoster};

#[derive(Parser)]
#[command(name = "grade-trend")]
#[command(about = "Grade trend early warning: flags at-risk students and forecasts next-term grades", long_about = None)]
struct Cli {
    /// TOML file with a [policy] table and optional database_url
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Where grade histories come from
    #[arg(long, value_enum, default_value_t = Source::Sample, global = true)]
    source: Source,
    /// Grade CSV (student_id,name,term,grade) when --source csv
    #[arg(long = "csv", global = true)]
    source_csv: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Source {
    Sample,
    Csv,
    Postgres,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load the sample roster into Postgres
    Seed,
    /// Import grade rows from a CSV file into Postgres
    Import {
        #[arg(long = "from")]
        from: PathBuf,
    },
    /// Analyze grade trends and list students, at-risk first
    Analyze {
        #[arg(long)]
        student: Option<String>,
        #[arg(long)]
        at_risk_only: bool,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },
    /// Generate a markdown report
    Report {
        #[arg(long)]
        student: Option<String>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "grade_trend=info".into());
    let json = std::env::var("GRADE_TREND_LOG_FORMAT")
        .map(|value| value == "json")
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn connect(config: &AppConfig) -> anyhow::Result<PgPool> {
    let database_url = config.require_database_url()?;
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")
}

async fn analyze_from<P: GradeHistoryProvider>(
    provider: &P,
    config: &AppConfig,
    student: Option<&str>,
) -> anyhow::Result<Vec<StudentInsight>> {
    let mut students = provider.load_students().await?;
    if let Some(id) = student {
        students.retain(|s| s.id == id);
        if students.is_empty() {
            anyhow::bail!("no student with id {id}");
        }
    }
    Ok(analysis::analyze_roster(&students, &config.policy))
}

async fn load_insights(
    cli: &Cli,
    config: &AppConfig,
    student: Option<&str>,
) -> anyhow::Result<Vec<StudentInsight>> {
    match cli.source {
        Source::Sample => analyze_from(&SampleRoster, config, student).await,
        Source::Csv => {
            let path = cli
                .source_csv
                .as_ref()
                .context("--csv <path> is required with --source csv")?;
            analyze_from(&CsvRoster::new(path), config, student).await
        }
        Source::Postgres => {
            let pool = connect(config).await?;
            let roster = db::PgRoster::new(pool, student.map(str::to_string));
            analyze_from(&roster, config, student).await
        }
    }
}

/// Summarizes the whole ranked cohort, then applies the display filters.
fn select_insights(
    mut insights: Vec<StudentInsight>,
    at_risk_only: bool,
    limit: usize,
) -> (CohortSummary, Vec<StudentInsight>) {
    let summary = analysis::summarize(&insights);
    if at_risk_only {
        insights.retain(|insight| insight.result.is_at_risk);
    }
    insights.truncate(limit);
    (summary, insights)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;

    match &cli.command {
        Commands::InitDb => {
            let pool = connect(&config).await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let pool = connect(&config).await?;
            let inserted = db::seed(&pool).await?;
            println!("Seed data inserted ({inserted} new grades).");
        }
        Commands::Import { from } => {
            let pool = connect(&config).await?;
            let inserted = db::import_csv(&pool, from).await?;
            println!("Inserted {inserted} grades from {}.", from.display());
        }
        Commands::Analyze {
            student,
            at_risk_only,
            limit,
            format,
        } => {
            let insights = load_insights(&cli, &config, student.as_deref()).await?;
            let (summary, insights) = select_insights(insights, *at_risk_only, *limit);

            match format {
                Format::Json => {
                    println!(
                        "{}",
                        report::to_json(&insights, summary, chrono::Utc::now())?
                    );
                }
                Format::Text => {
                    if insights.is_empty() {
                        println!("No students matched.");
                        return Ok(());
                    }
                    println!(
                        "{} students, {} at risk:",
                        summary.total, summary.at_risk
                    );
                    for insight in &insights {
                        println!("{}", report::format_line(insight));
                    }
                }
            }
        }
        Commands::Report { student, out } => {
            let insights = load_insights(&cli, &config, student.as_deref()).await?;
            let report =
                report::build_report(student.as_deref(), &insights, chrono::Utc::now());
            std::fs::write(out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            tracing::info!(path = %out.display(), students = insights.len(), "report written");
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_analyze_with_csv_source() {
        let cli = Cli::try_parse_from([
            "grade-trend",
            "--source",
            "csv",
            "--csv",
            "grades.csv",
            "analyze",
            "--at-risk-only",
            "--format",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.source, Source::Csv);
        assert_eq!(cli.source_csv, Some(PathBuf::from("grades.csv")));
        match cli.command {
            Commands::Analyze {
                at_risk_only,
                limit,
                format,
                ..
            } => {
                assert!(at_risk_only);
                assert_eq!(limit, 10);
                assert_eq!(format, Format::Json);
            }
            _ => panic!("expected analyze"),
        }
    }

    #[tokio::test]
    async fn summary_covers_cohort_before_filters() {
        let insights = analyze_from(&SampleRoster, &AppConfig::default(), None)
            .await
            .unwrap();
        let (summary, shown) = select_insights(insights.clone(), true, 10);
        assert_eq!(summary, CohortSummary { total: 5, at_risk: 3 });
        assert_eq!(shown.len(), 3);
        assert!(shown.iter().all(|insight| insight.result.is_at_risk));

        let (summary, shown) = select_insights(insights, false, 2);
        assert_eq!(summary, CohortSummary { total: 5, at_risk: 3 });
        let ids: Vec<&str> = shown.iter().map(|i| i.student_id.as_str()).collect();
        assert_eq!(ids, vec!["s1", "s3"]);
    }

    #[tokio::test]
    async fn unknown_student_is_an_error() {
        let result = analyze_from(&SampleRoster, &AppConfig::default(), Some("nobody")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn student_filter_keeps_one_history() {
        let insights = analyze_from(&SampleRoster, &AppConfig::default(), Some("s4"))
            .await
            .unwrap();
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].student_name, "David Lee");
        assert!(insights[0].result.is_at_risk);
    }
}
