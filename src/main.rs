use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use health_sync::config::SyncConfig;
use health_sync::ingest::{DocumentKind, PdfTextExtractor, ReportClassifier, ingest_local_document};
use health_sync::pipeline::{
    DailyPipeline, RunResult, STEP_BIOMETRICS, STEP_DELIVERY, STEP_REPORT, STEP_SCAN,
    run_scheduled,
};
use health_sync::store::open_store;
use tracing_subscriber::prelude::*;

#[derive(Parser, Debug)]
#[command(name = "health-sync", about = "Daily health data sync and report")]
struct Cli {
    /// Run for this date instead of today (YYYY-MM-DD)
    #[arg(long, global = true)]
    date: Option<NaiveDate>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Full pipeline; loops on HEALTH_SCHEDULE when set (default)
    Run,
    /// Fetch and store the day's biometrics only
    Biometrics,
    /// Scan the remote folder for new documents only
    Scan,
    /// Generate the daily report from stored data
    Report {
        /// Also deliver the report by email
        #[arg(long)]
        email: bool,
    },
    /// Ingest one local file
    Ingest {
        /// PDF, .txt or .md file
        path: PathBuf,

        /// Document kind, skipping classification (e.g. blood-panel)
        #[arg(long)]
        kind: Option<DocumentKind>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| "Failed to install rustls crypto provider")?;

    // Console logging, plus a daily-rolling file when HEALTH_LOG_DIR is set
    let (file_layer, _log_guard) = match std::env::var("HEALTH_LOG_DIR") {
        Ok(dir) if !dir.trim().is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, "health-sync.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        _ => (None, None),
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(file_layer)
        .init();

    let cli = Cli::parse();
    let mut config = SyncConfig::from_env()?;
    if cli.date.is_some() {
        config.run_date = cli.date;
    }

    eprintln!("health-sync v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Data dir: {}", config.data_dir.display());
    eprintln!("   Timezone: {}", config.timezone);

    let command = match cli.command.unwrap_or(Command::Run) {
        Command::Ingest { path, kind } => return ingest(&config, path, kind).await,
        other => other,
    };

    let pipeline = DailyPipeline::from_config(&config).await?;
    let date = config.today();
    let result = match command {
        Command::Biometrics => pipeline.run_only(date, &[STEP_BIOMETRICS]).await,
        Command::Scan => pipeline.run_only(date, &[STEP_SCAN]).await,
        Command::Report { email: false } => pipeline.run_only(date, &[STEP_REPORT]).await,
        Command::Report { email: true } => {
            pipeline.run_only(date, &[STEP_REPORT, STEP_DELIVERY]).await
        }
        Command::Run | Command::Ingest { .. } => {
            // ── Daemon mode ──────────────────────────────────────────────
            if let Some(expression) = &config.schedule {
                if cli.date.is_some() {
                    eprintln!("--date is ignored in daemon mode");
                }
                eprintln!("   Schedule: {expression}");
                run_scheduled(&pipeline, expression, config.timezone).await?;
                return Ok(ExitCode::SUCCESS);
            }
            // ── One-shot ─────────────────────────────────────────────────
            pipeline.run(date).await
        }
    };
    Ok(report_exit(&result))
}

fn report_exit(result: &RunResult) -> ExitCode {
    for step in &result.steps {
        eprintln!("   {:<18} {:?}", step.name, step.outcome);
    }
    if result.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

async fn ingest(
    config: &SyncConfig,
    path: PathBuf,
    kind_override: Option<DocumentKind>,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let store = open_store(config).await?;
    let classifier = ReportClassifier::new()?;
    let doc = ingest_local_document(
        &path,
        kind_override,
        config.today(),
        Arc::new(PdfTextExtractor),
        &classifier,
        store.as_ref(),
    )
    .await?;

    eprintln!("   Stored {} ({} chars) for {}", doc.kind, doc.text.len(), doc.date);
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_means_full_run() {
        let cli = Cli::try_parse_from(["health-sync"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.date.is_none());
    }

    #[test]
    fn report_takes_date_and_email() {
        let cli =
            Cli::try_parse_from(["health-sync", "report", "--email", "--date", "2024-05-01"])
                .unwrap();
        assert!(matches!(cli.command, Some(Command::Report { email: true })));
        assert_eq!(cli.date, NaiveDate::from_ymd_opt(2024, 5, 1));
    }

    #[test]
    fn date_is_accepted_before_the_subcommand() {
        let cli = Cli::try_parse_from(["health-sync", "--date", "2024-02-29", "scan"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Scan)));
        assert_eq!(cli.date, NaiveDate::from_ymd_opt(2024, 2, 29));
    }

    #[test]
    fn ingest_parses_kind_label() {
        let cli = Cli::try_parse_from([
            "health-sync",
            "ingest",
            "labs.pdf",
            "--kind",
            "blood-panel",
        ])
        .unwrap();
        match cli.command {
            Some(Command::Ingest { path, kind }) => {
                assert_eq!(path, PathBuf::from("labs.pdf"));
                assert_eq!(kind, Some(DocumentKind::BloodPanel));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn malformed_date_is_rejected() {
        assert!(Cli::try_parse_from(["health-sync", "biometrics", "--date", "05/01/2024"]).is_err());
    }
}
