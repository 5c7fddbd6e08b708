use clap::{Parser, Subcommand};
use issueflow::config::AppConfig;
use issueflow::querier::ReportQuerier;
use issueflow::report::{self, JsonDirSink};
use issueflow::types::ProjectKey;
use issueflow::{create_app, AppState};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Issue-tracker flow analytics.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Analyse one project and write its aggregates as JSON artifacts.
    Report {
        /// Project key; defaults to JIRA_PROJECT_KEY.
        #[arg(long)]
        project: Option<String>,
        /// Output directory; defaults to REPORT_OUTPUT_DIR.
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Serve reports over HTTP.
    Serve {
        /// Port to listen on; defaults to PORT.
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // Initialize tracing (logging)
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "issueflow=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {}. Exiting.", e);
            std::process::exit(1);
        }
    };

    let command = cli.command.unwrap_or(Command::Report {
        project: None,
        output_dir: None,
    });

    let result = match command {
        Command::Report {
            project,
            output_dir,
        } => run_report(config, project, output_dir).await,
        Command::Serve { port } => serve(config, port).await,
    };

    if let Err(e) = result {
        tracing::error!("Error during analysis: {:#}", e);
        std::process::exit(1);
    }
}

async fn run_report(
    config: AppConfig,
    project: Option<String>,
    output_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    let project = project
        .map(ProjectKey::new)
        .unwrap_or_else(|| config.jira_project_key.clone());
    let output_dir = output_dir.unwrap_or_else(|| config.report_output_dir.clone());

    let querier = ReportQuerier::new(&config)?;
    let report = querier.report(&project).await?;

    if report.summary.incomplete {
        tracing::warn!(
            project = %project,
            "Issue search stopped early; the report covers a partial issue set"
        );
    }

    let mut sink = JsonDirSink::create(&output_dir)?;
    let written = report::publish(&report, &mut sink)?;
    tracing::info!(
        project = %project,
        artifacts = written,
        dir = %output_dir.display(),
        "Analysis complete"
    );
    Ok(())
}

async fn serve(config: AppConfig, port: Option<u16>) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port.unwrap_or(config.port)));
    let state = Arc::new(AppState::new(&config)?);
    let app = create_app(state);

    tracing::info!("Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("signal received, starting graceful shutdown");
}
