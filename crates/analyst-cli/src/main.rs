//! analyst: command line client for the investment analyst WebSocket API.
//!
//! Each command opens one session, sends one action, prints what the
//! matching view would show, and closes the session.

mod commands;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

use analyst_config::{AnalystConfig, LogLevel};

#[derive(Parser)]
#[command(name = "analyst", version, about = "Client for the investment analyst WebSocket API")]
pub(crate) struct Cli {
    /// Config file (defaults to the platform config directory).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Deployed `aws-exports.json` to read the endpoint and user pool from.
    #[arg(long, global = true)]
    exports: Option<PathBuf>,

    /// WebSocket endpoint, overriding config and exports.
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Identity token to connect with, skipping sign-in.
    #[arg(long, global = true)]
    id_token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Latest news and a summary for a ticker.
    News {
        #[arg(long)]
        ticker: String,
    },
    /// Financial data for a ticker.
    FinancialData {
        #[arg(long)]
        ticker: String,
    },
    /// Fundamental analysis: financial summary, income statement, conclusion.
    Fundamental {
        #[arg(long)]
        ticker: String,
    },
    /// Investment analysis: summary, news, price history, knowledge.
    Investment {
        #[arg(long)]
        ticker: String,
    },
    /// Qualitative Q&A for a ticker.
    Qna {
        #[arg(long)]
        ticker: String,
    },
    /// Industry report.
    Industry {
        #[arg(long)]
        industry: String,
        /// Defaults to "global".
        #[arg(long)]
        region: Option<String>,
        /// Defaults to "next 12 months".
        #[arg(long)]
        horizon: Option<String>,
    },
    /// Ask the analyst chat a question.
    Chat { question: String },
    /// Send a raw action and print every inbound message.
    Send {
        action: String,
        /// Extra fields as key=value pairs.
        fields: Vec<String>,
        /// Keep printing messages until interrupted.
        #[arg(long)]
        follow: bool,
    },
    /// Print the resolved configuration as JSON.
    Config,
}

type LogHandle = reload::Handle<EnvFilter, Registry>;

fn level_filter(level: LogLevel) -> EnvFilter {
    let level = level.as_str();
    EnvFilter::new(format!(
        "analyst_cli={level},analyst_session={level},analyst_config={level}"
    ))
}

/// Install the subscriber before the config is read so the loader's own
/// messages are kept. Returns a handle for applying the configured level,
/// or `None` when `RUST_LOG` decides the filter.
fn init_tracing() -> Option<LogHandle> {
    let (filter, from_env) = match EnvFilter::try_from_default_env() {
        Ok(filter) => (filter, true),
        Err(_) => (level_filter(LogLevel::default()), false),
    };
    let (filter, handle) = reload::Layer::new(filter);
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
    (!from_env).then_some(handle)
}

fn apply_log_level(handle: Option<LogHandle>, config: &AnalystConfig) {
    let Some(handle) = handle else {
        return;
    };
    if let Err(e) = handle.reload(level_filter(config.logging.level)) {
        tracing::warn!(error = %e, "Failed to apply configured log level");
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let log_handle = init_tracing();

    let config = match commands::load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("analyst: {e}");
            return ExitCode::FAILURE;
        }
    };
    apply_log_level(log_handle, &config);

    match commands::run(&cli, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!(error = ?e, "Command failed");
            eprintln!("analyst: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_filter_covers_workspace_crates() {
        let filter = level_filter(LogLevel::Debug).to_string();
        for target in ["analyst_cli", "analyst_session", "analyst_config"] {
            assert!(filter.contains(&format!("{target}=debug")), "{filter}");
        }
    }
}
