//! Command execution: config resolution, session setup, requests.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use analyst_common::{AnalystError, Result};
use analyst_config::{
    config_to_json, load_deployed, resolve_websocket_endpoint, AnalystConfig, AuthConfig,
    ConfigOverrides, DeployedConfig, ReconnectMode, SessionSettings,
};
use analyst_session::{
    CognitoConfig, CognitoTokenProvider, EnvTokenProvider, InboundMessage, OutboundAction,
    ReconnectPolicy, Session, SessionConfig, SessionError, StaticTokenProvider, TokenProvider,
    View,
};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::output;
use crate::{Cli, Command};

/// Used when `connect_timeout_secs` is 0.
const DEFAULT_READY_WAIT: Duration = Duration::from_secs(30);

fn session_error(e: SessionError) -> AnalystError {
    match e {
        SessionError::Auth(auth) => AnalystError::Auth(auth.to_string()),
        other => AnalystError::Session(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Load the config file with command line overrides applied.
pub(crate) fn load_config(cli: &Cli) -> Result<AnalystConfig> {
    Ok(analyst_config::load_config(
        cli.config.as_deref(),
        &overrides(cli),
    )?)
}

pub(crate) fn overrides(cli: &Cli) -> ConfigOverrides {
    ConfigOverrides {
        exports_path: cli.exports.clone(),
        websocket_endpoint: cli.endpoint.clone(),
    }
}

pub(crate) fn session_config(settings: &SessionSettings, endpoint: String) -> SessionConfig {
    let reconnect = match settings.reconnect {
        ReconnectMode::Immediate => ReconnectPolicy::Immediate,
        ReconnectMode::Backoff => ReconnectPolicy::Backoff {
            initial: Duration::from_millis(settings.reconnect_initial_ms),
            max: Duration::from_millis(settings.reconnect_max_ms),
        },
    };
    let secs = |s: u64| (s > 0).then(|| Duration::from_secs(s));

    SessionConfig::new(endpoint)
        .with_token_param(settings.token_param.clone())
        .with_reconnect(reconnect)
        .with_connect_timeout(secs(settings.connect_timeout_secs))
        .with_keepalive(secs(settings.keepalive_secs))
}

/// Pick the token source: `--id-token`, then the token environment
/// variable, then user pool sign-in.
pub(crate) fn token_provider(
    id_token: Option<&str>,
    auth: &AuthConfig,
    deployed: Option<&DeployedConfig>,
) -> Result<Arc<dyn TokenProvider>> {
    if let Some(token) = id_token.map(str::trim).filter(|t| !t.is_empty()) {
        debug!("Using identity token from the command line");
        return Ok(Arc::new(StaticTokenProvider::new(token)));
    }

    let env_is_set = |name: &str| {
        !name.is_empty() && std::env::var(name).is_ok_and(|v| !v.trim().is_empty())
    };

    if env_is_set(&auth.token_env) {
        debug!(var = %auth.token_env, "Using identity token from the environment");
        return Ok(Arc::new(EnvTokenProvider::new(auth.token_env.clone())));
    }

    if auth.username.is_empty() {
        return Err(AnalystError::Auth(format!(
            "no credentials: pass --id-token, set ${}, or configure auth.username",
            auth.token_env
        )));
    }

    let password = std::env::var(&auth.password_env)
        .ok()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| {
            AnalystError::Auth(format!(
                "set ${} to the password for {}",
                auth.password_env, auth.username
            ))
        })?;

    let cognito = deployed.and_then(DeployedConfig::cognito);
    let client_id = Some(auth.client_id.as_str())
        .filter(|c| !c.is_empty())
        .or_else(|| cognito.map(|c| c.user_pool_client_id.as_str()).filter(|c| !c.is_empty()))
        .ok_or_else(|| {
            AnalystError::Auth("no user pool client id: set auth.client_id or --exports".into())
        })?;
    let region = Some(auth.region.as_str())
        .filter(|r| !r.is_empty())
        .or_else(|| deployed.and_then(DeployedConfig::region))
        .ok_or_else(|| AnalystError::Auth("no region: set auth.region or --exports".into()))?;

    let provider = CognitoTokenProvider::new(CognitoConfig {
        region: region.to_string(),
        client_id: client_id.to_string(),
        username: auth.username.clone(),
        password,
        endpoint: None,
    })
    .map_err(|e| AnalystError::Auth(e.to_string()))?;
    debug!(username = %auth.username, region, "Using user pool sign-in");
    Ok(Arc::new(provider))
}

/// Parse `key=value`. Values that are valid JSON keep their type; anything
/// else is sent as a string.
pub(crate) fn parse_field(pair: &str) -> Result<(String, Value)> {
    let (key, raw) = pair
        .split_once('=')
        .filter(|(k, _)| !k.trim().is_empty())
        .ok_or_else(|| AnalystError::Other(format!("expected key=value, got '{pair}'")))?;
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.trim().to_string(), value))
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// The view and action a request command drives.
pub(crate) fn view_request(command: &Command) -> Option<(View, OutboundAction)> {
    let request = match command {
        Command::News { ticker } => (View::TickerNews, OutboundAction::ticker_news(ticker)),
        Command::FinancialData { ticker } => {
            (View::FinancialData, OutboundAction::financial_data(ticker))
        }
        Command::Fundamental { ticker } => (
            View::FundamentalAnalysis,
            OutboundAction::fundamental_analysis(ticker),
        ),
        Command::Investment { ticker } => (
            View::InvestmentAnalysis,
            OutboundAction::investment_analysis(ticker),
        ),
        Command::Qna { ticker } => (View::QualitativeQnA, OutboundAction::qualitative_qna(ticker)),
        Command::Industry {
            industry,
            region,
            horizon,
        } => (
            View::IndustryReport,
            OutboundAction::industry_report(industry, region.as_deref(), horizon.as_deref()),
        ),
        Command::Chat { question } => (View::Chat, OutboundAction::chat(question)),
        Command::Send { .. } | Command::Config => return None,
    };
    Some(request)
}

pub(crate) async fn run(cli: &Cli, config: &AnalystConfig) -> Result<()> {
    match &cli.command {
        Command::Config => {
            writeln!(std::io::stdout().lock(), "{}", config_to_json(config))?;
            Ok(())
        }
        Command::Send {
            action,
            fields,
            follow,
        } => {
            let mut outbound = OutboundAction::new(action.as_str());
            for pair in fields {
                let (key, value) = parse_field(pair)?;
                outbound = outbound.with_field(key, value);
            }
            send_raw(cli, config, &outbound, *follow).await
        }
        command => {
            let Some((view, action)) = view_request(command) else {
                return Ok(());
            };
            let session = open_session(cli, config).await?;
            let timeout = Duration::from_secs(config.session.request_timeout_secs);
            let response = session.request(view, &action, timeout).await;
            session.close();

            let response = response.map_err(session_error)?;
            write!(std::io::stdout().lock(), "{}", output::render_response(&response))?;
            Ok(())
        }
    }
}

async fn open_session(cli: &Cli, config: &AnalystConfig) -> Result<Session> {
    let endpoint = resolve_websocket_endpoint(config)?;
    let deployed = match &config.deployment.exports_path {
        Some(path) => Some(load_deployed(path)?),
        None => None,
    };
    let tokens = token_provider(cli.id_token.as_deref(), &config.auth, deployed.as_ref())?;

    let session = Session::new(session_config(&config.session, endpoint), tokens)
        .map_err(session_error)?;
    info!(session = %session.id(), "Connecting");
    session.open();

    let wait = match config.session.connect_timeout_secs {
        0 => DEFAULT_READY_WAIT,
        secs => Duration::from_secs(secs),
    };
    if let Err(e) = session.wait_ready(wait).await {
        session.close();
        return Err(AnalystError::Session(format!("could not connect: {e}")));
    }
    Ok(session)
}

/// Whether `msg` ends a raw send: the matching view's completion rule for
/// known actions, the first non-ack reply otherwise.
pub(crate) fn reply_completes(view: Option<View>, msg: &InboundMessage) -> bool {
    match view {
        Some(view) => view.profile().is_complete(msg),
        None => !msg.is_ack(),
    }
}

/// Send a raw action and print inbound messages until the reply is
/// complete, or until interrupted when following.
async fn send_raw(
    cli: &Cli,
    config: &AnalystConfig,
    action: &OutboundAction,
    follow: bool,
) -> Result<()> {
    let view = action.action_name().and_then(View::for_action);
    let session = open_session(cli, config).await?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let handler = session.on_message(move |msg| {
        let _ = tx.send(msg.clone());
    });

    if !session.send(action).await {
        session.close();
        return Err(session_error(SessionError::NotReady));
    }

    let deadline =
        tokio::time::Instant::now() + Duration::from_secs(config.session.request_timeout_secs);
    let result = loop {
        let next = tokio::select! {
            msg = rx.recv() => msg,
            _ = tokio::time::sleep_until(deadline), if !follow => {
                break Err(session_error(SessionError::Timeout));
            }
            _ = tokio::signal::ctrl_c() => break Ok(()),
        };
        let Some(msg) = next else {
            break Ok(());
        };
        let done = !follow && reply_completes(view, &msg);
        if let Err(e) = writeln!(std::io::stdout().lock(), "{}", output::render_message(msg)) {
            break Err(e.into());
        }
        if done {
            break Ok(());
        }
    };

    session.remove_handler(handler);
    session.close();
    result
}
