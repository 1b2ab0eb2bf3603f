use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::path::PathBuf;

use tacsync_core::{logging, SyncConfig};
use tacsync_domain::TaskStatus;
use tacsync_session::SyncSession;

const NODE_PROTOCOL_VERSION: u32 = 1;
const TOKEN_ENV: &str = "TACSYNC_TOKEN";

#[derive(Debug, Serialize)]
struct NodeVersionHandshake {
    version: &'static str,
    protocol_version: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|arg| arg == "--version-json") {
        let handshake = NodeVersionHandshake {
            version: env!("CARGO_PKG_VERSION"),
            protocol_version: NODE_PROTOCOL_VERSION,
        };
        println!("{}", serde_json::to_string(&handshake)?);
        return Ok(());
    }

    let config_path = parse_config_path(&args)?;
    let config = SyncConfig::load(config_path.as_deref()).with_context(|| match &config_path {
        Some(path) => format!("loading {}", path.display()),
        None => "building default configuration".to_string(),
    })?;
    logging::init_from_config(&config.logging);

    let token = std::env::var(TOKEN_ENV)
        .ok()
        .filter(|token| !token.trim().is_empty())
        .with_context(|| format!("{} is not set", TOKEN_ENV))?;

    tracing::info!(
        ws_url = %config.server.ws_url,
        username = %config.operator.username,
        "Starting tacsync-node"
    );

    let session = SyncSession::from_config(config)?;
    session.start(token).await?;

    let mut revisions = session.model().subscribe();
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                tracing::info!("Shutdown requested");
                break;
            }
            changed = revisions.changed() => {
                if changed.is_err() {
                    break;
                }
                log_summary(&session)?;
            }
        }
    }

    session.shutdown().await;
    Ok(())
}

fn log_summary(session: &SyncSession) -> Result<()> {
    let visibility = session.config().aircraft.visibility;
    let (aircraft, visible, operators, counts) = session.model().read(|model| {
        (
            model.aircraft.len(),
            model.visible_aircraft(visibility).len(),
            model.operators.len(),
            model.status_counts(),
        )
    })?;
    let count = |status: TaskStatus| counts.get(&status).copied().unwrap_or(0);
    tracing::debug!(
        aircraft,
        visible,
        operators,
        pending = count(TaskStatus::Pending),
        accepted = count(TaskStatus::Accepted),
        connection = ?session.connection_state(),
        "Model updated"
    );
    Ok(())
}

fn parse_config_path(args: &[String]) -> Result<Option<PathBuf>> {
    let mut args_iter = args.iter();
    while let Some(arg) = args_iter.next() {
        if arg == "--config" {
            if let Some(path) = args_iter.next() {
                return Ok(Some(PathBuf::from(path)));
            }
            bail!("--config was provided without a path");
        }
    }
    Ok(None)
}
