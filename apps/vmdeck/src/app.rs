use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::api::{ApiConfig, ConnectionParamsResolver, VmApiClient};
use crate::cli::{Cli, Command, ConsoleArgs};
use crate::config::Config;
use crate::console::surface::HeadlessHost;
use crate::console::{AttachmentState, ConnectionParams, SessionController};
use crate::error::CliError;
use crate::telemetry::logging;
use crate::transport::Credential;
use crate::transport::websocket::WebSocketConnector;

const ATTACH_POLL: Duration = Duration::from_millis(50);

pub fn init_logging(cli: &Cli) -> Result<(), CliError> {
    logging::init(&cli.logging.to_config())?;
    Ok(())
}

pub async fn run(cli: Cli, mut config: Config) -> Result<(), CliError> {
    if let Some(base) = cli.api_base {
        config.api_base = base;
    }
    if cli.token.is_some() {
        config.api_token = cli.token;
    }

    match cli.command {
        Command::Params { vm } => print_params(&config, &vm).await,
        Command::Console(args) => run_console(&config, args).await,
    }
}

fn api_client(config: &Config) -> Result<VmApiClient, CliError> {
    let api = ApiConfig::new(&config.api_base)?.with_bearer_token(config.api_token.clone());
    Ok(VmApiClient::new(api)?)
}

async fn print_params(config: &Config, vm: &str) -> Result<(), CliError> {
    let info = api_client(config)?.spice_connection(vm).await?;
    let summary = serde_json::json!({
        "vm": vm,
        "host": info.host,
        "wsPort": info.ws_port,
        "spicePort": info.spice_port,
        "password": info.password.is_some(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn resolve_params(config: &Config, args: &ConsoleArgs) -> Result<ConnectionParams, CliError> {
    let params = match (&args.host, args.port) {
        (Some(host), Some(port)) => {
            if host.trim().is_empty() {
                return Err(CliError::InvalidArgument("--host cannot be empty".into()));
            }
            ConnectionParams::new(host.trim(), port)
        }
        _ => api_client(config)?.resolve(&args.vm).await?,
    };
    Ok(match &args.password {
        Some(password) => params.with_credential(Some(Credential::new(password.clone()))),
        None => params,
    })
}

async fn run_console(config: &Config, args: ConsoleArgs) -> Result<(), CliError> {
    let params = resolve_params(config, &args).await?;
    info!(
        target: "vmdeck::app",
        vm = %args.vm,
        uri = %params.endpoint(),
        "mounting console"
    );

    let mut controller = SessionController::new(
        Arc::new(WebSocketConnector::new()),
        Arc::new(HeadlessHost::new()),
        config.timings,
    );
    if let Err(err) = controller.apply_params(params) {
        controller.close_session();
        return Err(err.into());
    }

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut pending_hotkey = args.send_ctrl_alt_del;
    let mut last_status = None;
    let mut poll = tokio::time::interval(ATTACH_POLL);
    loop {
        tokio::select! {
            result = &mut shutdown => {
                if let Err(err) = result {
                    warn!(target: "vmdeck::app", error = %err, "failed to listen for ctrl-c");
                }
                break;
            }
            _ = poll.tick() => {
                let status = controller.status().map(|message| message.text);
                if status.is_some() && status != last_status {
                    if let Some(text) = &status {
                        info!(target: "vmdeck::app", status = %text, "console status");
                        eprintln!("{text}");
                    }
                    last_status = status;
                }
                if pending_hotkey && controller.attachment_state() == Some(AttachmentState::Bound) {
                    pending_hotkey = !controller.send_hotkey_combo();
                    debug!(target: "vmdeck::app", sent = !pending_hotkey, "ctrl+alt+delete requested");
                }
            }
        }
    }

    controller.close_session();
    info!(target: "vmdeck::app", vm = %args.vm, "console unmounted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test_timeout::timeout]
    fn unwritable_log_file_is_a_cli_error() {
        let cli = Cli::try_parse_from([
            "vmdeck",
            "--log-file",
            "/nonexistent-vmdeck-dir/console.log",
            "params",
            "win11",
        ])
        .unwrap();
        let err = init_logging(&cli).unwrap_err();
        assert!(matches!(err, CliError::Logging(_)), "{err}");
    }
}
