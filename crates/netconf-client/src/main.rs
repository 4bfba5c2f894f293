//! netconf-tool CLI entry point.

use std::process::ExitCode;

use clap::Parser;
use netconf_core::{TracingConfig, init_tracing};

use netconf_client::cli::{Cli, Command, ConfigAction};
use netconf_client::commands;
use netconf_client::config::ClientConfig;
use netconf_client::error::ClientResult;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut tracing = match (&cli.command, cli.debug) {
        (Command::Watch { .. }, true) => TracingConfig::supervisor(),
        (_, true) => TracingConfig::cli_debug(),
        (_, false) => TracingConfig::default(),
    };
    if let Some(ref path) = cli.log_file {
        tracing = tracing.with_log_file(path);
    }
    if let Err(e) = init_tracing(tracing) {
        eprintln!("warning: could not initialise logging: {}", e);
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> ClientResult<()> {
    let config_path = cli.config.clone().unwrap_or_else(ClientConfig::default_path);
    let config = match cli.config {
        Some(ref path) => ClientConfig::load_from(path)?,
        None => ClientConfig::load()?,
    };
    let settings = &config.supervisor;

    match &cli.command {
        Command::Hello { session, json } => {
            let target = cli.target.resolve(&config, session.as_deref())?;
            commands::session::hello(&target, settings, *json).await
        }
        Command::Rpc {
            session,
            input,
            timeout,
        } => {
            let target = cli.target.resolve(&config, session.as_deref())?;
            commands::session::rpc(&target, settings, input, *timeout).await
        }
        Command::Get { session, filter } => {
            let target = cli.target.resolve(&config, session.as_deref())?;
            commands::session::get(&target, settings, filter.as_deref()).await
        }
        Command::GetConfig {
            session,
            source,
            filter,
        } => {
            let target = cli.target.resolve(&config, session.as_deref())?;
            commands::session::get_config(&target, settings, source, filter.as_deref()).await
        }
        Command::Listen {
            session,
            stream,
            count,
        } => {
            let target = cli.target.resolve(&config, session.as_deref())?;
            commands::session::listen(&target, settings, stream.as_deref(), *count).await
        }
        Command::CallHome {
            port,
            timeout,
            over,
        } => commands::callhome::run(*port, *timeout, *over, settings).await,
        Command::Watch { session } => {
            let target = cli.target.resolve(&config, session.as_deref())?;
            commands::session::watch(&target, settings).await
        }
        Command::Config { action } => match action {
            ConfigAction::Dump => commands::config::dump(&config, &config_path),
            ConfigAction::Validate => commands::config::validate(&config),
            ConfigAction::Path => commands::config::path(&config_path),
        },
    }
}
