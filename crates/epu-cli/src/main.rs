mod cli;
mod commands;
mod output;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Command, DomainCommand, DomainDefinitionCommand};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).with_target(false).init();

    let cli = Cli::parse();

    match cli.command {
        Command::Login { token } => commands::login(&token),
        Command::Status => commands::status(&cli.url, cli.token).await,
        Command::DomainDefinition(cmd) => match cmd {
            DomainDefinitionCommand::List => commands::domain_definition_list(&cli.url, cli.token).await,
            DomainDefinitionCommand::Describe { id } => commands::domain_definition_describe(&cli.url, cli.token, &id).await,
            DomainDefinitionCommand::Add { file } => commands::domain_definition_add(&cli.url, cli.token, &file).await,
            DomainDefinitionCommand::Update { id, file } => {
                commands::domain_definition_update(&cli.url, cli.token, &id, &file).await
            }
            DomainDefinitionCommand::Remove { id } => commands::domain_definition_remove(&cli.url, cli.token, &id).await,
        },
        Command::Domain(cmd) => match cmd {
            DomainCommand::List => commands::domain_list(&cli.url, cli.token).await,
            DomainCommand::Describe { id } => commands::domain_describe(&cli.url, cli.token, &id).await,
            DomainCommand::Add { domain_id, definition_id, config_file, subscriber } => {
                commands::domain_add(&cli.url, cli.token, &cli.caller, &domain_id, &definition_id, config_file, subscriber)
                    .await
            }
            DomainCommand::Remove { id } => commands::domain_remove(&cli.url, cli.token, &cli.caller, &id).await,
            DomainCommand::Reconfigure { id, config_file } => {
                commands::domain_reconfigure(&cli.url, cli.token, &cli.caller, &id, &config_file).await
            }
            DomainCommand::Subscribe { id, subscriber } => {
                commands::domain_subscribe(&cli.url, cli.token, &cli.caller, &id, &subscriber).await
            }
            DomainCommand::Unsubscribe { id, subscriber } => {
                commands::domain_unsubscribe(&cli.url, cli.token, &cli.caller, &id, &subscriber).await
            }
        },
        Command::Provision { request_file } => commands::provision(&cli.url, cli.token, &request_file).await,
        Command::TerminateNodes { node_ids } => commands::terminate_nodes(&cli.url, cli.token, node_ids).await,
        Command::TerminateLaunches { launch_ids } => commands::terminate_launches(&cli.url, cli.token, launch_ids).await,
        Command::TerminateAll => commands::terminate_all(&cli.url, cli.token).await,
        Command::CheckTerminateAll => commands::check_terminate_all(&cli.url, cli.token).await,
        Command::DumpState { node_ids } => commands::dump_state(&cli.url, cli.token, node_ids).await,
    }
}
