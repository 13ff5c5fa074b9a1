use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "epu-cli", about = "Operator CLI for an epu-serverd control plane", version)]
pub struct Cli {
    /// Base URL of the epu-serverd instance to talk to.
    #[arg(long, env = "EPU_URL", global = true, default_value = "http://localhost:8080")]
    pub url: String,

    /// Bearer token. Falls back to the token file written by `epu-cli login`.
    #[arg(long, env = "EPU_TOKEN", global = true)]
    pub token: Option<String>,

    /// Identity attached to domain-mutating requests.
    #[arg(long, env = "EPU_CALLER", global = true, default_value = "")]
    pub caller: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Save a token to the local token file for future invocations.
    Login {
        token: String,
    },

    /// Liveness/readiness of the server.
    Status,

    #[command(subcommand)]
    DomainDefinition(DomainDefinitionCommand),

    #[command(subcommand)]
    Domain(DomainCommand),

    /// Submit a provision request read from a JSON file.
    Provision {
        request_file: PathBuf,
    },

    TerminateNodes {
        node_ids: Vec<String>,
    },

    TerminateLaunches {
        launch_ids: Vec<String>,
    },

    TerminateAll,

    CheckTerminateAll,

    DumpState {
        node_ids: Vec<String>,
    },
}

#[derive(Debug, Subcommand)]
pub enum DomainDefinitionCommand {
    List,
    Describe { id: String },
    /// Add a definition read from a JSON file.
    Add { file: PathBuf },
    /// Replace a definition with one read from a JSON file.
    Update { id: String, file: PathBuf },
    Remove { id: String },
}

#[derive(Debug, Subcommand)]
pub enum DomainCommand {
    List,
    Describe { id: String },
    /// Instantiate a domain definition. `config_file` defaults to `{}`.
    Add {
        domain_id: String,
        definition_id: String,
        config_file: Option<PathBuf>,
        #[arg(long)]
        subscriber: Vec<String>,
    },
    Remove { id: String },
    /// Replace a domain's config, read from a JSON file.
    Reconfigure { id: String, config_file: PathBuf },
    Subscribe { id: String, subscriber: String },
    Unsubscribe { id: String, subscriber: String },
}
