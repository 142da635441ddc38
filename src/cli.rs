//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// AF gateway - traffic steering, PFD management and policy authorization relay
#[derive(Parser, Debug)]
#[command(name = "af-gateway")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "AF_GATEWAY_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// API port to listen on
    #[arg(short, long, env = "AF_GATEWAY_PORT")]
    pub port: Option<u16>,

    /// API host to bind to
    #[arg(long, env = "AF_GATEWAY_HOST")]
    pub host: Option<String>,

    /// Notification intake port to listen on
    #[arg(long, env = "AF_GATEWAY_NOTIFICATION_PORT")]
    pub notification_port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "AF_GATEWAY_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "AF_GATEWAY_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand (optional - defaults to server mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the gateway server (default)
    Serve,

    /// Print the effective configuration as YAML
    Config,
}
