use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::telemetry::logging::{LogConfig, LogLevel};

#[derive(Parser, Debug)]
#[command(
    name = "vmdeck",
    about = "Remote display console for managed virtual machines",
    author,
    version = concat!(env!("CARGO_PKG_VERSION"), "-", env!("VMDECK_BUILD_STAMP"))
)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        env = "VMDECK_API_BASE",
        help = "Base URL of the VM management API"
    )]
    pub api_base: Option<String>,

    #[arg(
        long = "token",
        global = true,
        env = "VMDECK_API_TOKEN",
        hide_env_values = true,
        value_name = "TOKEN",
        help = "Bearer token for the VM management API"
    )]
    pub token: Option<String>,

    #[command(flatten)]
    pub logging: LoggingArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone)]
pub struct LoggingArgs {
    #[arg(
        long = "log-level",
        value_enum,
        global = true,
        env = "VMDECK_LOG_LEVEL",
        default_value_t = LogLevel::Warn,
        help = "Minimum log level (error, warn, info, debug, trace)"
    )]
    pub level: LogLevel,

    #[arg(
        long = "log-file",
        value_name = "PATH",
        global = true,
        env = "VMDECK_LOG_FILE",
        help = "Write logs to the specified file instead of stderr"
    )]
    pub file: Option<PathBuf>,
}

impl LoggingArgs {
    pub fn to_config(&self) -> LogConfig {
        LogConfig {
            level: self.level,
            file: self.file.clone(),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the display connection parameters the API reports for a VM
    Params {
        #[arg(value_name = "VM")]
        vm: String,
    },
    /// Open a display session for a VM and keep it mounted until Ctrl-C
    Console(ConsoleArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ConsoleArgs {
    #[arg(value_name = "VM")]
    pub vm: String,

    #[arg(
        long,
        value_name = "HOST",
        requires = "port",
        help = "Connect to this display proxy host instead of asking the API"
    )]
    pub host: Option<String>,

    #[arg(long, value_name = "PORT", requires = "host")]
    pub port: Option<u16>,

    #[arg(long, value_name = "PASSWORD", hide_env_values = true, env = "VMDECK_DISPLAY_PASSWORD")]
    pub password: Option<String>,

    #[arg(
        long = "send-ctrl-alt-del",
        help = "Inject Ctrl+Alt+Delete once the display is attached"
    )]
    pub send_ctrl_alt_del: bool,
}
