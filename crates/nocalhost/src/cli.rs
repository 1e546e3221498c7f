use crate::commands;
use crate::commands::shared::CliContext;
use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Output format options
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text format
    Text,
    /// JSON structured format
    Json,
}

/// Log format options
#[derive(Debug, Clone, ValueEnum)]
pub enum LogFormat {
    /// Human-readable text format
    Text,
    /// JSON structured format
    Json,
}

/// Log level options
#[derive(Debug, Clone, ValueEnum)]
pub enum LogLevel {
    /// Error messages only
    Error,
    /// Warning and error messages
    Warn,
    /// Informational messages and above
    Info,
    /// Debug messages and above
    Debug,
    /// All messages including trace
    Trace,
}

impl LogLevel {
    fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "nocalhost")]
#[command(about = "Browse dev spaces and drive dev mode through nhctl and kubectl")]
#[command(version)]
pub struct Cli {
    /// Log format (text or json, defaults to text, can be set via NOCALHOST_LOG_FORMAT env var)
    #[arg(long, global = true, value_enum)]
    pub log_format: Option<LogFormat>,

    /// Log level
    #[arg(long, global = true, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Settings file path (defaults to NOCALHOST_CONFIG, then the user config directory)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Path to the nhctl executable
    #[arg(long, global = true, value_name = "PATH")]
    pub nhctl: Option<String>,

    /// Path to the kubectl executable
    #[arg(long, global = true, value_name = "PATH")]
    pub kubectl: Option<String>,

    /// Directory holding the binding registry and catalog
    #[arg(long, global = true, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Pass --debug to every nhctl call
    #[arg(long, global = true)]
    pub nhctl_debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run one reconcile pass and print the dev-space tree
    Tree {
        /// Resource type to load under every application (e.g. Deployments)
        #[arg(long = "expand", value_name = "TYPE")]
        expand: Vec<String>,
    },

    /// Keep the tree reconciled, printing tree events until interrupted
    Watch {
        /// Seconds between passes (defaults to the settings value)
        #[arg(long, value_name = "SECS")]
        interval: Option<u64>,
    },

    /// Start or end dev mode for a workload
    Dev {
        #[command(subcommand)]
        command: DevCommands,
    },

    /// Install an application into a dev space
    Install(InstallArgs),

    /// List persisted local bindings
    Bindings {
        #[arg(long, value_enum, default_value = "text")]
        output: OutputFormat,
    },

    /// Follow a container's logs until interrupted
    Logs {
        #[arg(long, value_name = "ID")]
        devspace: i64,
        #[arg(long)]
        pod: String,
        #[arg(long)]
        container: String,
    },
}

#[derive(Debug, Clone, Args)]
pub struct WorkloadArgs {
    /// Dev space id
    #[arg(long, value_name = "ID")]
    pub devspace: i64,
    /// Application name
    #[arg(long = "app", value_name = "NAME")]
    pub application: String,
    /// Workload (deployment) name
    #[arg(long)]
    pub workload: String,
}

#[derive(Debug, Subcommand)]
pub enum DevCommands {
    /// Bring a workload into dev mode
    Start {
        #[command(flatten)]
        target: WorkloadArgs,
        /// Container to replace with the dev container
        #[arg(long)]
        container: String,
        /// Local source directory (defaults to the current directory)
        #[arg(long, value_name = "DIR")]
        local_dir: Option<PathBuf>,
    },
    /// Leave dev mode and drop the local binding
    End {
        #[command(flatten)]
        target: WorkloadArgs,
    },
}

#[derive(Debug, Clone, Args)]
pub struct InstallArgs {
    #[arg(long, value_name = "ID")]
    pub devspace: i64,
    #[arg(long = "app", value_name = "NAME")]
    pub application: String,
    /// Branch, tag or commit for git sources
    #[arg(long, value_name = "REF")]
    pub git_ref: Option<String>,
    /// Chart version for chart-repository sources
    #[arg(long, value_name = "VERSION")]
    pub helm_version: Option<String>,
    /// Values file for Helm sources
    #[arg(long, value_name = "FILE")]
    pub helm_values: Option<String>,
    /// `--set` value for Helm sources (KEY=VALUE, repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub values: Vec<String>,
    /// Source directory for local applications
    #[arg(long, value_name = "DIR")]
    pub local_path: Option<String>,
    /// Extra kustomize directory
    #[arg(long, value_name = "DIR")]
    pub kustomize_path: Option<String>,
}

impl Cli {
    pub async fn dispatch(self) -> Result<()> {
        let log_format = match self.log_format {
            Some(LogFormat::Text) => Some("text"),
            Some(LogFormat::Json) => Some("json"),
            None => None,
        };

        if std::env::var_os("NOCALHOST_LOG").is_none() && std::env::var_os("RUST_LOG").is_none() {
            let level = self.log_level.as_str();
            std::env::set_var(
                "RUST_LOG",
                format!("nocalhost={},nocalhost_core={}", level, level),
            );
        }
        nocalhost_core::logging::init(log_format)?;
        tracing::debug!("CLI initialized with log level: {}", self.log_level.as_str());

        let context = CliContext {
            config: self.config,
            nhctl: self.nhctl,
            kubectl: self.kubectl,
            data_dir: self.data_dir,
            nhctl_debug: self.nhctl_debug,
        };

        match self.command {
            Commands::Tree { expand } => commands::tree::execute_tree(&context, &expand).await,
            Commands::Watch { interval } => commands::watch::execute_watch(&context, interval).await,
            Commands::Dev { command } => match command {
                DevCommands::Start {
                    target,
                    container,
                    local_dir,
                } => commands::dev::execute_dev_start(&context, &target, &container, local_dir).await,
                DevCommands::End { target } => commands::dev::execute_dev_end(&context, &target).await,
            },
            Commands::Install(args) => commands::install::execute_install(&context, &args).await,
            Commands::Bindings { output } => commands::bindings::execute_bindings(&context, output).await,
            Commands::Logs {
                devspace,
                pod,
                container,
            } => commands::logs::execute_logs(&context, devspace, pod, container).await,
        }
    }
}
