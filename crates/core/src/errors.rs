//! Error types and handling
//!
//! Each domain gets its own error enum (external commands, response parsing,
//! dev mode, configuration, local bindings) and all of them are wrapped by
//! [`NocalhostError`] for unified propagation.

use thiserror::Error;

/// Failures of an external command invocation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// The binary could not be started at all (missing from PATH, not executable)
    #[error("Failed to start {program}: {message}")]
    Spawn { program: String, message: String },

    /// The process ran and exited with a non-zero status
    #[error("Command `{command}` exited with code {exit_code}: {output}")]
    NonZeroExit {
        command: String,
        exit_code: i32,
        output: String,
    },

    /// The worker was interrupted while waiting for the process
    #[error("Command `{command}` was interrupted")]
    Interrupted { command: String },

    /// The blocking worker running the command panicked or was cancelled
    #[error("Command worker failed: {0}")]
    Join(String),
}

impl CommandError {
    /// Captured output of a failed command, if any
    pub fn output(&self) -> Option<&str> {
        match self {
            CommandError::NonZeroExit { output, .. } => Some(output),
            _ => None,
        }
    }
}

/// Structured output that did not have the expected shape
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Failed to parse YAML from {context}: {message}")]
    Yaml { context: String, message: String },

    #[error("Failed to parse JSON from {context}: {message}")]
    Json { context: String, message: String },
}

/// Dev-mode orchestration failures that are not plain command failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DevModeError {
    /// The workload never became ready within the configured bound
    #[error("Workload {workload} was not ready after {attempts} attempts")]
    ReadinessTimeout { workload: String, attempts: u32 },

    /// The caller cancelled the orchestration
    #[error("Dev mode start for {workload} was cancelled")]
    Cancelled { workload: String },

    /// The describe record for the workload could not be obtained
    #[error("Unable to describe workload {workload}: {message}")]
    DescribeUnavailable { workload: String, message: String },

    /// The deployment carries no pod selector, so its pods cannot be found
    #[error("Deployment {workload} has no pod selector")]
    MissingSelector { workload: String },
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Settings file parsing error
    #[error("Failed to parse settings file: {message}")]
    Parsing { message: String },

    /// Settings validation error
    #[error("Settings validation error: {message}")]
    Validation { message: String },

    /// Settings file I/O error
    #[error("Failed to read settings file")]
    Io(#[from] std::io::Error),

    /// Settings file not found
    #[error("Settings file not found: {path}")]
    NotFound { path: String },
}

/// Local binding registry errors
#[derive(Error, Debug)]
pub enum BindingError {
    #[error("Failed to access binding registry")]
    Io(#[from] std::io::Error),

    #[error("Binding registry at {path} is corrupt: {message}")]
    Corrupt { path: String, message: String },
}

/// Main error enum wrapping all domain-specific errors
#[derive(Error, Debug)]
pub enum NocalhostError {
    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    #[error("Malformed response: {0}")]
    Parse(#[from] ParseError),

    #[error("Dev mode error: {0}")]
    DevMode(#[from] DevModeError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Binding registry error: {0}")]
    Binding(#[from] BindingError),

    /// The workbench actor has shut down
    #[error("Workbench is no longer running")]
    WorkbenchClosed,

    /// Application was already present when an install was requested
    #[error("Application {name} is already installed")]
    AlreadyInstalled { name: String },
}

impl NocalhostError {
    /// Name of the external program that could not be started, if that is the cause
    pub fn missing_binary(&self) -> Option<&str> {
        match self {
            NocalhostError::Command(CommandError::Spawn { program, .. }) => Some(program),
            _ => None,
        }
    }

    /// Whether this error means an external binary is not installed
    pub fn is_binary_missing(&self) -> bool {
        self.missing_binary().is_some()
    }

    /// Message shown to users; malformed output reads the same as a failed command
    pub fn user_message(&self) -> String {
        match self {
            NocalhostError::Parse(e) => format!("Command failed: {}", e),
            NocalhostError::Command(CommandError::NonZeroExit { output, .. }) => {
                format!("Command failed: {}", output.trim())
            }
            other => other.to_string(),
        }
    }
}

/// Convenience type alias for Results with NocalhostError
pub type Result<T> = std::result::Result<T, NocalhostError>;
