//! External command execution
//!
//! Both collaborating CLIs (`kubectl` and `nhctl`) are driven through the
//! [`CommandRunner`] trait. The process-backed implementation captures stdout
//! and stderr merged in arrival order and reports the exit status; a process
//! that cannot be spawned at all is reported as [`CommandError::Spawn`], which
//! is distinct from a process that ran and exited non-zero.

use crate::errors::CommandError;
use crate::observability::{command_exec_span, TimedSpan};
use async_trait::async_trait;
use std::collections::HashMap;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, instrument, Instrument};

/// Captured result of a process that ran to completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Merged stdout and stderr
    pub output: String,
    /// Exit code; -1 when the process was terminated by a signal
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs an external program and waits for it to exit
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Execute `argv` (program first) with `env` layered over the inherited environment
    async fn execute(
        &self,
        argv: &[String],
        env: &HashMap<String, String>,
    ) -> Result<CommandOutput, CommandError>;
}

#[async_trait]
impl<T: CommandRunner + ?Sized> CommandRunner for std::sync::Arc<T> {
    async fn execute(
        &self,
        argv: &[String],
        env: &HashMap<String, String>,
    ) -> Result<CommandOutput, CommandError> {
        (**self).execute(argv, env).await
    }
}

/// Render an argument vector the way a shell user would type it
pub fn command_line(argv: &[String]) -> String {
    shell_words::join(argv)
}

/// Execute and turn a non-zero exit into [`CommandError::NonZeroExit`]
pub async fn run_checked<R: CommandRunner + ?Sized>(
    runner: &R,
    argv: &[String],
    env: &HashMap<String, String>,
) -> Result<String, CommandError> {
    let result = runner.execute(argv, env).await?;
    if result.success() {
        Ok(result.output)
    } else {
        Err(CommandError::NonZeroExit {
            command: command_line(argv),
            exit_code: result.exit_code,
            output: result.output,
        })
    }
}

/// [`CommandRunner`] backed by real child processes
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    #[instrument(skip(self, env), fields(command = %command_line(argv)))]
    async fn execute(
        &self,
        argv: &[String],
        env: &HashMap<String, String>,
    ) -> Result<CommandOutput, CommandError> {
        let (program, args) = argv.split_first().ok_or_else(|| CommandError::Spawn {
            program: String::new(),
            message: "empty command line".to_string(),
        })?;

        let timed = TimedSpan::new(command_exec_span(program));
        let span = timed.span().clone();
        let result = run_process(program, args, env).instrument(span).await;
        let duration_ms = timed.complete();

        match &result {
            Ok(output) => debug!(
                exit_code = output.exit_code,
                duration_ms, "Command finished"
            ),
            Err(e) => debug!(error = %e, duration_ms, "Command failed to run"),
        }
        result
    }
}

/// One output line without its terminator; invalid UTF-8 becomes U+FFFD
pub(crate) fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

async fn run_process(
    program: &str,
    args: &[String],
    env: &HashMap<String, String>,
) -> Result<CommandOutput, CommandError> {
    let command = || {
        let mut argv = vec![program.to_string()];
        argv.extend(args.iter().cloned());
        command_line(&argv)
    };

    let mut child = Command::new(program)
        .args(args)
        .envs(env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| CommandError::Spawn {
            program: program.to_string(),
            message: e.to_string(),
        })?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| CommandError::Join("stdout was not captured".to_string()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| CommandError::Join("stderr was not captured".to_string()))?;

    let mut out_lines = BufReader::new(stdout).split(b'\n');
    let mut err_lines = BufReader::new(stderr).split(b'\n');
    let mut merged = String::new();
    let mut out_done = false;
    let mut err_done = false;

    while !(out_done && err_done) {
        tokio::select! {
            line = out_lines.next_segment(), if !out_done => match line {
                Ok(Some(line)) => {
                    merged.push_str(&decode_line(&line));
                    merged.push('\n');
                }
                Ok(None) => out_done = true,
                Err(_) => return Err(CommandError::Interrupted { command: command() }),
            },
            line = err_lines.next_segment(), if !err_done => match line {
                Ok(Some(line)) => {
                    merged.push_str(&decode_line(&line));
                    merged.push('\n');
                }
                Ok(None) => err_done = true,
                Err(_) => return Err(CommandError::Interrupted { command: command() }),
            },
        }
    }

    let status = child
        .wait()
        .await
        .map_err(|_| CommandError::Interrupted { command: command() })?;

    Ok(CommandOutput {
        output: merged,
        exit_code: status.code().unwrap_or(-1),
    })
}

pub mod mock {
    //! Scripted command runner for tests
    //!
    //! Responses are matched on the arguments after the program name: a rule
    //! applies when the argument list starts with the rule's tokens, and the
    //! longest matching rule wins. A rule holding several responses hands them
    //! out in order and keeps repeating the last one, which is how polling
    //! loops are simulated.

    use super::{command_line, CommandOutput, CommandRunner};
    use crate::errors::CommandError;
    use async_trait::async_trait;
    use std::collections::{HashMap, VecDeque};
    use std::sync::{Mutex, MutexGuard, PoisonError};

    /// One scripted outcome
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct MockResponse {
        pub exit_code: i32,
        pub output: String,
        /// When set, the call fails as if the binary could not be spawned
        pub spawn_error: Option<String>,
    }

    impl MockResponse {
        pub fn ok(output: impl Into<String>) -> Self {
            Self {
                exit_code: 0,
                output: output.into(),
                spawn_error: None,
            }
        }

        pub fn fail(exit_code: i32, output: impl Into<String>) -> Self {
            Self {
                exit_code,
                output: output.into(),
                spawn_error: None,
            }
        }

        pub fn spawn_failure(message: impl Into<String>) -> Self {
            Self {
                exit_code: -1,
                output: String::new(),
                spawn_error: Some(message.into()),
            }
        }
    }

    impl Default for MockResponse {
        fn default() -> Self {
            Self::ok("")
        }
    }

    /// A recorded invocation
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct MockCall {
        pub argv: Vec<String>,
        pub env: HashMap<String, String>,
    }

    impl MockCall {
        pub fn command_line(&self) -> String {
            command_line(&self.argv)
        }

        /// Whether the arguments after the program start with `prefix`
        pub fn starts_with(&self, prefix: &[&str]) -> bool {
            args_start_with(&self.argv, prefix)
        }

        /// Value following `flag`, if present
        pub fn flag_value(&self, flag: &str) -> Option<&str> {
            self.argv
                .iter()
                .position(|a| a == flag)
                .and_then(|i| self.argv.get(i + 1))
                .map(String::as_str)
        }

        /// Number of times `flag` appears
        pub fn flag_count(&self, flag: &str) -> usize {
            self.argv.iter().filter(|a| *a == flag).count()
        }
    }

    #[derive(Debug)]
    struct Rule {
        prefix: Vec<String>,
        responses: VecDeque<MockResponse>,
    }

    #[derive(Debug, Default)]
    struct State {
        rules: Vec<Rule>,
        default_response: MockResponse,
        history: Vec<MockCall>,
    }

    /// In-memory [`CommandRunner`]
    #[derive(Debug, Default)]
    pub struct MockRunner {
        state: Mutex<State>,
    }

    fn args_start_with(argv: &[String], prefix: &[&str]) -> bool {
        let args = argv.get(1..).unwrap_or_default();
        args.len() >= prefix.len() && args.iter().zip(prefix).all(|(a, p)| a == p)
    }

    impl MockRunner {
        pub fn new() -> Self {
            Self::default()
        }

        fn state(&self) -> MutexGuard<'_, State> {
            self.state.lock().unwrap_or_else(PoisonError::into_inner)
        }

        /// Respond to calls whose arguments start with `prefix`
        pub fn on(&self, prefix: &[&str], response: MockResponse) -> &Self {
            self.on_sequence(prefix, vec![response])
        }

        /// Respond with `responses` in order, repeating the last one
        pub fn on_sequence(&self, prefix: &[&str], responses: Vec<MockResponse>) -> &Self {
            let mut state = self.state();
            state.rules.retain(|r| r.prefix.iter().map(String::as_str).ne(prefix.iter().copied()));
            state.rules.push(Rule {
                prefix: prefix.iter().map(|s| s.to_string()).collect(),
                responses: responses.into(),
            });
            self
        }

        /// Response for calls that match no rule
        pub fn set_default(&self, response: MockResponse) {
            self.state().default_response = response;
        }

        pub fn history(&self) -> Vec<MockCall> {
            self.state().history.clone()
        }

        pub fn clear_history(&self) {
            self.state().history.clear();
        }

        /// Recorded calls whose arguments start with `prefix`
        pub fn calls_matching(&self, prefix: &[&str]) -> Vec<MockCall> {
            self.state()
                .history
                .iter()
                .filter(|c| c.starts_with(prefix))
                .cloned()
                .collect()
        }

        fn next_response(&self, argv: &[String]) -> MockResponse {
            let mut state = self.state();
            let default_response = state.default_response.clone();
            let rule = state
                .rules
                .iter_mut()
                .filter(|r| {
                    let prefix: Vec<&str> = r.prefix.iter().map(String::as_str).collect();
                    args_start_with(argv, &prefix)
                })
                .max_by_key(|r| r.prefix.len());

            match rule {
                Some(rule) if rule.responses.len() > 1 => {
                    rule.responses.pop_front().unwrap_or(default_response)
                }
                Some(rule) => rule.responses.front().cloned().unwrap_or(default_response),
                None => default_response,
            }
        }
    }

    #[async_trait]
    impl CommandRunner for MockRunner {
        async fn execute(
            &self,
            argv: &[String],
            env: &HashMap<String, String>,
        ) -> Result<CommandOutput, CommandError> {
            self.state().history.push(MockCall {
                argv: argv.to_vec(),
                env: env.clone(),
            });

            let response = self.next_response(argv);
            if let Some(message) = response.spawn_error {
                return Err(CommandError::Spawn {
                    program: argv.first().cloned().unwrap_or_default(),
                    message,
                });
            }

            Ok(CommandOutput {
                output: response.output,
                exit_code: response.exit_code,
            })
        }
    }
}
