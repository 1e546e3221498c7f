//! Followed container logs with start/pause/stop controls
//!
//! A [`LogStream`] attaches to a [`LogSource`] follower and forwards lines to
//! an output channel. Pausing keeps the follower attached and buffers lines
//! until the stream is started again.

use crate::command::decode_line;
use crate::errors::{CommandError, Result};
use crate::kubectl::KubectlClient;
use crate::model::DevSpace;
use crate::observability::logs_stream_span;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::fmt;
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument};

/// Which container's logs to follow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogTarget {
    pub devspace: DevSpace,
    pub pod: String,
    pub container: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogState {
    Stopped,
    Running,
    Paused,
}

impl fmt::Display for LogState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogState::Stopped => "stopped",
            LogState::Running => "running",
            LogState::Paused => "paused",
        };
        f.write_str(s)
    }
}

/// A live follower; dropping it detaches from the source
pub struct LogFollower {
    lines: mpsc::Receiver<String>,
    reader: Option<JoinHandle<()>>,
}

impl LogFollower {
    pub fn new(lines: mpsc::Receiver<String>, reader: Option<JoinHandle<()>>) -> Self {
        Self { lines, reader }
    }
}

impl Drop for LogFollower {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

#[async_trait]
pub trait LogSource: Send + Sync {
    /// Begin following `target`; lines arrive until the follower is dropped
    async fn follow(&self, target: &LogTarget) -> Result<LogFollower>;
}

/// Follows logs with `kubectl logs -f`
#[derive(Debug, Clone)]
pub struct KubectlLogSource {
    kubectl: KubectlClient,
}

impl KubectlLogSource {
    pub fn new(kubectl: KubectlClient) -> Self {
        Self { kubectl }
    }
}

#[async_trait]
impl LogSource for KubectlLogSource {
    async fn follow(&self, target: &LogTarget) -> Result<LogFollower> {
        let argv = self
            .kubectl
            .logs_argv(&target.pod, &target.container, true, &target.devspace);
        let (program, args) = argv.split_first().ok_or_else(|| CommandError::Spawn {
            program: String::new(),
            message: "empty command line".to_string(),
        })?;

        let mut child = Command::new(program)
            .args(args)
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

        let (tx, rx) = mpsc::channel(256);
        let span = logs_stream_span(&target.pod, &target.container);
        let reader = tokio::spawn(
            async move {
                // The child lives in this task so aborting it kills the follower.
                let _child = child;
                let mut out_lines = BufReader::new(stdout).split(b'\n');
                let mut err_lines = BufReader::new(stderr).split(b'\n');
                let mut out_done = false;
                let mut err_done = false;
                while !(out_done && err_done) {
                    let line = tokio::select! {
                        line = out_lines.next_segment(), if !out_done => match line {
                            Ok(Some(line)) => decode_line(&line),
                            _ => { out_done = true; continue; }
                        },
                        line = err_lines.next_segment(), if !err_done => match line {
                            Ok(Some(line)) => decode_line(&line),
                            _ => { err_done = true; continue; }
                        },
                    };
                    if tx.send(line).await.is_err() {
                        break;
                    }
                }
                debug!("Log follower finished");
            }
            .instrument(span),
        );

        Ok(LogFollower::new(rx, Some(reader)))
    }
}

/// Lines held while paused before the oldest are dropped
pub const PAUSED_BUFFER_LINES: usize = 10_000;

#[derive(Debug)]
struct Pump {
    paused: bool,
    buffer: VecDeque<String>,
    limit: usize,
    dropped: usize,
}

impl Pump {
    fn new(limit: usize) -> Self {
        Self {
            paused: false,
            buffer: VecDeque::new(),
            limit: limit.max(1),
            dropped: 0,
        }
    }

    fn hold(&mut self, line: String) {
        if self.buffer.len() >= self.limit {
            self.buffer.pop_front();
            if self.dropped == 0 {
                warn!(limit = self.limit, "Paused log buffer full, dropping oldest lines");
            }
            self.dropped += 1;
        }
        self.buffer.push_back(line);
    }

    fn reset(&mut self) {
        self.paused = false;
        self.buffer.clear();
        self.dropped = 0;
    }
}

/// Start/pause/stop state machine over one log target
pub struct LogStream {
    source: Arc<dyn LogSource>,
    target: LogTarget,
    output: mpsc::UnboundedSender<String>,
    state: LogState,
    pump: Arc<Mutex<Pump>>,
    task: Option<JoinHandle<()>>,
}

fn lock(pump: &Mutex<Pump>) -> MutexGuard<'_, Pump> {
    pump.lock().unwrap_or_else(PoisonError::into_inner)
}

impl LogStream {
    pub fn new(
        source: Arc<dyn LogSource>,
        target: LogTarget,
        output: mpsc::UnboundedSender<String>,
    ) -> Self {
        Self {
            source,
            target,
            output,
            state: LogState::Stopped,
            pump: Arc::new(Mutex::new(Pump::new(PAUSED_BUFFER_LINES))),
            task: None,
        }
    }

    /// Hold at most `lines` while paused
    #[must_use]
    pub fn with_buffer_limit(self, lines: usize) -> Self {
        *lock(&self.pump) = Pump::new(lines);
        self
    }

    pub fn state(&self) -> LogState {
        self.state
    }

    /// Attach from `Stopped`, or resume from `Paused` flushing buffered lines.
    ///
    /// Returns `Ok(false)` when already running.
    pub async fn start(&mut self) -> Result<bool> {
        match self.state {
            LogState::Running => Ok(false),
            LogState::Paused => {
                let mut pump = lock(&self.pump);
                if pump.dropped > 0 {
                    warn!(dropped = pump.dropped, "Log lines lost while paused");
                }
                for line in pump.buffer.drain(..) {
                    let _ = self.output.send(line);
                }
                pump.reset();
                drop(pump);
                self.state = LogState::Running;
                info!(pod = %self.target.pod, "Log stream resumed");
                Ok(true)
            }
            LogState::Stopped => {
                let mut follower = self.source.follow(&self.target).await?;
                lock(&self.pump).reset();
                let pump = Arc::clone(&self.pump);
                let output = self.output.clone();
                self.task = Some(tokio::spawn(async move {
                    while let Some(line) = follower.lines.recv().await {
                        let mut state = lock(&pump);
                        if state.paused {
                            state.hold(line);
                        } else if output.send(line).is_err() {
                            break;
                        }
                    }
                }));
                self.state = LogState::Running;
                info!(
                    pod = %self.target.pod,
                    container = %self.target.container,
                    "Log stream attached"
                );
                Ok(true)
            }
        }
    }

    /// Buffer incoming lines; only valid while running
    pub fn pause(&mut self) -> bool {
        if self.state != LogState::Running {
            return false;
        }
        lock(&self.pump).paused = true;
        self.state = LogState::Paused;
        true
    }

    /// Detach from the follower, discarding buffered lines
    pub fn stop(&mut self) -> bool {
        if self.state == LogState::Stopped {
            return false;
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
        let mut pump = lock(&self.pump);
        if !pump.buffer.is_empty() {
            warn!(discarded = pump.buffer.len(), "Dropping paused log lines");
        }
        pump.reset();
        drop(pump);
        self.state = LogState::Stopped;
        info!(pod = %self.target.pod, "Log stream stopped");
        true
    }

    /// Whether the follower ended on its own
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for LogStream {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

pub mod mock {
    //! In-memory log source driven by the test

    use super::{LogFollower, LogSource, LogTarget};
    use crate::errors::Result;
    use async_trait::async_trait;
    use std::sync::{Mutex, PoisonError};
    use tokio::sync::mpsc;

    /// Hands out followers whose lines the test pushes with [`ScriptedLogSource::emit`]
    #[derive(Debug, Default)]
    pub struct ScriptedLogSource {
        senders: Mutex<Vec<mpsc::Sender<String>>>,
    }

    impl ScriptedLogSource {
        pub fn new() -> Self {
            Self::default()
        }

        /// Number of times a follower was attached
        pub fn attach_count(&self) -> usize {
            self.senders.lock().unwrap_or_else(PoisonError::into_inner).len()
        }

        /// Send a line to the latest follower; false once it has been detached
        pub async fn emit(&self, line: &str) -> bool {
            let sender = self
                .senders
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .last()
                .cloned();
            match sender {
                Some(sender) => sender.send(line.to_string()).await.is_ok(),
                None => false,
            }
        }

        /// Whether the latest follower has been dropped
        pub fn is_detached(&self) -> bool {
            self.senders
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .last()
                .map_or(true, mpsc::Sender::is_closed)
        }
    }

    #[async_trait]
    impl LogSource for ScriptedLogSource {
        async fn follow(&self, _target: &LogTarget) -> Result<LogFollower> {
            let (tx, rx) = mpsc::channel(64);
            self.senders
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(tx);
            Ok(LogFollower::new(rx, None))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::ScriptedLogSource;
    use super::*;
    use crate::command::ProcessRunner;
    use std::time::Duration;

    fn target() -> LogTarget {
        LogTarget {
            devspace: DevSpace {
                id: 7,
                cluster_id: 7,
                namespace: "dev-7".to_string(),
                space_name: None,
                storage_class: None,
                kubeconfig: None,
            },
            pod: "web-6d9f7".to_string(),
            container: "app".to_string(),
        }
    }

    async fn next_line(rx: &mut mpsc::UnboundedReceiver<String>) -> Option<String> {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .ok()
            .flatten()
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_start_pause_resume_stop() {
        let source = Arc::new(ScriptedLogSource::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut stream = LogStream::new(source.clone(), target(), tx);

        assert!(stream.start().await.unwrap());
        assert_eq!(stream.state(), LogState::Running);
        assert!(!stream.start().await.unwrap());

        assert!(source.emit("first").await);
        assert_eq!(next_line(&mut rx).await.as_deref(), Some("first"));

        assert!(stream.pause());
        assert!(!stream.pause());
        assert!(source.emit("while paused").await);
        settle().await;
        assert!(rx.try_recv().is_err());

        assert!(stream.start().await.unwrap());
        assert_eq!(next_line(&mut rx).await.as_deref(), Some("while paused"));
        assert_eq!(source.attach_count(), 1);

        assert!(stream.stop());
        assert_eq!(stream.state(), LogState::Stopped);
        settle().await;
        assert!(source.is_detached());
        assert!(!stream.stop());
    }

    #[tokio::test]
    async fn test_paused_buffer_keeps_newest_lines() {
        let source = Arc::new(ScriptedLogSource::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut stream = LogStream::new(source.clone(), target(), tx).with_buffer_limit(3);

        stream.start().await.unwrap();
        stream.pause();
        for line in ["l1", "l2", "l3", "l4", "l5"] {
            assert!(source.emit(line).await);
        }
        settle().await;
        assert_eq!(lock(&stream.pump).buffer.len(), 3);
        assert_eq!(lock(&stream.pump).dropped, 2);

        assert!(stream.start().await.unwrap());
        assert_eq!(next_line(&mut rx).await.as_deref(), Some("l3"));
        assert_eq!(next_line(&mut rx).await.as_deref(), Some("l4"));
        assert_eq!(next_line(&mut rx).await.as_deref(), Some("l5"));
        settle().await;
        assert!(rx.try_recv().is_err());
        assert_eq!(lock(&stream.pump).dropped, 0);
    }

    #[tokio::test]
    async fn test_invalid_transitions_from_stopped() {
        let source = Arc::new(ScriptedLogSource::new());
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut stream = LogStream::new(source.clone(), target(), tx);

        assert!(!stream.pause());
        assert!(!stream.stop());
        assert_eq!(stream.state(), LogState::Stopped);
        assert_eq!(source.attach_count(), 0);
    }

    #[tokio::test]
    async fn test_stop_from_paused_reattaches_fresh() {
        let source = Arc::new(ScriptedLogSource::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut stream = LogStream::new(source.clone(), target(), tx);

        stream.start().await.unwrap();
        stream.pause();
        source.emit("stale").await;
        settle().await;
        assert!(stream.stop());

        stream.start().await.unwrap();
        assert_eq!(source.attach_count(), 2);
        source.emit("fresh").await;
        assert_eq!(next_line(&mut rx).await.as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn test_kubectl_source_missing_binary() {
        let kubectl = KubectlClient::new(Arc::new(ProcessRunner::new()), "kubectl-does-not-exist-xyz");
        let source = KubectlLogSource::new(kubectl);
        let err = source.follow(&target()).await.err().unwrap();
        assert_eq!(err.missing_binary(), Some("kubectl-does-not-exist-xyz"));
    }
}
