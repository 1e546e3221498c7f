//! Logs command implementation

use crate::commands::shared::{cancel_on_ctrl_c, find_devspace, load_catalog, CliContext};
use anyhow::Result;
use nocalhost_core::logs::{LogStream, LogTarget};
use nocalhost_core::poll::CancelHandle;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, instrument};

#[instrument(skip(context))]
pub async fn execute_logs(
    context: &CliContext,
    devspace: i64,
    pod: String,
    container: String,
) -> Result<()> {
    let settings = context.load_settings()?;
    let catalog = load_catalog(&settings).await?;
    let devspace = find_devspace(&catalog, devspace)?;
    let (session, _requests) = context.open_session(&settings)?;

    let (tx, mut lines) = mpsc::unbounded_channel();
    let target = LogTarget {
        devspace,
        pod,
        container,
    };
    let mut stream = LogStream::new(Arc::new(session.log_source()), target, tx);
    stream.start().await?;

    let shutdown = CancelHandle::new();
    cancel_on_ctrl_c(shutdown.clone());
    let token = shutdown.token();

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            line = lines.recv() => match line {
                Some(line) => println!("{}", line),
                None => break,
            },
            _ = tokio::time::sleep(std::time::Duration::from_millis(500)), if stream.is_finished() => {
                debug!("Log follower exited");
                break;
            }
        }
    }

    // Print anything the follower delivered before exiting
    while let Ok(line) = lines.try_recv() {
        println!("{}", line);
    }
    stream.stop();
    Ok(())
}
