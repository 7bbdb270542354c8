//! Command implementations for mic-cli

pub mod flash;
pub mod info;
pub mod ping;
pub mod probe;

pub use flash::flash;
pub use info::info;
pub use ping::ping;
pub use probe::probe;

use anyhow::{bail, Context, Result};
use mic_can::{MicContext, Operation, SessionEvent, SessionTask};
use tracing::debug;

/// Run one operation on a session worker and feed its events to `on_event`
///
/// Returns the success message, or the failure message as an error. The
/// terminal event is not passed to `on_event`.
pub async fn run_task<F>(
    context: &MicContext,
    controller_id: i64,
    operation: Operation,
    mut on_event: F,
) -> Result<String>
where
    F: FnMut(SessionEvent),
{
    debug!(controller_id, operation = %operation, "Starting session task");
    let mut handle = SessionTask::spawn(context.clone(), controller_id, operation)
        .context("Failed to start session worker")?;

    let mut finished = None;
    while let Some(event) = handle.next_event().await {
        match event {
            SessionEvent::Finished { success, message } => finished = Some((success, message)),
            other => on_event(other),
        }
    }

    tokio::task::spawn_blocking(move || handle.join())
        .await
        .context("Failed to join session worker")?;

    match finished {
        Some((true, message)) => Ok(message),
        Some((false, message)) => bail!(message),
        None => bail!("Session worker exited without a result"),
    }
}
