//! Flash command - firmware upload

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use mic_can::{MicContext, Operation, SessionEvent};

use super::run_task;
use crate::output::OutputContext;

/// Upload a firmware image to a controller
pub async fn flash(
    context: &MicContext,
    id: i64,
    firmware: &Path,
    ctx: &OutputContext,
) -> Result<()> {
    let size = std::fs::metadata(firmware)
        .with_context(|| format!("Failed to read firmware file: {}", firmware.display()))?
        .len();
    ctx.info(&format!(
        "Uploading {} ({} bytes) to controller {}",
        firmware.display(),
        size,
        id
    ));

    // Spinner until the first progress report
    let pb = if ctx.quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new_spinner()
    };
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.set_message("Connecting...");
    pb.enable_steady_tick(Duration::from_millis(100));

    let bar_style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}% {msg}")?
        .progress_chars("=>-");

    let result = run_task(
        context,
        id,
        Operation::Upload {
            firmware: firmware.to_path_buf(),
        },
        |event| match event {
            SessionEvent::ProgressBegin => {
                pb.set_length(100);
                pb.set_style(bar_style.clone());
                pb.set_message("Uploading...");
            }
            SessionEvent::Progress(percent) => pb.set_position(u64::from(percent)),
            _ => {}
        },
    )
    .await;

    match result {
        Ok(message) => {
            pb.finish_with_message("Complete!");
            ctx.success(&message);
            Ok(())
        }
        Err(e) => {
            pb.abandon_with_message("Failed!");
            Err(e)
        }
    }
}
