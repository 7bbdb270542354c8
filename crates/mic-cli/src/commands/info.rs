//! Info command - show firmware and hardware details

use std::time::Duration;

use anyhow::{bail, Result};
use mic_can::{MicContext, Operation, SessionEvent};

use super::run_task;
use crate::output::{DeviceInfoRow, OutputContext};

/// Read and print the device information of one controller
pub async fn info(
    context: &MicContext,
    id: i64,
    timeout_ms: Option<u64>,
    ctx: &OutputContext,
) -> Result<()> {
    let timeout = timeout_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| context.config().info_timeout());

    let mut record = None;
    run_task(context, id, Operation::RetrieveInfo { timeout }, |event| {
        if let SessionEvent::InfoAvailable(info) = event {
            record = Some(info);
        }
    })
    .await?;

    let Some(record) = record else {
        bail!("Controller {} returned no device information", id);
    };

    ctx.print_one(&DeviceInfoRow::new(id, &record));
    Ok(())
}
