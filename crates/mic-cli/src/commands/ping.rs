//! Ping command - check that a controller answers

use anyhow::Result;
use mic_can::{MicContext, Operation};

use super::run_task;
use crate::output::OutputContext;

pub async fn ping(context: &MicContext, id: i64, ctx: &OutputContext) -> Result<()> {
    ctx.info(&format!("Pinging controller {}...", id));
    let message = run_task(context, id, Operation::Ping, |_| {}).await?;
    ctx.success(&message);
    Ok(())
}
