//! Probe command - check the host CAN interface

use anyhow::Result;
use mic_can::{probe as probe_transport, BusConnector, MicError, TransportConfig};

use crate::output::OutputContext;

/// Open and close the host's CAN interface once
pub async fn probe(connector: &dyn BusConnector, ctx: &OutputContext) -> Result<()> {
    let transport = TransportConfig::for_host()?;
    let available = probe_transport(connector, &transport).await;

    ctx.print_kv(&[
        ("Interface", transport.interface.to_string()),
        ("Channel", transport.channel.clone()),
        ("Available", available.to_string()),
    ]);

    if !available {
        return Err(MicError::TransportUnavailable {
            interface: transport.interface.to_string(),
            channel: transport.channel,
        }
        .into());
    }

    Ok(())
}
