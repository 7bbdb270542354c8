//! Startup check that a transport can be opened

use tracing::{debug, warn};

use super::BusConnector;
use crate::config::TransportConfig;

/// Open and immediately close the configured channel.
///
/// Returns `true` only if the open succeeded. Errors are logged, never raised.
pub async fn probe(connector: &dyn BusConnector, config: &TransportConfig) -> bool {
    match connector.open(config).await {
        Ok(mut bus) => {
            bus.close();
            debug!(interface = %config.interface, channel = %config.channel, "Transport probe succeeded");
            true
        }
        Err(e) => {
            warn!(
                interface = %config.interface,
                channel = %config.channel,
                error = %e,
                "Transport probe failed"
            );
            false
        }
    }
}
