//! Normalises a flashing primitive's element stream

use async_stream::stream;
use futures::stream::{BoxStream, Stream, StreamExt};
use serde::Serialize;
use tracing::{debug, error, info};

use super::FlashStep;

/// Progress of one upload attempt
///
/// An attempt yields zero or more `Progress` events and then exactly one
/// `Completed` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum UploadProgressEvent {
    Progress { percent: u8 },
    Completed { success: bool },
}

/// Re-tag primitive elements as upload events.
///
/// The primitive is drained to its end. Percentages seen after an outcome
/// are dropped, the last outcome decides `Completed`, and a primitive that
/// never reports an outcome counts as a failed upload.
pub fn orchestrate<'a, S>(steps: S) -> BoxStream<'a, UploadProgressEvent>
where
    S: Stream<Item = FlashStep> + Send + 'a,
{
    stream! {
        let mut outcome: Option<bool> = None;
        futures::pin_mut!(steps);

        while let Some(step) = steps.next().await {
            match step {
                FlashStep::Percent(value) if outcome.is_none() => {
                    yield UploadProgressEvent::Progress { percent: to_percent(value) };
                }
                FlashStep::Percent(value) => {
                    debug!(value, "Dropping progress reported after outcome");
                }
                FlashStep::Outcome(success) => outcome = Some(success),
            }
        }

        let success = outcome.unwrap_or(false);
        if success {
            info!("Uploading succeeded");
        } else {
            error!("Uploading failed");
        }
        yield UploadProgressEvent::Completed { success };
    }
    .boxed()
}

fn to_percent(value: f64) -> u8 {
    // Saturating cast; NaN maps to 0
    value.clamp(0.0, 100.0) as u8
}
