//! Background execution of session operations
//!
//! Each [`SessionTask`] runs one operation on a dedicated worker thread and
//! reports back through an ordered event stream:
//!
//! ```text
//! [ProgressBegin] Progress* [InfoAvailable] Finished
//! ```
//!
//! `ProgressBegin` is emitted with the first progress update, never before.
//! `Finished` is emitted exactly once, after the session has released the
//! bus. Front ends (CLI, GUI, tests) consume the events without depending on
//! each other.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{error, info, info_span, Instrument};

use crate::config::{SessionConfig, TransportConfig};
use crate::error::MicError;
use crate::flash::{FlashPrimitive, UploadProgressEvent};
use crate::session::{ControllerId, DeviceSession};
use crate::telemetry::TelemetryRecord;
use crate::transport::BusConnector;

/// Message reported when an upload succeeds
pub const UPLOAD_SUCCEEDED: &str = "Firmware upload succeeded.";
/// Message reported when the flashing primitive reports failure
pub const UPLOAD_FAILED: &str = "Firmware upload failed.";

/// Event reported by a running task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// First progress update is about to follow
    ProgressBegin,
    /// Upload progress in percent
    Progress(u8),
    /// Device information was decoded
    InfoAvailable(TelemetryRecord),
    /// Terminal outcome; always the last event
    Finished { success: bool, message: String },
}

/// Operation a task performs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Ping,
    RetrieveInfo { timeout: Duration },
    Upload { firmware: PathBuf },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::RetrieveInfo { .. } => "retrieve_info",
            Self::Upload { .. } => "upload",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Everything needed to build sessions
#[derive(Clone)]
pub struct MicContext {
    transport: Option<TransportConfig>,
    config: SessionConfig,
    connector: Arc<dyn BusConnector>,
    flasher: Arc<dyn FlashPrimitive>,
}

impl MicContext {
    /// Context whose transport is selected from the host platform when a
    /// session is built
    pub fn new(
        config: SessionConfig,
        connector: Arc<dyn BusConnector>,
        flasher: Arc<dyn FlashPrimitive>,
    ) -> Self {
        Self {
            transport: None,
            config,
            connector,
            flasher,
        }
    }

    /// Use a fixed transport instead of the host mapping
    pub fn with_transport(mut self, transport: TransportConfig) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Validate the id, select the transport and probe it
    pub async fn open_session(&self, controller_id: i64) -> Result<DeviceSession, MicError> {
        let controller = ControllerId::new(controller_id)?;
        let transport = match &self.transport {
            Some(transport) => transport.clone(),
            None => TransportConfig::for_host()?,
        };

        DeviceSession::new(
            controller,
            transport,
            self.config.clone(),
            self.connector.clone(),
            self.flasher.clone(),
        )
        .await
    }
}

/// Spawns workers for session operations
pub struct SessionTask;

impl SessionTask {
    /// Run `operation` against `controller_id` on a new worker thread
    pub fn spawn(
        context: MicContext,
        controller_id: i64,
        operation: Operation,
    ) -> std::io::Result<SessionTaskHandle> {
        let (tx, rx) = mpsc::unbounded_channel();
        let emitter = Emitter { tx };

        let worker = thread::Builder::new()
            .name(format!("mic-{}-{}", operation.name(), controller_id))
            .spawn(move || run_worker(context, controller_id, operation, emitter))?;

        Ok(SessionTaskHandle {
            events: rx,
            worker: Some(worker),
        })
    }
}

/// Receiving end of a running task
pub struct SessionTaskHandle {
    events: mpsc::UnboundedReceiver<SessionEvent>,
    worker: Option<JoinHandle<()>>,
}

impl SessionTaskHandle {
    /// Next event; `None` once the worker is gone
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    /// Blocking variant for threads without an async runtime
    ///
    /// Panics when called from within an async runtime.
    pub fn blocking_next_event(&mut self) -> Option<SessionEvent> {
        self.events.blocking_recv()
    }

    /// Wait for the worker thread to exit
    pub fn join(mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("Session worker panicked");
            }
        }
    }
}

struct Emitter {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl Emitter {
    fn emit(&self, event: SessionEvent) {
        // The receiver may be gone; the operation still runs to completion
        let _ = self.tx.send(event);
    }
}

/// Terminal outcome of one operation
#[derive(Debug)]
struct Outcome {
    success: bool,
    message: String,
}

impl Outcome {
    fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

fn run_worker(context: MicContext, controller_id: i64, operation: Operation, events: Emitter) {
    let outcome = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => {
            let span = info_span!("session_task", controller_id, operation = operation.name());
            let run = AssertUnwindSafe(|| {
                runtime.block_on(
                    execute(&context, controller_id, operation, &events).instrument(span),
                )
            });
            match panic::catch_unwind(run) {
                Ok(outcome) => outcome,
                Err(payload) => {
                    let reason = panic_message(payload.as_ref());
                    error!(controller_id, reason = %reason, "Session worker panicked");
                    Outcome::failure(format!("Session worker panicked: {}", reason))
                }
            }
        }
        Err(e) => Outcome::failure(format!("Failed to start worker runtime: {}", e)),
    };

    events.emit(SessionEvent::Finished {
        success: outcome.success,
        message: outcome.message,
    });
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

async fn execute(
    context: &MicContext,
    controller_id: i64,
    operation: Operation,
    events: &Emitter,
) -> Outcome {
    let mut session = match context.open_session(controller_id).await {
        Ok(session) => session,
        Err(e) => {
            error!(error = %e, "Failed to create session");
            return Outcome::failure(e.to_string());
        }
    };

    let result = run_operation(&mut session, operation, events).await;
    session.deactivate();

    match result {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(error = %e, "Operation failed");
            Outcome::failure(e.to_string())
        }
    }
}

async fn run_operation(
    session: &mut DeviceSession,
    operation: Operation,
    events: &Emitter,
) -> Result<Outcome, MicError> {
    session.activate().await?;
    let controller_id = session.controller().get();

    match operation {
        Operation::Ping => {
            if session.ping().await? {
                Ok(Outcome::success(format!(
                    "Controller {} answered",
                    controller_id
                )))
            } else {
                Err(MicError::NoResponse { controller_id })
            }
        }

        Operation::RetrieveInfo { timeout } => {
            let record = session.retrieve_info(timeout).await?;
            events.emit(SessionEvent::InfoAvailable(record));
            Ok(Outcome::success(""))
        }

        Operation::Upload { firmware } => {
            if !session.ping().await? {
                return Err(MicError::NoResponse { controller_id });
            }

            let mut stream = session.upload(&firmware).await?;
            let mut begun = false;
            let mut success = false;

            while let Some(event) = stream.next().await {
                match event {
                    UploadProgressEvent::Progress { percent } => {
                        if !begun {
                            events.emit(SessionEvent::ProgressBegin);
                            begun = true;
                        }
                        events.emit(SessionEvent::Progress(percent));
                    }
                    UploadProgressEvent::Completed { success: done } => success = done,
                }
            }

            if success {
                info!("Firmware upload finished");
                Ok(Outcome::success(UPLOAD_SUCCEEDED))
            } else {
                Ok(Outcome::failure(UPLOAD_FAILED))
            }
        }
    }
}
