//! Flashing primitive backed by an external tool process
//!
//! The tool is started once per ping attempt or upload. A ping succeeds when
//! the tool exits with status 0. During an upload every stdout line is one
//! primitive element: a number (optionally followed by `%`) is a percentage,
//! `true`/`ok`/`success` or `false`/`fail`/`failed` is the outcome. Other
//! lines are logged and skipped.

use std::path::Path;
use std::process::Stdio;

use async_stream::stream;
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{check_firmware, FlashOptions, FlashPrimitive, FlashStep, FlashTarget};
use crate::config::FlasherConfig;
use crate::error::MicError;
use crate::transport::CanBus;

/// Runs a configured flashing tool
///
/// A flasher without a program can still back sessions that only read
/// device information; ping and upload then fail with a config error.
#[derive(Debug, Clone)]
pub struct CommandFlasher {
    program: Option<String>,
    ping_args: Vec<String>,
    upload_args: Vec<String>,
}

impl CommandFlasher {
    pub fn from_config(config: &FlasherConfig) -> Self {
        Self {
            program: config.program.clone().filter(|p| !p.trim().is_empty()),
            ping_args: config.ping_args.clone(),
            upload_args: config.upload_args.clone(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.program.is_some()
    }

    fn program(&self) -> Result<&str, MicError> {
        self.program
            .as_deref()
            .ok_or_else(|| MicError::Config("no flashing tool configured".to_string()))
    }

    fn command(&self, args: Vec<String>) -> Result<Command, MicError> {
        let mut cmd = Command::new(self.program()?);
        cmd.args(args)
            .stdin(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        Ok(cmd)
    }

    fn spawn_error(&self, err: std::io::Error) -> MicError {
        MicError::Config(format!(
            "failed to start {}: {}",
            self.program.as_deref().unwrap_or("flashing tool"),
            err
        ))
    }
}

/// Substitute `{name}` placeholders in argument templates
fn render(
    templates: &[String],
    target: &FlashTarget,
    firmware: Option<&Path>,
    options: &FlashOptions,
) -> Vec<String> {
    let firmware = firmware
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    let vars = [
        ("{id}", target.controller.to_string()),
        ("{interface}", target.transport.interface.to_string()),
        ("{channel}", target.transport.channel.clone()),
        ("{firmware}", firmware),
        ("{timeout}", options.timeout.as_secs_f64().to_string()),
        ("{ping_repeat}", options.ping_repeat.to_string()),
        ("{bootloader}", options.bootloader.to_string()),
    ];

    templates
        .iter()
        .map(|template| {
            vars.iter()
                .fold(template.clone(), |arg, (key, value)| arg.replace(key, value))
        })
        .collect()
}

/// Interpret one line of tool output
fn parse_line(line: &str) -> Option<FlashStep> {
    let line = line.trim();
    match line.to_ascii_lowercase().as_str() {
        "true" | "ok" | "success" => return Some(FlashStep::Outcome(true)),
        "false" | "fail" | "failed" => return Some(FlashStep::Outcome(false)),
        _ => {}
    }

    line.trim_end_matches('%')
        .trim()
        .parse::<f64>()
        .ok()
        .map(FlashStep::Percent)
}

#[async_trait]
impl FlashPrimitive for CommandFlasher {
    async fn ping(
        &self,
        _bus: &mut dyn CanBus,
        target: &FlashTarget,
        options: &FlashOptions,
    ) -> Result<bool, MicError> {
        let attempts = options.ping_repeat.max(1);

        for attempt in 1..=attempts {
            let args = render(&self.ping_args, target, None, options);
            let mut child = self
                .command(args)?
                .stdout(Stdio::null())
                .spawn()
                .map_err(|e| self.spawn_error(e))?;

            match tokio::time::timeout(options.ping_timeout, child.wait()).await {
                Ok(Ok(status)) if status.success() => return Ok(true),
                Ok(Ok(status)) => {
                    debug!(attempt, %status, "Ping attempt got no answer");
                }
                Ok(Err(e)) => {
                    warn!(attempt, error = %e, "Ping attempt failed");
                }
                Err(_) => {
                    debug!(attempt, "Ping attempt timed out");
                    if let Err(e) = child.kill().await {
                        warn!(attempt, error = %e, "Failed to stop timed out ping");
                    }
                }
            }
        }

        Ok(false)
    }

    async fn upload<'a>(
        &'a self,
        _bus: &'a mut dyn CanBus,
        target: &FlashTarget,
        firmware: &Path,
        options: &FlashOptions,
    ) -> Result<BoxStream<'a, FlashStep>, MicError> {
        let firmware = check_firmware(firmware)?;
        let args = render(&self.upload_args, target, Some(&firmware), options);

        let mut command = self.command(args)?;
        info!(program = self.program()?, firmware = %firmware.display(), "Starting flashing tool");
        let mut child = command
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(e))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MicError::Config("flashing tool stdout unavailable".to_string()))?;

        Ok(stream! {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => match parse_line(&line) {
                        Some(step) => yield step,
                        None => debug!(line = %line, "Flashing tool output"),
                    },
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "Failed to read flashing tool output");
                        break;
                    }
                }
            }

            match child.wait().await {
                Ok(status) if status.success() => {}
                Ok(status) => {
                    warn!(%status, "Flashing tool exited with failure");
                    yield FlashStep::Outcome(false);
                }
                Err(e) => {
                    warn!(error = %e, "Failed to wait for flashing tool");
                    yield FlashStep::Outcome(false);
                }
            }
        }
        .boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{InterfaceKind, TransportConfig};
    use crate::session::ControllerId;
    use crate::transport::mock::MockConnector;
    use crate::transport::BusConnector;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::time::Duration;

    fn target() -> FlashTarget {
        FlashTarget {
            controller: ControllerId::new(12).unwrap(),
            transport: TransportConfig::new(InterfaceKind::SocketCan, "can0"),
        }
    }

    fn options() -> FlashOptions {
        FlashOptions {
            ping_repeat: 3,
            ping_timeout: Duration::from_secs(1),
            timeout: Duration::from_secs(5),
            bootloader: false,
        }
    }

    #[test]
    fn test_render_substitutes_placeholders() {
        let templates: Vec<String> = [
            "--interface={interface}",
            "{channel}",
            "--id",
            "{id}",
            "{firmware}",
            "--timeout",
            "{timeout}",
            "--retries={ping_repeat}",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let args = render(&templates, &target(), Some(Path::new("/tmp/fw.bin")), &options());
        assert_eq!(
            args,
            vec![
                "--interface=socketcan",
                "can0",
                "--id",
                "12",
                "/tmp/fw.bin",
                "--timeout",
                "5",
                "--retries=3",
            ]
        );
    }

    #[rstest]
    #[case("42", Some(FlashStep::Percent(42.0)))]
    #[case(" 12.5% ", Some(FlashStep::Percent(12.5)))]
    #[case("True", Some(FlashStep::Outcome(true)))]
    #[case("ok", Some(FlashStep::Outcome(true)))]
    #[case("false", Some(FlashStep::Outcome(false)))]
    #[case("FAILED", Some(FlashStep::Outcome(false)))]
    #[case("Erasing flash...", None)]
    #[case("", None)]
    fn test_parse_line(#[case] line: &str, #[case] expected: Option<FlashStep>) {
        assert_eq!(parse_line(line), expected);
    }

    #[tokio::test]
    async fn test_missing_program_is_config_error() {
        let flasher = CommandFlasher::from_config(&FlasherConfig::default());
        assert!(!flasher.is_configured());

        let connector = MockConnector::new();
        let config = TransportConfig::new(InterfaceKind::SocketCan, "vcan0");
        let mut bus = connector.open(&config).await.unwrap();

        let err = flasher
            .ping(bus.as_mut(), &target(), &options())
            .await
            .unwrap_err();
        assert!(matches!(err, MicError::Config(_)));
    }

    #[test]
    fn test_blank_program_is_unconfigured() {
        let flasher = CommandFlasher::from_config(&FlasherConfig {
            program: Some("  ".to_string()),
            ..FlasherConfig::default()
        });
        assert!(!flasher.is_configured());
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use crate::flash::{orchestrate, UploadProgressEvent};
        use pretty_assertions::assert_eq;
        use std::time::Instant;

        fn shell(ping: &str, upload: &str) -> CommandFlasher {
            CommandFlasher::from_config(&FlasherConfig {
                program: Some("sh".to_string()),
                ping_args: vec!["-c".to_string(), ping.to_string()],
                upload_args: vec!["-c".to_string(), upload.to_string()],
            })
        }

        async fn open_bus(connector: &MockConnector) -> Box<dyn CanBus> {
            let config = TransportConfig::new(InterfaceKind::SocketCan, "vcan0");
            connector.open(&config).await.unwrap()
        }

        async fn upload_steps(flasher: &CommandFlasher) -> Vec<FlashStep> {
            let dir = tempfile::tempdir().unwrap();
            let firmware = dir.path().join("fw.bin");
            std::fs::write(&firmware, [0u8; 32]).unwrap();

            let connector = MockConnector::new();
            let mut bus = open_bus(&connector).await;
            flasher
                .upload(bus.as_mut(), &target(), &firmware, &options())
                .await
                .unwrap()
                .collect()
                .await
        }

        #[tokio::test]
        async fn test_ping_succeeds_on_exit_zero() {
            let connector = MockConnector::new();
            let mut bus = open_bus(&connector).await;
            let flasher = shell("exit 0", "true");

            assert!(flasher.ping(bus.as_mut(), &target(), &options()).await.unwrap());
        }

        #[tokio::test]
        async fn test_ping_retries_then_reports_absent() {
            let dir = tempfile::tempdir().unwrap();
            let log = dir.path().join("attempts");
            let script = format!("echo try >> '{}'; exit 1", log.display());

            let connector = MockConnector::new();
            let mut bus = open_bus(&connector).await;
            let flasher = shell(&script, "true");

            assert!(!flasher.ping(bus.as_mut(), &target(), &options()).await.unwrap());
            let attempts = std::fs::read_to_string(&log).unwrap();
            assert_eq!(attempts.lines().count(), 3);
        }

        #[tokio::test]
        async fn test_ping_timeout_stops_the_tool() {
            let connector = MockConnector::new();
            let mut bus = open_bus(&connector).await;
            let flasher = shell("sleep 10", "true");
            let options = FlashOptions {
                ping_repeat: 1,
                ping_timeout: Duration::from_millis(100),
                ..options()
            };

            let started = Instant::now();
            assert!(!flasher.ping(bus.as_mut(), &target(), &options).await.unwrap());
            assert!(started.elapsed() < Duration::from_secs(5));
        }

        #[tokio::test]
        async fn test_upload_maps_output_lines() {
            let flasher = shell("exit 0", "echo 25; echo 50%; echo noise; echo true");
            assert_eq!(
                upload_steps(&flasher).await,
                vec![
                    FlashStep::Percent(25.0),
                    FlashStep::Percent(50.0),
                    FlashStep::Outcome(true),
                ]
            );
        }

        #[tokio::test]
        async fn test_upload_failed_exit_appends_failure() {
            let flasher = shell("exit 0", "echo 10; exit 3");
            assert_eq!(
                upload_steps(&flasher).await,
                vec![FlashStep::Percent(10.0), FlashStep::Outcome(false)]
            );
        }

        #[tokio::test]
        async fn test_upload_without_outcome_completes_as_failure() {
            let flasher = shell("exit 0", "echo 10");
            let steps = upload_steps(&flasher).await;
            assert_eq!(steps, vec![FlashStep::Percent(10.0)]);

            let events: Vec<_> = orchestrate(futures::stream::iter(steps)).collect().await;
            assert_eq!(
                events,
                vec![
                    UploadProgressEvent::Progress { percent: 10 },
                    UploadProgressEvent::Completed { success: false },
                ]
            );
        }
    }
}
