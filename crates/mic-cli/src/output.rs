//! Output formatting for mic-cli (table, json)

use clap::ValueEnum;
use colored::Colorize;
use mic_can::TelemetryRecord;
use serde::{Deserialize, Serialize};
use tabled::{Table, Tabled};

/// Output format options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// ASCII table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Context for output rendering
pub struct OutputContext {
    pub format: OutputFormat,
    pub quiet: bool,
}

impl OutputContext {
    pub fn new(format: OutputFormat, no_color: bool, quiet: bool) -> Self {
        if no_color {
            colored::control::set_override(false);
        }
        Self { format, quiet }
    }

    /// Print a success message (unless in quiet mode)
    pub fn success(&self, msg: &str) {
        if !self.quiet {
            println!("{}", msg.green());
        }
    }

    /// Print an info message (unless in quiet mode)
    pub fn info(&self, msg: &str) {
        if !self.quiet {
            println!("{}", msg);
        }
    }

    /// Print a single item in the configured format
    pub fn print_one<T: Tabled + Serialize>(&self, data: &T) {
        match self.format {
            OutputFormat::Table => {
                let table = Table::new([data]).to_string();
                println!("{}", table);
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string())
                );
            }
        }
    }

    /// Print key-value pairs
    pub fn print_kv(&self, pairs: &[(&str, String)]) {
        match self.format {
            OutputFormat::Table => {
                for (key, value) in pairs {
                    println!("{}: {}", key.bold(), value);
                }
            }
            OutputFormat::Json => {
                let map: serde_json::Map<String, serde_json::Value> = pairs
                    .iter()
                    .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.clone())))
                    .collect();
                println!(
                    "{}",
                    serde_json::to_string_pretty(&map).unwrap_or_else(|_| "{}".to_string())
                );
            }
        }
    }
}

// =============================================================================
// Display types
// =============================================================================

/// Device information display for the info command
#[derive(Debug, Tabled, Serialize)]
pub struct DeviceInfoRow {
    #[tabled(rename = "ID")]
    pub controller_id: i64,
    #[tabled(rename = "Firmware")]
    pub firmware_version: String,
    #[tabled(rename = "Status")]
    pub fw_status: String,
    #[tabled(rename = "Hardware")]
    pub hardware_name: String,
    #[tabled(rename = "Unique ID")]
    pub unique_id: String,
}

impl DeviceInfoRow {
    pub fn new(controller_id: i64, record: &TelemetryRecord) -> Self {
        Self {
            controller_id,
            firmware_version: record.firmware_version.to_string(),
            fw_status: record.fw_status.to_string(),
            hardware_name: record.hardware_name.clone(),
            unique_id: record.unique_id_hex(),
        }
    }
}
