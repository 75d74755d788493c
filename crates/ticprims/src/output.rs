use std::io::{IsTerminal, Write};
use std::time::UNIX_EPOCH;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use ticprims_core::{CoreError, CoreFrame, ErrorCode, Identifier};
use ticprims_frame::{Frame, Group, Mode};
use ticprims_transport::PortDescriptor;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct GroupOutput<'a> {
    label: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<&'a str>,
    value: &'a str,
    checksum: String,
    valid: bool,
}

impl<'a> From<&'a Group> for GroupOutput<'a> {
    fn from(group: &'a Group) -> Self {
        Self {
            label: group.label(),
            timestamp: group.timestamp(),
            value: group.value(),
            checksum: format!("{:02x}", group.checksum()),
            valid: group.is_valid(),
        }
    }
}

#[derive(Serialize)]
struct FrameOutput<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    identifier: Option<&'a Identifier>,
    mode: Mode,
    #[serde(skip_serializing_if = "Option::is_none")]
    capture_time_ms: Option<u128>,
    valid: bool,
    groups: Vec<GroupOutput<'a>>,
}

#[derive(Serialize)]
struct ErrorOutput<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    identifier: &'a Identifier,
    code: ErrorCode,
    code_value: i32,
    message: &'a str,
}

#[derive(Serialize)]
struct ModemOutput<'a> {
    port_id: Option<&'a str>,
    port_name: Option<&'a str>,
    serial_number: Option<&'a str>,
    vid: Option<String>,
    pid: Option<String>,
    manufacturer: Option<&'a str>,
    product: Option<&'a str>,
}

/// Print a frame captured from a modem.
pub fn print_core_frame(frame: &CoreFrame, format: OutputFormat) {
    let capture_time_ms = frame
        .capture_time
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .ok();
    print_frame(&frame.frame, Some(&frame.identifier), capture_time_ms, format);
}

/// Print a decoded frame, optionally tagged with its source.
pub fn print_frame(
    frame: &Frame,
    identifier: Option<&Identifier>,
    capture_time_ms: Option<u128>,
    format: OutputFormat,
) {
    match format {
        OutputFormat::Json => {
            let out = FrameOutput {
                kind: "frame",
                identifier,
                mode: frame.mode(),
                capture_time_ms,
                valid: frame.is_valid(),
                groups: frame.groups().iter().map(GroupOutput::from).collect(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["LABEL", "TIMESTAMP", "VALUE", "VALID"]);
            for group in frame.groups() {
                table.add_row(vec![
                    group.label().to_string(),
                    group.timestamp().unwrap_or("").to_string(),
                    group.value().to_string(),
                    if group.is_valid() { "yes" } else { "NO" }.to_string(),
                ]);
            }
            if let Some(identifier) = identifier {
                println!("{identifier} ({} mode)", frame.mode());
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let source = identifier.map_or_else(|| "frame".to_string(), |id| id.to_string());
            println!(
                "{source} mode={} groups={} valid={}",
                frame.mode(),
                frame.len(),
                frame.is_valid()
            );
            for group in frame.groups() {
                let mark = if group.is_valid() { "" } else { "  (bad checksum)" };
                match group.timestamp() {
                    Some(timestamp) => {
                        println!("  {} [{timestamp}] = {}{mark}", group.label(), group.value())
                    }
                    None => println!("  {} = {}{mark}", group.label(), group.value()),
                }
            }
        }
        OutputFormat::Raw => {
            let mut lines = String::new();
            for group in frame.groups() {
                lines.push_str(group.label());
                lines.push('\t');
                lines.push_str(group.value());
                lines.push('\n');
            }
            print_raw(lines.as_bytes());
        }
    }
}

/// Print an error published by a stream. Goes to stdout in JSON mode so a
/// consumer sees frames and errors in one ordered stream.
pub fn print_core_error(error: &CoreError, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = ErrorOutput {
                kind: "error",
                identifier: &error.identifier,
                code: error.code,
                code_value: error.code.code(),
                message: &error.message,
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table | OutputFormat::Pretty | OutputFormat::Raw => {
            eprintln!("{error}");
        }
    }
}

pub fn print_modems(modems: &[PortDescriptor], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = modems
                .iter()
                .map(|m| ModemOutput {
                    port_id: m.port_id.as_deref(),
                    port_name: m.port_name.as_deref(),
                    serial_number: m.serial_number.as_deref(),
                    vid: m.vid.map(|v| format!("{v:04x}")),
                    pid: m.pid.map(|p| format!("{p:04x}")),
                    manufacturer: m.manufacturer.as_deref(),
                    product: m.product.as_deref(),
                })
                .collect::<Vec<_>>();
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "[]".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["PORT", "SERIAL", "USB ID", "PRODUCT"]);
            for m in modems {
                table.add_row(vec![
                    m.device_path().unwrap_or("").to_string(),
                    m.serial_number.clone().unwrap_or_default(),
                    usb_id(m),
                    m.product.clone().unwrap_or_default(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            if modems.is_empty() {
                println!("no TIC modem found");
            }
            for m in modems {
                println!("{m}  {}", usb_id(m));
            }
        }
        OutputFormat::Raw => {
            for m in modems {
                println!("{}", m.device_path().unwrap_or(""));
            }
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn usb_id(descriptor: &PortDescriptor) -> String {
    match (descriptor.vid, descriptor.pid) {
        (Some(vid), Some(pid)) => format!("{vid:04x}:{pid:04x}"),
        _ => String::new(),
    }
}
