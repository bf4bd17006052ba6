use std::fmt::Write as _;
use std::io::IsTerminal;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine as _;
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use devwire_plist::Value;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
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

/// Where a printed message came from.
#[derive(Clone, Copy, Debug)]
pub struct Origin<'a> {
    pub device: &'a str,
    pub service: &'a str,
}

#[derive(Serialize)]
struct MessageOutput<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    device: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    service: Option<&'a str>,
    kind: &'static str,
    message: serde_json::Value,
    timestamp: String,
}

pub fn print_value(value: &Value, origin: Option<Origin<'_>>, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = MessageOutput {
                device: origin.map(|o| o.device),
                service: origin.map(|o| o.service),
                kind: value.kind(),
                message: to_json(value),
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => println!("{}", render_table(value)),
        OutputFormat::Pretty => {
            if let Some(origin) = origin {
                println!("# {} / {}", origin.device, origin.service);
            }
            print!("{}", render_pretty(value));
        }
    }
}

/// JSON rendering of a property list; data becomes base64 text.
pub fn to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Text(text) => serde_json::Value::String(text.clone()),
        Value::Bytes(bytes) => {
            serde_json::Value::String(base64::engine::general_purpose::STANDARD.encode(bytes))
        }
        Value::Integer(n) => serde_json::Value::from(*n),
        Value::Boolean(b) => serde_json::Value::Bool(*b),
        Value::Real(r) => serde_json::Number::from_f64(*r)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Array(items) => serde_json::Value::Array(items.iter().map(to_json).collect()),
        Value::Dictionary(dict) => serde_json::Value::Object(
            dict.iter()
                .map(|(key, value)| (key.to_string(), to_json(value)))
                .collect(),
        ),
    }
}

fn render_table(value: &Value) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["KEY", "TYPE", "VALUE"]);

    match value {
        Value::Dictionary(dict) => {
            for (key, value) in dict.iter() {
                table.add_row(vec![key.to_string(), value.kind().to_string(), cell(value)]);
            }
        }
        other => {
            table.add_row(vec!["-".to_string(), other.kind().to_string(), cell(other)]);
        }
    }
    table
}

fn cell(value: &Value) -> String {
    match value {
        Value::Text(text) => text.clone(),
        Value::Bytes(bytes) => format!("<data {} bytes>", bytes.len()),
        other => to_json(other).to_string(),
    }
}

fn render_pretty(value: &Value) -> String {
    let mut out = String::new();
    match value {
        Value::Dictionary(dict) => {
            for (key, value) in dict.iter() {
                write_pretty(&mut out, key, value, 0);
            }
        }
        other => write_pretty(&mut out, "value", other, 0),
    }
    out
}

fn write_pretty(out: &mut String, key: &str, value: &Value, depth: usize) {
    let indent = "  ".repeat(depth);
    match value {
        Value::Dictionary(dict) => {
            let _ = writeln!(out, "{indent}{key} = {{");
            for (k, v) in dict.iter() {
                write_pretty(out, k, v, depth + 1);
            }
            let _ = writeln!(out, "{indent}}}");
        }
        Value::Array(items) => {
            let _ = writeln!(out, "{indent}{key} = [");
            for (index, item) in items.iter().enumerate() {
                write_pretty(out, &index.to_string(), item, depth + 1);
            }
            let _ = writeln!(out, "{indent}]");
        }
        Value::Text(text) => {
            let _ = writeln!(out, "{indent}{key} = {text:?}");
        }
        Value::Bytes(bytes) => {
            let _ = writeln!(out, "{indent}{key} = <{}>", hex_preview(bytes));
        }
        other => {
            let _ = writeln!(out, "{indent}{key} = {}", to_json(other));
        }
    }
}

fn hex_preview(bytes: &[u8]) -> String {
    const LIMIT: usize = 32;
    let mut text: String = bytes
        .iter()
        .take(LIMIT)
        .map(|b| format!("{b:02x}"))
        .collect();
    if bytes.len() > LIMIT {
        let _ = write!(text, "... {} bytes", bytes.len());
    }
    text
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
