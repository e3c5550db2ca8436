//! Log formatting options for different output styles

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// How logs should be formatted
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    /// Structured JSON format
    /// Example: {"timestamp":"2024-01-15T10:30:00Z","level":"INFO","target":"quarry_core::store","message":"..."}
    Json,

    /// Human-readable format (default)
    /// Example: 2024-01-15 10:30:00.000 INFO  [quarry_core::store] articles created a1
    Human,

    /// Logfmt format (key=value pairs)
    /// Example: timestamp=2024-01-15T10:30:00Z level=INFO target=quarry_core::store message="..."
    Logfmt,
}

impl LogFormat {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "human" | "text" => Some(Self::Human),
            "logfmt" => Some(Self::Logfmt),
            _ => None,
        }
    }

    /// Format a log entry according to this format
    pub fn format_entry(&self, entry: &LogEntry) -> String {
        match self {
            LogFormat::Json => format_json(entry),
            LogFormat::Human => format_human(entry),
            LogFormat::Logfmt => format_logfmt(entry),
        }
    }
}

/// A single record ready for formatting
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: log::Level,
    pub target: String,
    pub message: String,
    pub fields: Map<String, Value>,
}

impl LogEntry {
    pub fn new(level: log::Level, message: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            target: target.into(),
            message: message.into(),
            fields: Map::new(),
        }
    }

    pub fn from_record(record: &log::Record) -> Self {
        Self::new(record.level(), record.args().to_string(), record.target())
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }
}

fn format_json(entry: &LogEntry) -> String {
    let mut json = Map::new();
    json.insert("timestamp".to_string(), Value::String(entry.timestamp.to_rfc3339()));
    json.insert("level".to_string(), Value::String(entry.level.to_string()));
    json.insert("target".to_string(), Value::String(entry.target.clone()));
    json.insert("message".to_string(), Value::String(entry.message.clone()));
    for (key, value) in &entry.fields {
        json.insert(key.clone(), value.clone());
    }

    serde_json::to_string(&json).unwrap_or_else(|_| "Failed to serialize log entry".to_string())
}

fn format_human(entry: &LogEntry) -> String {
    let timestamp = entry.timestamp.format("%Y-%m-%d %H:%M:%S%.3f");
    let mut message = format!("{} {:5} [{}] {}", timestamp, entry.level, entry.target, entry.message);

    for (key, value) in &entry.fields {
        message.push_str(&format!(" {}={}", key, plain(value)));
    }

    message
}

fn format_logfmt(entry: &LogEntry) -> String {
    let mut parts = vec![
        format!("timestamp={}", entry.timestamp.to_rfc3339()),
        format!("level={}", entry.level),
        format!("target={}", entry.target),
        format!("message=\"{}\"", entry.message.replace('"', "\\\"")),
    ];

    for (key, value) in &entry.fields {
        let value_str = match value {
            Value::Number(_) | Value::Bool(_) => plain(value),
            _ => format!("\"{}\"", plain(value).replace('"', "\\\"")),
        };
        parts.push(format!("{}={}", key, value_str));
    }

    parts.join(" ")
}

fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
