//! Log records and the sinks that receive them.
//!
//! Bridges never write output directly. They build a [`LogRecord`] and hand
//! it to a [`LogSink`]; [`TracingSink`] forwards records to `tracing` and
//! [`MemorySink`] keeps them for inspection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use spellbridge_runtime::{Attributes, DynamicValue};
use std::sync::{Mutex, PoisonError};

/// Severity of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    /// Marker prepended to structured messages.
    pub fn emoji(&self) -> &'static str {
        match self {
            LogLevel::Debug => "🐛",
            LogLevel::Info => "ℹ️",
            LogLevel::Warn => "⚠️",
            LogLevel::Error => "❌",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rendering of a record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(LogFormat::Text),
            "json" => Some(LogFormat::Json),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogFormat::Text => "text",
            LogFormat::Json => "json",
        }
    }
}

/// A single log entry produced by a bridge.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    /// Id of the bridge that produced the record.
    pub source: String,
    pub component: Option<String>,
    pub message: String,
    pub attributes: Attributes,
    pub format: LogFormat,
}

impl LogRecord {
    pub fn new(source: impl Into<String>, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            source: source.into(),
            component: None,
            message: message.into(),
            attributes: Attributes::new(),
            format: LogFormat::Text,
        }
    }

    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Render the record as one line in its format.
    pub fn render(&self) -> String {
        match self.format {
            LogFormat::Text => self.render_text(),
            LogFormat::Json => self.render_json(),
        }
    }

    fn render_text(&self) -> String {
        let mut line = format!(
            "{} {:<5}",
            self.timestamp.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            self.level.as_str().to_uppercase()
        );
        if let Some(component) = &self.component {
            line.push_str(&format!(" [{component}]"));
        }
        line.push(' ');
        line.push_str(&self.message);

        let mut keys: Vec<&String> = self.attributes.keys().collect();
        keys.sort();
        for key in keys {
            line.push_str(&format!(" {key}={}", self.attributes[key]));
        }
        line
    }

    fn render_json(&self) -> String {
        let mut object = serde_json::Map::new();
        object.insert("time".into(), self.timestamp.to_rfc3339().into());
        object.insert("level".into(), self.level.as_str().into());
        object.insert("source".into(), self.source.clone().into());
        if let Some(component) = &self.component {
            object.insert("component".into(), component.clone().into());
        }
        object.insert("msg".into(), self.message.clone().into());
        for (key, value) in &self.attributes {
            object.insert(key.clone(), json_or_label(value));
        }
        serde_json::Value::Object(object).to_string()
    }
}

/// JSON form of a value; custom handles and non-finite numbers become their
/// display label.
fn json_or_label(value: &DynamicValue) -> serde_json::Value {
    value
        .to_json()
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()))
}

/// Destination for log records.
pub trait LogSink: Send + Sync {
    fn emit(&self, record: &LogRecord);
}

/// Sink that forwards records to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn emit(&self, record: &LogRecord) {
        let line = record.render();
        match record.level {
            LogLevel::Debug => tracing::debug!(bridge = %record.source, "{}", line),
            LogLevel::Info => tracing::info!(bridge = %record.source, "{}", line),
            LogLevel::Warn => tracing::warn!(bridge = %record.source, "{}", line),
            LogLevel::Error => tracing::error!(bridge = %record.source, "{}", line),
        }
    }
}

/// Sink that keeps every record in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<LogRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Records produced by the bridge with id `source`.
    pub fn records_from(&self, source: &str) -> Vec<LogRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.source == source)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl LogSink for MemorySink {
    fn emit(&self, record: &LogRecord) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
    }
}
