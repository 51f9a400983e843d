pub mod sheets;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::Serialize;
use serde_json::{Value, json};

use crate::channel::ChannelKind;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Column headers of the audit sheet, in the order they are first written.
pub const COLUMNS: [&str; 8] = [
    "Timestamp",
    "Method",
    "Sender",
    "Receiver",
    "Department",
    "Duration (s)",
    "Message Content",
    "Status",
];

/// One row of the audit log, describing a single delivery attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditRecord {
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: NaiveDateTime,
    pub method: ChannelKind,
    pub sender: String,
    pub receiver: String,
    pub department: String,
    pub duration_secs: f64,
    pub message: String,
    pub status: String,
}

impl AuditRecord {
    /// Cell value for a column header, or `None` for a header this record
    /// does not know about.
    pub fn cell(&self, column: &str) -> Option<Value> {
        let value = match column {
            "Timestamp" => json!(self.timestamp.format(TIMESTAMP_FORMAT).to_string()),
            "Method" => json!(self.method.as_str()),
            "Sender" => json!(self.sender),
            "Receiver" => json!(self.receiver),
            "Department" => json!(self.department),
            "Duration (s)" => json!(self.duration_secs),
            "Message Content" => json!(flatten_newlines(&self.message)),
            "Status" => json!(self.status),
            _ => return None,
        };
        Some(value)
    }

    pub fn row(&self) -> Vec<Value> {
        COLUMNS
            .iter()
            .map(|column| self.cell(column).unwrap_or(Value::Null))
            .collect()
    }
}

pub fn flatten_newlines(text: &str) -> String {
    text.replace(['\n', '\r'], " ")
}

fn serialize_timestamp<S>(ts: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&ts.format(TIMESTAMP_FORMAT).to_string())
}

#[derive(Debug)]
pub enum LogWriteError {
    /// Missing sheet id, missing or malformed credentials.
    Misconfigured(String),
    /// Token exchange or Sheets API call did not complete.
    Unreachable(String),
    /// The store answered with an error.
    Rejected { status: u16, body: String },
}

impl std::fmt::Display for LogWriteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogWriteError::Misconfigured(msg) => write!(f, "audit log misconfigured: {msg}"),
            LogWriteError::Unreachable(msg) => write!(f, "audit log unreachable: {msg}"),
            LogWriteError::Rejected { status, body } => {
                write!(f, "audit log rejected write (HTTP {status}): {body}")
            }
        }
    }
}

impl std::error::Error for LogWriteError {}

/// Destination for audit records.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Verify the sink is usable. Called once before a run sends anything.
    async fn check(&self) -> Result<(), LogWriteError>;

    async fn append(&self, record: &AuditRecord) -> Result<(), LogWriteError>;
}
