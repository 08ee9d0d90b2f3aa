pub mod accumulator;
pub mod carrier;
pub mod classify;
pub mod line;
pub mod pair;
pub mod session;
pub mod stats;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub use session::{CancelToken, LineSource, MemoryLineSource, ParseSession, ReaderLineSource};

/// Which endpoint spoke. The log is written on the DU side, so "Sending"
/// lines go DU->RU and "Received" lines come back RU->DU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "DU->RU")]
    DuToRu,
    #[serde(rename = "RU->DU")]
    RuToDu,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::DuToRu => "DU->RU",
            Direction::RuToDu => "RU->DU",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    #[serde(rename = "rpc")]
    Rpc,
    #[serde(rename = "rpc-reply")]
    RpcReply,
    #[serde(rename = "notification")]
    Notification,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Rpc => "rpc",
            MessageType::RpcReply => "rpc-reply",
            MessageType::Notification => "notification",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorType {
    #[serde(rename = "rpc-error")]
    RpcError,
    #[serde(rename = "fault")]
    Fault,
    #[serde(rename = "warning")]
    Warning,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::RpcError => "rpc-error",
            ErrorType::Fault => "fault",
            ErrorType::Warning => "warning",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CarrierEventType {
    Create,
    Update,
    Delete,
    StateChange,
    Query,
    Data,
}

impl CarrierEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CarrierEventType::Create => "create",
            CarrierEventType::Update => "update",
            CarrierEventType::Delete => "delete",
            CarrierEventType::StateChange => "state-change",
            CarrierEventType::Query => "query",
            CarrierEventType::Data => "data",
        }
    }
}

/// One fully reassembled logical log entry. Lives only for the duration
/// of a single parse pass; the typed records below are what survives.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub line_number: u64,
    pub timestamp: Option<DateTime<Utc>>,
    pub session_id: u64,
    pub host: String,
    pub direction: Direction,
    pub raw_xml: String,
    pub truncated: bool,
}

/// One NETCONF message (rpc, rpc-reply or notification). Every logical
/// log entry yields exactly one of these, even when the payload is
/// malformed, so line numbers stay traceable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRecord {
    pub line_number: u64,
    pub timestamp: Option<DateTime<Utc>>,
    pub session_id: u64,
    pub host: String,
    pub message_id: Option<String>,
    pub message_type: MessageType,
    pub direction: Direction,
    pub operation: Option<String>,
    pub yang_module: Option<String>,
    /// Set on both sides of a matched pair; null while unmatched.
    pub response_time_ms: Option<f64>,
    /// Set on the request record only.
    pub has_response: bool,
    pub xml_content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub line_number: u64,
    pub timestamp: Option<DateTime<Utc>>,
    pub session_id: u64,
    pub error_type: ErrorType,
    pub error_tag: Option<String>,
    pub error_severity: Option<String>,
    pub error_message: Option<String>,
    pub fault_id: Option<String>,
    pub fault_source: Option<String>,
    pub is_cleared: bool,
    pub xml_content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarrierEvent {
    pub line_number: u64,
    pub timestamp: Option<DateTime<Utc>>,
    pub session_id: u64,
    pub event_type: CarrierEventType,
    /// Config container name, e.g. "rx-array-carriers".
    pub carrier_type: String,
    /// List-entry key (name/id leaf), "unknown" when absent.
    pub carrier_name: String,
    pub state: Option<String>,
    /// Set only when the state differs from the last one seen for this
    /// carrier_name within the same parse run.
    pub previous_state: Option<String>,
    pub operation: String,
    pub direction: Direction,
    pub message_type: MessageType,
    /// JSON object of the remaining scalar leaves of the entry.
    pub carrier_details: Option<String>,
    pub xml_content: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParseStatistics {
    pub total_lines: u64,
    pub total_messages: u64,
    pub rpc_count: u64,
    pub rpc_reply_count: u64,
    pub notification_count: u64,
    pub error_count: u64,
    pub fault_count: u64,
    pub paired_count: u64,
    pub operation_stats: HashMap<String, u64>,
    pub direction_stats: HashMap<String, u64>,
    pub error_type_stats: HashMap<String, u64>,
    pub avg_response_time_ms: Option<f64>,
    pub max_response_time_ms: Option<f64>,
    pub min_response_time_ms: Option<f64>,
}

/// Everything one parse run produces. Record vectors are ordered by
/// ascending line_number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseOutput {
    pub file_id: String,
    pub messages: Vec<RpcRecord>,
    pub errors: Vec<ErrorRecord>,
    pub carrier_events: Vec<CarrierEvent>,
    pub statistics: ParseStatistics,
    pub total_lines: u64,
    pub skipped_lines: u64,
    pub truncated_entries: u64,
}
