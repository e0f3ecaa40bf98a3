use elt_core::model::{ConfiguredCatalog, Stream};
use serde::{Deserialize, Serialize};

/// Log severity carried on a LOG message (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Fatal,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogPayload {
    pub level: LogLevel,
    pub message: String,
}

/// One extracted row (§4.1 "RECORD").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordPayload {
    pub stream: String,
    pub data: serde_json::Map<String, serde_json::Value>,
    pub emitted_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Which flavor of checkpoint a STATE message carries (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StateScope {
    Stream,
    Global,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamStateDescriptor {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamStatePayload {
    pub descriptor: StreamStateDescriptor,
    pub state: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalStatePayload {
    pub shared_state: serde_json::Value,
}

/// A resumable checkpoint (§4.1 "STATE"). The last STATE message before EOF
/// is authoritative for that run (§4.1, §4.4 step 10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatePayload {
    #[serde(rename = "type")]
    pub scope: StateScope,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<StreamStatePayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global: Option<GlobalStatePayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// `{status, message?}` reply to a connection check (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConnectionCheckStatus {
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionStatusPayload {
    pub status: ConnectionCheckStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Structured failure (§4.1 "TRACE/ERROR").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TracePayload {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub internal_message: Option<String>,
    pub failure_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecPayload {
    pub connection_specification: serde_json::Value,
    #[serde(default)]
    pub supports_incremental: bool,
    #[serde(default)]
    pub supported_destination_sync_modes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogPayload {
    pub streams: Vec<Stream>,
}

/// Reserved control-channel payload (§4.1 "CONTROL"); the protocol makes no
/// promises about its shape yet, so it round-trips as an opaque JSON value.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ControlPayload {
    #[serde(flatten)]
    pub data: serde_json::Value,
}

/// One self-describing connector message (§4.1). The `type` tag selects the
/// payload; unknown/future variants are never constructed by this crate but
/// `#[serde(tag = "type")]` keeps parsing strict so a genuinely malformed
/// line is rejected rather than silently coerced.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    #[serde(rename = "RECORD")]
    Record(RecordPayload),
    #[serde(rename = "STATE")]
    State(StatePayload),
    #[serde(rename = "LOG")]
    Log(LogPayload),
    #[serde(rename = "SPEC")]
    Spec(SpecPayload),
    #[serde(rename = "CATALOG")]
    Catalog(CatalogPayload),
    #[serde(rename = "CONNECTION_STATUS")]
    ConnectionStatus(ConnectionStatusPayload),
    #[serde(rename = "TRACE")]
    Trace(TracePayload),
    #[serde(rename = "ERROR")]
    Error(TracePayload),
    #[serde(rename = "CONTROL")]
    Control(ControlPayload),
}

impl Message {
    pub fn as_record(&self) -> Option<&RecordPayload> {
        match self {
            Message::Record(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_state(&self) -> Option<&StatePayload> {
        match self {
            Message::State(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_terminal_error(&self) -> bool {
        matches!(self, Message::Trace(_) | Message::Error(_))
            || matches!(self, Message::Log(l) if l.level == LogLevel::Fatal)
    }
}
