//! Message shapes exchanged with the IDE client and with the tool worker

pub mod frame;
pub mod request;
pub mod wire;

pub use frame::{EnvironmentInfo, Envelope, Frame, StreamTag};
pub use request::{
    CancelRequest, CancelResponse, DaemonRequest, DebugOptions, InboundRequest, OperationName,
    ProjectRequest, Request, RunRequest, ToolConfig, cancellation_key,
};
pub use wire::{BridgeMessage, CallKind, PROTOCOL_VERSION, ToolCall, ToolEvent, WorkerMessage};

/// Serde adapter that carries raw bytes as base64 text
pub(crate) mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(text).map_err(serde::de::Error::custom)
    }
}
