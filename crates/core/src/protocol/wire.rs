//! Newline-delimited JSON protocol spoken with the tool-side worker process

use super::{EnvironmentInfo, StreamTag, ToolConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

pub const PROTOCOL_VERSION: u32 = 1;

/// Call kinds a worker may advertise in its handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CallKind {
    QueryProject,
    QueryDependencies,
    RunBuild,
    RunTask,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    pub kind: CallKind,
    pub project_root: PathBuf,
    pub tool_config: ToolConfig,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub color_output: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdin: Option<String>,
}

impl ToolCall {
    pub fn new(kind: CallKind, project_root: PathBuf, tool_config: ToolConfig) -> Self {
        Self {
            kind,
            project_root,
            tool_config,
            args: Vec::new(),
            env: BTreeMap::new(),
            color_output: false,
            stdin: None,
        }
    }
}

/// Bridge to worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum BridgeMessage {
    Hello { protocol_version: u32 },
    Call { id: u64, call: ToolCall },
    Cancel { id: u64 },
    Shutdown,
}

/// Worker to bridge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum WorkerMessage {
    Hello {
        protocol_version: u32,
        #[serde(default)]
        capabilities: Vec<CallKind>,
    },
    Progress {
        id: u64,
        message: String,
    },
    Output {
        id: u64,
        stream: StreamTag,
        #[serde(with = "super::base64_bytes")]
        data: Vec<u8>,
    },
    Environment {
        id: u64,
        environment: EnvironmentInfo,
    },
    Result {
        id: u64,
        #[serde(default)]
        payload: Value,
    },
    Cancelled {
        id: u64,
        #[serde(default)]
        message: String,
    },
    Failed {
        id: u64,
        message: String,
    },
}

/// One event of an in-flight call, already routed by call id
#[derive(Debug, Clone, PartialEq)]
pub enum ToolEvent {
    Progress(String),
    Output { stream: StreamTag, data: Vec<u8> },
    Environment(EnvironmentInfo),
    Result(Value),
    Cancelled(String),
    Failed(String),
}

impl WorkerMessage {
    /// Split a call-scoped message into its id and event; `None` for handshake messages
    pub fn into_event(self) -> Option<(u64, ToolEvent)> {
        match self {
            WorkerMessage::Hello { .. } => None,
            WorkerMessage::Progress { id, message } => Some((id, ToolEvent::Progress(message))),
            WorkerMessage::Output { id, stream, data } => {
                Some((id, ToolEvent::Output { stream, data }))
            }
            WorkerMessage::Environment { id, environment } => {
                Some((id, ToolEvent::Environment(environment)))
            }
            WorkerMessage::Result { id, payload } => Some((id, ToolEvent::Result(payload))),
            WorkerMessage::Cancelled { id, message } => Some((id, ToolEvent::Cancelled(message))),
            WorkerMessage::Failed { id, message } => Some((id, ToolEvent::Failed(message))),
        }
    }
}

impl ToolEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ToolEvent::Result(_) | ToolEvent::Cancelled(_) | ToolEvent::Failed(_)
        )
    }
}
