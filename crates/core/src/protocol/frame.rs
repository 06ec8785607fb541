//! Outbound frames written to the reply channel

use crate::error::ErrorKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamTag {
    Stdout,
    Stderr,
}

/// Tool and JVM environment a query ran against
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnvironmentInfo {
    pub tool_home: Option<PathBuf>,
    pub tool_version: Option<String>,
    pub jvm_home: Option<PathBuf>,
    pub jvm_args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Frame {
    Progress {
        message: String,
    },
    Output {
        stream: StreamTag,
        #[serde(with = "super::base64_bytes")]
        data: Vec<u8>,
    },
    Environment {
        environment: EnvironmentInfo,
    },
    Result {
        payload: Value,
    },
    Cancelled {
        message: String,
        project_root: PathBuf,
    },
    Error {
        kind: ErrorKind,
        message: String,
    },
}

impl Frame {
    /// Result, Cancelled and Error end an operation's stream
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Frame::Result { .. } | Frame::Cancelled { .. } | Frame::Error { .. }
        )
    }
}

/// A frame tagged with the request it belongs to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub request_id: String,
    #[serde(flatten)]
    pub frame: Frame,
}
