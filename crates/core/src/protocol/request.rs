//! Inbound operation requests

use crate::{
    cancellation::OperationKind,
    error::{Error, Result},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

fn default_true() -> bool {
    true
}

/// Per-request tool settings; unset fields fall back to the configured defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_home: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default = "default_true")]
    pub wrapper_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jvm_args: Option<Vec<String>>,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            user_home: None,
            version: None,
            wrapper_enabled: true,
            jvm_args: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugOptions {
    pub port: u16,
    #[serde(default)]
    pub clean_output_cache: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRequest {
    pub project_root: PathBuf,
    #[serde(default)]
    pub tool_config: ToolConfig,
    /// Workspace containing the project; foreign source folders are linked relative to it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub project_root: PathBuf,
    #[serde(default)]
    pub tool_config: ToolConfig,
    /// Task to run; required for `runTask`, ignored for `runBuild`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub output_color_preference: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<DebugOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdin: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaemonRequest {
    pub project_root: PathBuf,
    #[serde(default)]
    pub tool_config: ToolConfig,
}

/// Names the operation a cancel request targets, plus the fields its key is built from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    /// Operation being cancelled
    pub target: OperationName,
    pub project_root: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelResponse {
    pub accepted: bool,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationName {
    QueryProject,
    QueryDependencies,
    RunBuild,
    RunTask,
    DaemonStatus,
    StopDaemons,
}

impl OperationName {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationName::QueryProject => "queryProject",
            OperationName::QueryDependencies => "queryDependencies",
            OperationName::RunBuild => "runBuild",
            OperationName::RunTask => "runTask",
            OperationName::DaemonStatus => "daemonStatus",
            OperationName::StopDaemons => "stopDaemons",
        }
    }

    /// Read-only queries go to the GET partition, everything that changes state to RUN
    pub fn kind(&self) -> OperationKind {
        match self {
            OperationName::QueryProject
            | OperationName::QueryDependencies
            | OperationName::DaemonStatus => OperationKind::Get,
            OperationName::RunBuild | OperationName::RunTask | OperationName::StopDaemons => {
                OperationKind::Run
            }
        }
    }
}

/// Build the cancellation key for an operation.
///
/// GET keys are the root plus the query name. RUN keys append the task and
/// arguments so two different builds of the same root never share a key.
pub fn cancellation_key(
    operation: OperationName,
    project_root: &Path,
    task: Option<&str>,
    args: &[String],
) -> String {
    let root = project_root.display();
    match operation {
        OperationName::RunBuild | OperationName::RunTask => {
            let mut parts: Vec<&str> = Vec::with_capacity(args.len() + 1);
            if operation == OperationName::RunTask {
                if let Some(task) = task {
                    parts.push(task);
                }
            }
            parts.extend(args.iter().map(String::as_str));
            format!("{root}::{}::{}", operation.as_str(), parts.join(" "))
        }
        _ => format!("{root}::{}", operation.as_str()),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "camelCase")]
pub enum Request {
    QueryProject(ProjectRequest),
    QueryDependencies(ProjectRequest),
    RunBuild(RunRequest),
    RunTask(RunRequest),
    DaemonStatus(DaemonRequest),
    StopDaemons(DaemonRequest),
    Cancel(CancelRequest),
    CancelAll,
}

impl Request {
    pub fn operation_name(&self) -> Option<OperationName> {
        match self {
            Request::QueryProject(_) => Some(OperationName::QueryProject),
            Request::QueryDependencies(_) => Some(OperationName::QueryDependencies),
            Request::RunBuild(_) => Some(OperationName::RunBuild),
            Request::RunTask(_) => Some(OperationName::RunTask),
            Request::DaemonStatus(_) => Some(OperationName::DaemonStatus),
            Request::StopDaemons(_) => Some(OperationName::StopDaemons),
            Request::Cancel(_) | Request::CancelAll => None,
        }
    }

    pub fn project_root(&self) -> Option<&Path> {
        match self {
            Request::QueryProject(r) | Request::QueryDependencies(r) => Some(&r.project_root),
            Request::RunBuild(r) | Request::RunTask(r) => Some(&r.project_root),
            Request::DaemonStatus(r) | Request::StopDaemons(r) => Some(&r.project_root),
            Request::Cancel(r) => Some(&r.project_root),
            Request::CancelAll => None,
        }
    }

    /// Cancellation key of the operation this request starts
    pub fn cancellation_key(&self) -> Option<String> {
        let operation = self.operation_name()?;
        let root = self.project_root()?;
        let key = match self {
            Request::RunBuild(r) | Request::RunTask(r) => {
                cancellation_key(operation, root, r.task.as_deref(), &r.args)
            }
            _ => cancellation_key(operation, root, None, &[]),
        };
        Some(key)
    }

    /// Shape checks done before any connection is attempted
    pub fn validate(&self) -> Result<()> {
        match self {
            Request::CancelAll => Ok(()),
            Request::Cancel(_) => Ok(()),
            _ => {
                let root = self
                    .project_root()
                    .ok_or_else(|| Error::validation("projectRoot is required"))?;
                validate_project_root(root)?;
                if let Request::RunTask(run) = self {
                    match run.task.as_deref() {
                        Some(task) if !task.trim().is_empty() => {}
                        _ => return Err(Error::validation("runTask requires a task name")),
                    }
                }
                if let Request::RunBuild(run) | Request::RunTask(run) = self {
                    if let Some(debug) = &run.debug {
                        if debug.port == 0 {
                            return Err(Error::validation("debug.port must be non-zero"));
                        }
                    }
                }
                Ok(())
            }
        }
    }
}

impl CancelRequest {
    pub fn cancellation_key(&self) -> String {
        cancellation_key(
            self.target,
            &self.project_root,
            self.task.as_deref(),
            &self.args,
        )
    }
}

fn validate_project_root(root: &Path) -> Result<()> {
    if root.as_os_str().is_empty() {
        return Err(Error::validation("projectRoot is required"));
    }
    if !root.is_dir() {
        return Err(Error::validation(format!(
            "project root does not exist: {}",
            root.display()
        )));
    }
    Ok(())
}

/// A request line read from the transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundRequest {
    pub request_id: String,
    #[serde(flatten)]
    pub request: Request,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_run_task_request() {
        let json = r#"{
            "requestId": "7",
            "operation": "runTask",
            "projectRoot": "/work/app",
            "task": "app:test",
            "args": ["--tests", "FooTest"],
            "debug": { "port": 5005, "cleanOutputCache": true }
        }"#;
        let inbound: InboundRequest = serde_json::from_str(json).unwrap();
        assert_eq!(inbound.request_id, "7");
        let Request::RunTask(run) = inbound.request else {
            panic!("expected runTask");
        };
        assert_eq!(run.task.as_deref(), Some("app:test"));
        assert!(run.tool_config.wrapper_enabled);
        assert_eq!(
            run.debug,
            Some(DebugOptions {
                port: 5005,
                clean_output_cache: true
            })
        );
    }

    #[test]
    fn test_parse_cancel_all() {
        let inbound: InboundRequest =
            serde_json::from_str(r#"{ "requestId": "9", "operation": "cancelAll" }"#).unwrap();
        assert_eq!(inbound.request, Request::CancelAll);
    }

    #[test]
    fn test_parse_cancel_request() {
        let json = r#"{
            "requestId": "c1",
            "operation": "cancel",
            "target": "runTask",
            "projectRoot": "/ws/app",
            "task": "build"
        }"#;
        let inbound: InboundRequest = serde_json::from_str(json).unwrap();
        let Request::Cancel(cancel) = inbound.request else {
            panic!("expected cancel");
        };
        assert_eq!(cancel.target, OperationName::RunTask);
        assert_eq!(cancel.cancellation_key(), "/ws/app::runTask::build");
    }

    #[test]
    fn test_keys_are_partition_and_discriminator_specific() {
        let root = Path::new("/work/app");
        let args = vec!["--info".to_string()];
        let build = cancellation_key(OperationName::RunBuild, root, None, &args);
        let task = cancellation_key(OperationName::RunTask, root, Some("test"), &args);
        let query = cancellation_key(OperationName::QueryProject, root, None, &[]);

        assert_eq!(build, "/work/app::runBuild::--info");
        assert_eq!(task, "/work/app::runTask::test --info");
        assert_eq!(query, "/work/app::queryProject");
    }

    #[test]
    fn test_cancel_request_key_matches_operation_key() {
        let temp_dir = TempDir::new().unwrap();
        let run = RunRequest {
            project_root: temp_dir.path().to_path_buf(),
            tool_config: ToolConfig::default(),
            task: Some("app:run".to_string()),
            args: vec!["--offline".to_string()],
            output_color_preference: false,
            debug: None,
            stdin: None,
            env: BTreeMap::new(),
        };
        let cancel = CancelRequest {
            target: OperationName::RunTask,
            project_root: temp_dir.path().to_path_buf(),
            task: Some("app:run".to_string()),
            args: vec!["--offline".to_string()],
        };
        assert_eq!(
            Request::RunTask(run).cancellation_key(),
            Some(cancel.cancellation_key())
        );
    }

    #[test]
    fn test_validation_rejects_missing_root() {
        let request = Request::QueryProject(ProjectRequest {
            project_root: PathBuf::from("/definitely/not/here"),
            tool_config: ToolConfig::default(),
            workspace_root: None,
        });
        assert!(matches!(request.validate(), Err(Error::ValidationError(_))));
    }

    #[test]
    fn test_validation_requires_task_name() {
        let temp_dir = TempDir::new().unwrap();
        let request = Request::RunTask(RunRequest {
            project_root: temp_dir.path().to_path_buf(),
            tool_config: ToolConfig::default(),
            task: Some("  ".to_string()),
            args: vec![],
            output_color_preference: false,
            debug: None,
            stdin: None,
            env: BTreeMap::new(),
        });
        assert!(matches!(request.validate(), Err(Error::ValidationError(_))));
    }
}
