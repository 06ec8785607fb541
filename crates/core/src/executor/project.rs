//! Project and dependency queries

use super::{Bridge, lifecycle::{self, Outcome}};
use crate::{
    error::{Error, Result},
    output::OperationSink,
    protocol::{CallKind, ProjectRequest, ToolCall},
    resolver::{DependencyNode, RawProject, Resolver},
};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::info;

impl Bridge {
    /// Query the project model and resolve it before replying
    pub(super) async fn query_project(
        &self,
        request: ProjectRequest,
        token: &CancellationToken,
        sink: &OperationSink,
    ) -> Result<Outcome> {
        let tool = self.config.effective_tool(&request.tool_config);
        let call = ToolCall::new(CallKind::QueryProject, request.project_root.clone(), tool);
        let payload = match lifecycle::connect_and_call(&self.launcher, call, token, sink, true).await? {
            Outcome::Completed(payload) => payload,
            cancelled => return Ok(cancelled),
        };

        let raw: RawProject = serde_json::from_value(payload)
            .map_err(|e| Error::ProtocolError(format!("malformed project answer: {e}")))?;
        sink.progress("Resolving classpath");
        info!(root = %request.project_root.display(), targets = raw.targets.len(), "resolving project");

        let inspector = self.inspector.clone();
        let model = tokio::task::spawn_blocking(move || {
            Resolver::new(
                &request.project_root,
                request.workspace_root.as_deref(),
                inspector.as_ref(),
            )
            .resolve(raw)
        })
        .await
        .map_err(|e| Error::Other(format!("resolver task failed: {e}")))??;

        Ok(Outcome::Completed(serde_json::to_value(model)?))
    }

    /// Query only the dependency tree; no toolchain or module resolution
    pub(super) async fn query_dependencies(
        &self,
        request: ProjectRequest,
        token: &CancellationToken,
        sink: &OperationSink,
    ) -> Result<Outcome> {
        let tool = self.config.effective_tool(&request.tool_config);
        let call = ToolCall::new(CallKind::QueryDependencies, request.project_root, tool);
        let payload = match lifecycle::connect_and_call(&self.launcher, call, token, sink, true).await? {
            Outcome::Completed(payload) => payload,
            cancelled => return Ok(cancelled),
        };

        let dependencies = dependency_nodes(payload)?;
        Ok(Outcome::Completed(serde_json::json!({ "dependencies": dependencies })))
    }
}

/// Accepts either a bare node list or an object with a `dependencies` list
fn dependency_nodes(payload: Value) -> Result<Vec<DependencyNode>> {
    let list = match payload {
        Value::Object(mut object) => object.remove("dependencies").unwrap_or(Value::Array(Vec::new())),
        other => other,
    };
    serde_json::from_value(list)
        .map_err(|e| Error::ProtocolError(format!("malformed dependency answer: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dependency_payload_shapes() {
        let nested = json!({
            "dependencies": [
                {"name": "com.google.guava:guava", "version": "33.0", "children": [
                    {"name": "com.google.guava:failureaccess", "version": "1.0.2"}
                ]}
            ]
        });
        let nodes = dependency_nodes(nested).unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].count(), 2);

        let bare = json!([{"name": "junit:junit"}]);
        assert_eq!(dependency_nodes(bare).unwrap()[0].name, "junit:junit");

        assert!(matches!(
            dependency_nodes(json!("nope")),
            Err(Error::ProtocolError(_))
        ));
    }
}
