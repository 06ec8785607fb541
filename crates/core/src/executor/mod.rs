//! Operation executor: validates requests and runs each one to a terminal frame

pub mod daemon;
pub mod lifecycle;
mod project;
pub mod run;

pub use daemon::{CommandRunner, DaemonCommand, DaemonInfo, ProcessRunner};
pub use lifecycle::Outcome;

use crate::{
    cancellation::CancellationRegistry,
    config::BridgeConfig,
    error::{Error, Result},
    launcher::{ConnectionFactory, Launcher, ProcessConnectionFactory},
    output::{OperationSink, ReplyChannel},
    protocol::{CallKind, CancelRequest, CancelResponse, Frame, Request},
    resolver::{FsModuleInspector, ModuleInspector},
    state::{BuildSummary, StateStore},
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Runs operations against the build tool on behalf of one client
pub struct Bridge {
    config: Arc<BridgeConfig>,
    launcher: Arc<Launcher>,
    registry: Arc<CancellationRegistry>,
    pool: Arc<Semaphore>,
    inspector: Arc<dyn ModuleInspector>,
    commands: Arc<dyn CommandRunner>,
    state: StateStore,
    builds: Mutex<HashMap<PathBuf, BuildSummary>>,
}

impl Bridge {
    /// Bridge that starts workers with `config.worker.command`
    pub fn from_config(config: BridgeConfig) -> Self {
        let factory = Arc::new(ProcessConnectionFactory::new(config.worker.clone()));
        Self::new(config, factory)
    }

    pub fn new(config: BridgeConfig, factory: Arc<dyn ConnectionFactory>) -> Self {
        let permits = config.executor.max_concurrent_operations.max(1);
        let state = StateStore::new(config.state.clone());
        Self {
            config: Arc::new(config),
            launcher: Arc::new(Launcher::new(factory)),
            registry: Arc::new(CancellationRegistry::new()),
            pool: Arc::new(Semaphore::new(permits)),
            inspector: Arc::new(FsModuleInspector),
            commands: Arc::new(ProcessRunner),
            state,
            builds: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_inspector(mut self, inspector: Arc<dyn ModuleInspector>) -> Self {
        self.inspector = inspector;
        self
    }

    pub fn with_command_runner(mut self, commands: Arc<dyn CommandRunner>) -> Self {
        self.commands = commands;
        self
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<CancellationRegistry> {
        &self.registry
    }

    pub fn launcher(&self) -> &Arc<Launcher> {
        &self.launcher
    }

    /// Run `request` on its own task once a pool permit is free.
    ///
    /// Every frame for the request, terminal frame included, goes to `channel`
    /// tagged with `request_id`.
    pub fn submit(
        self: &Arc<Self>,
        request_id: impl Into<String>,
        request: Request,
        channel: Arc<dyn ReplyChannel>,
    ) -> JoinHandle<()> {
        let bridge = Arc::clone(self);
        let request_id = request_id.into();
        tokio::spawn(async move {
            // Cancel requests never wait behind running operations
            let _permit = match request {
                Request::Cancel(_) | Request::CancelAll => None,
                _ => match bridge.pool.clone().acquire_owned().await {
                    Ok(permit) => Some(permit),
                    Err(_) => {
                        warn!(request_id = %request_id, "operation pool closed");
                        return;
                    }
                },
            };
            bridge.execute(request_id, request, channel).await;
        })
    }

    /// Run `request` to completion on the current task
    pub async fn execute(&self, request_id: String, request: Request, channel: Arc<dyn ReplyChannel>) {
        let sink = OperationSink::new(request_id, channel, self.config.output.flush_threshold);
        let frame = match self.dispatch(request, &sink).await {
            Ok(frame) => frame,
            Err(e) => {
                debug!(request_id = %sink.request_id(), "operation failed: {}", e);
                Frame::Error {
                    kind: e.kind(),
                    message: e.to_string(),
                }
            }
        };
        sink.finish(frame);
    }

    async fn dispatch(&self, request: Request, sink: &OperationSink) -> Result<Frame> {
        request.validate()?;

        let (operation, key, root) = match &request {
            Request::Cancel(cancel) => {
                let response = self.cancel(cancel);
                return Ok(Frame::Result {
                    payload: serde_json::to_value(response)?,
                });
            }
            Request::CancelAll => {
                let cancelled = self.cancel_all();
                return Ok(Frame::Result {
                    payload: serde_json::json!({ "cancelled": cancelled }),
                });
            }
            _ => {
                let operation = request
                    .operation_name()
                    .ok_or_else(|| Error::Other("request has no operation".to_string()))?;
                let key = request
                    .cancellation_key()
                    .ok_or_else(|| Error::Other("request has no cancellation key".to_string()))?;
                let root = request
                    .project_root()
                    .map(|root| root.to_path_buf())
                    .unwrap_or_default();
                (operation, key, root)
            }
        };

        // Registered before connecting so a concurrent cancel always finds the handle
        let registration = self.registry.register_scoped(operation.kind(), key);
        info!(operation = operation.as_str(), key = registration.key(), "operation started");
        let token = registration.token().clone();

        let outcome = self.handle(request, &token, sink).await?;
        drop(registration);

        Ok(match outcome {
            Outcome::Completed(payload) => Frame::Result { payload },
            Outcome::Cancelled(message) => Frame::Cancelled {
                message,
                project_root: root,
            },
        })
    }

    async fn handle(
        &self,
        request: Request,
        token: &CancellationToken,
        sink: &OperationSink,
    ) -> Result<Outcome> {
        match request {
            Request::QueryProject(request) => self.query_project(request, token, sink).await,
            Request::QueryDependencies(request) => {
                self.query_dependencies(request, token, sink).await
            }
            Request::RunBuild(request) => self.run(CallKind::RunBuild, request, token, sink).await,
            Request::RunTask(request) => self.run(CallKind::RunTask, request, token, sink).await,
            Request::DaemonStatus(request) => {
                let tool = self.config.effective_tool(&request.tool_config);
                let command =
                    DaemonCommand::new(&request.project_root, &tool, &self.config.tool, "--status");
                daemon::status(self.commands.as_ref(), command, token, sink).await
            }
            Request::StopDaemons(request) => {
                let tool = self.config.effective_tool(&request.tool_config);
                let status =
                    DaemonCommand::new(&request.project_root, &tool, &self.config.tool, "--status");
                let stop =
                    DaemonCommand::new(&request.project_root, &tool, &self.config.tool, "--stop");
                daemon::stop(self.commands.as_ref(), status, stop, token, sink).await
            }
            Request::Cancel(_) | Request::CancelAll => {
                Err(Error::Other("cancel requests are not operations".to_string()))
            }
        }
    }

    /// Signal the live operation matching `request`; a missing key is not an error
    pub fn cancel(&self, request: &CancelRequest) -> CancelResponse {
        let key = request.cancellation_key();
        let response = self.registry.cancel(request.target.kind(), &key);
        info!(key = %key, accepted = response.accepted, "cancel requested");
        response
    }

    pub fn cancel_all(&self) -> usize {
        let cancelled = self.registry.cancel_all();
        info!(cancelled, "cancelled all operations");
        cancelled
    }

    fn remember_build(&self, root: PathBuf, summary: BuildSummary) {
        self.builds.lock().insert(root, summary);
    }

    pub fn last_build(&self, root: &std::path::Path) -> Option<BuildSummary> {
        self.builds.lock().get(root).cloned()
    }

    /// Cancel everything, close every connection, then persist build state
    pub async fn shutdown(&self) -> Result<()> {
        let cancelled = self.registry.cancel_all();
        let disconnected = self.launcher.disconnect_all();
        info!(cancelled, disconnected, "bridge shutting down");

        if !self.config.state.persist {
            return Ok(());
        }
        let builds: Vec<(PathBuf, BuildSummary)> = self.builds.lock().drain().collect();
        let saved = self.state.save_all(builds).await?;
        debug!(saved, "build state persisted");
        Ok(())
    }
}
