//! Build and task execution, including debug-mode rewriting

use super::{Bridge, lifecycle::{self, Outcome}};
use crate::{
    error::{Error, Result},
    output::OperationSink,
    protocol::{CallKind, DebugOptions, RunRequest, ToolCall, ToolConfig},
    state::BuildSummary,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub const DEBUG_ENV_VAR: &str = "JAVA_TOOL_OPTIONS";

/// Flags whose value is the following argument
const VALUE_FLAGS: &[&str] = &[
    "--tests",
    "-x",
    "--exclude-task",
    "-p",
    "--project-dir",
    "-b",
    "--build-file",
    "-c",
    "--settings-file",
    "-g",
    "--gradle-user-home",
    "-I",
    "--init-script",
    "-D",
    "--system-prop",
    "-P",
    "--project-prop",
    "--console",
    "--warning-mode",
    "--max-workers",
    "--priority",
    "--include-build",
    "--project-cache-dir",
];

/// Debugger agent options that make the build JVM attach to `port`
pub fn debug_agent_options(port: u16) -> String {
    format!("-agentlib:jdwp=transport=dt_socket,server=n,suspend=y,address=localhost:{port}")
}

/// `app:test` becomes `app:cleanTest`, `test` becomes `cleanTest`
pub fn clean_task_name(task: &str) -> String {
    let (prefix, name) = match task.rfind(':') {
        Some(index) => task.split_at(index + 1),
        None => ("", task),
    };
    let mut chars = name.chars();
    let capitalized = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
        None => String::new(),
    };
    format!("{prefix}clean{capitalized}")
}

/// Insert the clean task for the single task argument immediately before it.
///
/// Fails unless exactly one non-flag argument is present.
pub fn insert_clean_task(args: &[String]) -> Result<Vec<String>> {
    let mut positions = Vec::new();
    let mut skip_value = false;
    for (index, arg) in args.iter().enumerate() {
        if skip_value {
            skip_value = false;
            continue;
        }
        if arg.starts_with('-') {
            skip_value = !arg.contains('=') && VALUE_FLAGS.contains(&arg.as_str());
            continue;
        }
        positions.push(index);
    }

    let [index] = positions.as_slice() else {
        return Err(Error::validation(format!(
            "debug clean needs exactly one task argument, found {}",
            positions.len()
        )));
    };
    let mut rewritten = args.to_vec();
    rewritten.insert(*index, clean_task_name(&args[*index]));
    Ok(rewritten)
}

pub fn console_arg(color: bool) -> &'static str {
    if color { "--console=rich" } else { "--console=plain" }
}

/// Assemble the worker call for a run request
pub fn build_call(kind: CallKind, request: &RunRequest, tool: ToolConfig) -> Result<ToolCall> {
    let mut args = Vec::with_capacity(request.args.len() + 2);
    if kind == CallKind::RunTask {
        if let Some(task) = &request.task {
            args.push(task.clone());
        }
    }
    args.extend(request.args.iter().cloned());

    let mut env = request.env.clone();
    if let Some(DebugOptions {
        port,
        clean_output_cache,
    }) = &request.debug
    {
        if *clean_output_cache {
            args = insert_clean_task(&args)?;
        }
        env.insert(DEBUG_ENV_VAR.to_string(), debug_agent_options(*port));
    }
    if !args.iter().any(|arg| arg.starts_with("--console")) {
        args.push(console_arg(request.output_color_preference).to_string());
    }

    let mut call = ToolCall::new(kind, request.project_root.clone(), tool);
    call.args = args;
    call.env = env;
    call.color_output = request.output_color_preference;
    call.stdin = request.stdin.clone();
    Ok(call)
}

impl Bridge {
    pub(super) async fn run(
        &self,
        kind: CallKind,
        request: RunRequest,
        token: &CancellationToken,
        sink: &OperationSink,
    ) -> Result<Outcome> {
        let tool = self.config.effective_tool(&request.tool_config);
        let call = build_call(kind, &request, tool)?;
        debug!(args = ?call.args, "run call");

        let outcome = lifecycle::connect_and_call(&self.launcher, call, token, sink, false).await?;
        if let Outcome::Completed(_) = outcome {
            self.remember_build(
                request.project_root,
                BuildSummary::now(request.task, request.args),
            );
        }
        Ok(outcome)
    }
}
