use crate::{
    error::{Error, Result},
    protocol::ToolConfig,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

pub const CONFIG_FILE_NAME: &str = ".gradle-bridge.json";
pub const DEFAULT_FLUSH_THRESHOLD: usize = 1024;
pub const DEFAULT_MAX_CONCURRENT_OPERATIONS: usize = 16;
pub const DEFAULT_MAX_SAVE_WORKERS: usize = 50;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeConfig {
    pub worker: WorkerConfig,
    pub tool: ToolDefaults,
    pub output: OutputConfig,
    pub executor: ExecutorConfig,
    pub state: StateConfig,
}

/// How to start the tool-side worker process
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkerConfig {
    pub command: Vec<String>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolDefaults {
    /// Executable used when the wrapper is disabled or absent
    pub executable: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_home: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub wrapper_enabled: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub jvm_args: Vec<String>,
}

impl Default for ToolDefaults {
    fn default() -> Self {
        Self {
            executable: "gradle".to_string(),
            user_home: None,
            version: None,
            wrapper_enabled: true,
            jvm_args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OutputConfig {
    pub flush_threshold: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecutorConfig {
    pub max_concurrent_operations: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_operations: DEFAULT_MAX_CONCURRENT_OPERATIONS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StateConfig {
    pub persist: bool,
    pub compress: bool,
    pub max_save_workers: usize,
    pub file_name: String,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            persist: true,
            compress: true,
            max_save_workers: DEFAULT_MAX_SAVE_WORKERS,
            file_name: "build-state.bin".to_string(),
        }
    }
}

impl BridgeConfig {
    /// Reject values the executor cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.output.flush_threshold == 0 {
            return Err(Error::ConfigError(
                "output.flushThreshold must be greater than zero".to_string(),
            ));
        }
        if self.executor.max_concurrent_operations == 0 {
            return Err(Error::ConfigError(
                "executor.maxConcurrentOperations must be greater than zero".to_string(),
            ));
        }
        if self.state.max_save_workers == 0 {
            return Err(Error::ConfigError(
                "state.maxSaveWorkers must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Tool settings for one request: request fields win over configured defaults
    pub fn effective_tool(&self, request: &ToolConfig) -> ToolConfig {
        let jvm_args = match &request.jvm_args {
            Some(args) => Some(args.clone()),
            None if !self.tool.jvm_args.is_empty() => Some(self.tool.jvm_args.clone()),
            None => None,
        };

        ToolConfig {
            user_home: request.user_home.clone().or_else(|| self.tool.user_home.clone()),
            version: request.version.clone().or_else(|| self.tool.version.clone()),
            wrapper_enabled: request.wrapper_enabled,
            jvm_args,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_object() {
        let config: BridgeConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.output.flush_threshold, 1024);
        assert_eq!(config.executor.max_concurrent_operations, 16);
        assert_eq!(config.state.max_save_workers, 50);
        assert!(config.tool.wrapper_enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_camel_case_fields() {
        let json = r#"{
            "worker": { "command": ["java", "-jar", "worker.jar"] },
            "output": { "flushThreshold": 64 },
            "tool": { "userHome": "/home/dev/.gradle", "jvmArgs": ["-Xmx2g"] }
        }"#;
        let config: BridgeConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.worker.command, vec!["java", "-jar", "worker.jar"]);
        assert_eq!(config.output.flush_threshold, 64);
        assert_eq!(
            config.tool.user_home,
            Some(PathBuf::from("/home/dev/.gradle"))
        );
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let mut config = BridgeConfig::default();
        config.output.flush_threshold = 0;
        assert!(matches!(config.validate(), Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_effective_tool_prefers_request() {
        let mut config = BridgeConfig::default();
        config.tool.version = Some("8.5".to_string());
        config.tool.jvm_args = vec!["-Xmx1g".to_string()];

        let request = ToolConfig {
            user_home: None,
            version: Some("8.7".to_string()),
            wrapper_enabled: false,
            jvm_args: None,
        };
        let tool = config.effective_tool(&request);
        assert_eq!(tool.version.as_deref(), Some("8.7"));
        assert_eq!(tool.jvm_args, Some(vec!["-Xmx1g".to_string()]));
        assert!(!tool.wrapper_enabled);
    }
}
