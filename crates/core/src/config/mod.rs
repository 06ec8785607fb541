//! Configuration management for gradle-bridge

pub mod loader;
mod settings;

// Re-export main types
pub use loader::{CONFIG_ROOT_ENV, ConfigLoader};
pub use settings::{
    BridgeConfig, CONFIG_FILE_NAME, ExecutorConfig, OutputConfig, StateConfig, ToolDefaults,
    WorkerConfig,
};
