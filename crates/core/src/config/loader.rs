//! Layered configuration loader
//!
//! Config files are collected from the project directory upward and merged so
//! that the file closest to the project wins, field by field.

use super::settings::{BridgeConfig, CONFIG_FILE_NAME};
use crate::error::{Error, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Environment variable naming the directory where the upward walk stops
pub const CONFIG_ROOT_ENV: &str = "GRADLE_BRIDGE_ROOT";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for the current directory
    pub fn load() -> Result<BridgeConfig> {
        match std::env::current_dir() {
            Ok(cwd) => Self::load_from_path(&cwd),
            Err(_) => Ok(BridgeConfig::default()),
        }
    }

    /// Load configuration that applies to `path`
    pub fn load_from_path(path: &Path) -> Result<BridgeConfig> {
        let boundary = std::env::var(CONFIG_ROOT_ENV)
            .ok()
            .map(PathBuf::from)
            .or_else(|| std::env::var("HOME").ok().map(PathBuf::from));
        Self::load_with_boundary(path, boundary.as_deref())
    }

    /// Walk from `path` up to `boundary` (inclusive) and merge what is found
    pub fn load_with_boundary(path: &Path, boundary: Option<&Path>) -> Result<BridgeConfig> {
        let mut check_path = if path.is_file() {
            path.parent().unwrap_or(path)
        } else {
            path
        };

        // Closest first
        let mut layers = Vec::new();
        loop {
            if let Some(layer) = Self::try_load_layer(check_path)? {
                tracing::debug!("Found config at: {:?}", check_path);
                layers.push(layer);
            }

            if boundary == Some(check_path) {
                break;
            }

            match check_path.parent() {
                Some(parent) => check_path = parent,
                None => break,
            }
        }

        if layers.is_empty() {
            tracing::debug!("No config files found, using defaults");
            return Ok(BridgeConfig::default());
        }

        tracing::debug!("Merging {} config layers", layers.len());
        let mut merged = Value::Object(Default::default());
        for layer in layers.into_iter().rev() {
            merge_values(&mut merged, layer);
        }

        let config: BridgeConfig = serde_json::from_value(merged)
            .map_err(|e| Error::ConfigError(format!("Failed to parse merged config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn try_load_layer(dir: &Path) -> Result<Option<Value>> {
        let path = dir.join(CONFIG_FILE_NAME);
        if !path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&path).map_err(|e| {
            tracing::error!("Failed to read config file {:?}: {}", path, e);
            Error::IoError(e)
        })?;
        let value: Value = serde_json::from_str(&contents).map_err(|e| {
            Error::ConfigError(format!("Failed to parse {}: {e}", path.display()))
        })?;
        if !value.is_object() {
            return Err(Error::ConfigError(format!(
                "{} must contain a JSON object",
                path.display()
            )));
        }
        Ok(Some(value))
    }
}

/// Deep-merge `overlay` into `base`; objects merge per key, everything else is replaced
fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
