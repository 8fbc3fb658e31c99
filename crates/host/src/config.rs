//! Configuration system for tfm
//!
//! Reads config from ~/.config/tfm/config.toml

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;
use tfm_vfs::mounts::default_mount_tables;
use tfm_vfs::{Backend, LocalFs, PluginCatalog, Registry, Vfs, VfsResult};

/// VFS configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VfsConfig {
    /// Backend for URLs without a `backend::` prefix
    pub default_backend: Option<String>,
    /// Plugin modules loaded at startup, in order
    pub plugins: Vec<String>,
    /// Mount tables consulted by the local backend's move planning
    pub mount_tables: Vec<PathBuf>,
}

impl Default for VfsConfig {
    fn default() -> Self {
        Self {
            default_backend: Some(LocalFs::NAME.to_string()),
            plugins: vec![LocalFs::NAME.to_string()],
            mount_tables: default_mount_tables(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `tracing` filter directive, overridden by `RUST_LOG`
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

/// Full application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub vfs: VfsConfig,
    pub log: LogConfig,
}

impl Config {
    /// Load configuration from the default path, falling back to defaults
    pub fn load() -> Self {
        let path = Self::default_config_path();
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from_path(&path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("  [warn] {e:#}");
                Self::default()
            }
        }
    }

    /// Get default config path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tfm")
            .join("config.toml")
    }

    /// Load from a specific path
    pub fn load_from_path(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Plugin catalog whose `local` entry uses the configured mount tables
    pub fn catalog(&self) -> PluginCatalog {
        let mut catalog = PluginCatalog::builtin();
        let tables = self.vfs.mount_tables.clone();
        catalog.add(
            LocalFs::NAME,
            Box::new(move || -> VfsResult<Box<dyn Backend>> {
                Ok(Box::new(LocalFs::with_mount_tables(tables.clone())))
            }),
        );
        catalog
    }

    /// Build the VFS and load every configured plugin
    pub async fn build_vfs(&self) -> anyhow::Result<Vfs> {
        let registry = Registry::new(self.catalog());
        for plugin in &self.vfs.plugins {
            registry
                .load(plugin)
                .await
                .with_context(|| format!("Failed to load plugin {plugin}"))?;
        }
        Ok(Vfs::new(registry).with_default_backend(self.vfs.default_backend.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.vfs.default_backend.as_deref(), Some("local"));
        assert_eq!(config.vfs.plugins, vec!["local"]);
        assert_eq!(config.log.level, "warn");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = Config::parse(
            r#"
[vfs]
plugins = ["local", "memory"]

[log]
level = "debug"
"#,
        )
        .unwrap();
        assert_eq!(config.vfs.plugins, vec!["local", "memory"]);
        assert_eq!(config.vfs.default_backend.as_deref(), Some("local"));
        assert_eq!(config.log.level, "debug");
    }

    #[test]
    fn test_bad_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[vfs\nplugins = 3").unwrap();
        let err = Config::load_from_path(&path).unwrap_err();
        assert!(format!("{err:#}").contains("config.toml"));
    }

    #[tokio::test]
    async fn test_build_vfs_loads_plugins() {
        let config = Config::parse("[vfs]\nplugins = [\"local\", \"memory\"]\n").unwrap();
        let vfs = config.build_vfs().await.unwrap();
        assert_eq!(vfs.registry().list().await, vec!["local", "memory"]);
        assert_eq!(vfs.default_backend(), Some("local"));

        let config = Config::parse("[vfs]\nplugins = [\"libftp.so\"]\n").unwrap();
        assert!(config.build_vfs().await.is_err());
    }
}
