//! Repository configuration
//!
//! Loaded from a JSON file. Every field has a default, so a missing file or a
//! file that only sets a few fields still yields a usable configuration:
//!
//! ```json
//! {
//!   "defaultWorkspace": "live",
//!   "workspaces": [
//!     { "name": "live" },
//!     { "name": "user-admin", "base": "live" }
//!   ],
//!   "nodeTypes": {
//!     "page": { "properties": { "title": { "type": "string", "defaultValue": "New page" } } }
//!   },
//!   "context": { "showRemoved": false },
//!   "logging": { "filter": "nodetree_core=debug" }
//! }
//! ```

use crate::models::{NodeTypeDeclaration, LIVE_WORKSPACE};
use crate::services::error::{RepositoryError, Result};
use crate::services::ContextOptions;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Environment variable naming the configuration file
pub const CONFIG_ENV_VAR: &str = "NODETREE_CONFIG";

const DEFAULT_CONFIG_FILE: &str = "nodetree.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RepositoryConfig {
    /// Workspace used by `Repository::login_default`
    pub default_workspace: String,

    /// Workspaces in declaration order; a base must be declared before use
    pub workspaces: Vec<WorkspaceConfig>,

    pub node_types: BTreeMap<String, NodeTypeDeclaration>,

    /// Filter switches for new sessions
    pub context: ContextOptions,

    pub logging: LoggingConfig,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            default_workspace: LIVE_WORKSPACE.to_string(),
            workspaces: vec![WorkspaceConfig::new(LIVE_WORKSPACE)],
            node_types: BTreeMap::new(),
            context: ContextOptions::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
}

impl WorkspaceConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base: None,
        }
    }

    pub fn with_base(name: impl Into<String>, base: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base: Some(base.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `NODETREE_LOG` is not set
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl RepositoryConfig {
    /// Load the configuration at `path`; a missing file yields the defaults
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !fs::try_exists(path).await.unwrap_or(false) {
            debug!("No configuration at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).await.map_err(|e| {
            RepositoryError::configuration(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::from_json_str(&contents)?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load from `$NODETREE_CONFIG`, falling back to `nodetree.json`
    pub async fn load_default() -> Result<Self> {
        let path = std::env::var(CONFIG_ENV_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));
        Self::load(path).await
    }

    pub fn from_json_str(contents: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(contents).map_err(|e| {
            RepositoryError::configuration(format!("Failed to parse configuration: {}", e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check names, base workspace order and the default workspace
    pub fn validate(&self) -> Result<()> {
        let mut declared = HashSet::new();
        for workspace in &self.workspaces {
            if workspace.name.is_empty() {
                return Err(RepositoryError::configuration("workspace names must not be empty"));
            }
            if let Some(base) = &workspace.base {
                if !declared.contains(base.as_str()) {
                    return Err(RepositoryError::configuration(format!(
                        "workspace \"{}\" uses base \"{}\", which is not declared before it",
                        workspace.name, base
                    )));
                }
            }
            if !declared.insert(workspace.name.as_str()) {
                return Err(RepositoryError::configuration(format!(
                    "workspace \"{}\" is declared twice",
                    workspace.name
                )));
            }
        }

        if !declared.contains(self.default_workspace.as_str()) {
            return Err(RepositoryError::configuration(format!(
                "default workspace \"{}\" is not declared",
                self.default_workspace
            )));
        }
        if self.node_types.keys().any(String::is_empty) {
            return Err(RepositoryError::configuration("node type names must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = RepositoryConfig::load(dir.path().join("absent.json"))
            .await
            .unwrap();
        assert_eq!(config.default_workspace, "live");
        assert_eq!(config.workspaces, vec![WorkspaceConfig::new("live")]);
        assert_eq!(config.logging.filter, "info");
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nodetree.json");
        tokio::fs::write(
            &path,
            r#"{
                "workspaces": [{ "name": "live" }, { "name": "user-admin", "base": "live" }],
                "nodeTypes": { "page": { "superTypes": ["document"], "label": "Page" } },
                "context": { "showRemoved": true }
            }"#,
        )
        .await
        .unwrap();

        let config = RepositoryConfig::load(&path).await.unwrap();
        assert_eq!(config.workspaces[1], WorkspaceConfig::with_base("user-admin", "live"));
        assert_eq!(config.node_types["page"].super_types, vec!["document".to_string()]);
        assert!(config.context.show_removed);
        assert!(!config.context.show_invisible);
    }

    #[test]
    fn test_validation() {
        let unknown_base = r#"{ "workspaces": [{ "name": "draft", "base": "live" }, { "name": "live" }] }"#;
        assert!(matches!(
            RepositoryConfig::from_json_str(unknown_base),
            Err(RepositoryError::Configuration(_))
        ));

        let missing_default = r#"{ "defaultWorkspace": "draft" }"#;
        assert!(RepositoryConfig::from_json_str(missing_default).is_err());

        assert!(RepositoryConfig::from_json_str("not json").is_err());
        assert!(RepositoryConfig::default().validate().is_ok());
    }
}
