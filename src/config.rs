//! Client configuration

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::aggregate::RiskScoping;
use crate::error::{DashboardError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    /// Base URL of the RiskWrapped API
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Records requested per page when listing a collection
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Where the org hierarchy comes from
    #[serde(default)]
    pub hierarchy: HierarchySource,

    /// Whether risks are filtered to the selected scope client-side
    #[serde(default)]
    pub risk_scoping: RiskScoping,

    /// File the bearer token is persisted to (in-memory only when unset)
    #[serde(default)]
    pub token_file: Option<PathBuf>,
}

/// Source of the organization hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum HierarchySource {
    /// Built-in fixed tree
    Static,
    /// Endpoint returning one nested `{id, name, children}` tree
    Nested {
        #[serde(default = "default_tree_path")]
        path: String,
    },
    /// Paged endpoint returning `[{id, name, parent_id}]`
    Flat {
        #[serde(default = "default_nodes_path")]
        path: String,
        #[serde(default = "default_page_size")]
        page_size: u32,
    },
}

impl Default for HierarchySource {
    fn default() -> Self {
        HierarchySource::Flat {
            path: default_nodes_path(),
            page_size: default_page_size(),
        }
    }
}

// Defaults
fn default_api_url() -> String { "http://localhost:8000".to_string() }
fn default_timeout_secs() -> u64 { 30 }
fn default_tree_path() -> String { "/nodes/tree".to_string() }
fn default_nodes_path() -> String { "/nodes".to_string() }
fn default_page_size() -> u32 { 100 }

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            timeout_secs: default_timeout_secs(),
            page_size: default_page_size(),
            hierarchy: HierarchySource::default(),
            risk_scoping: RiskScoping::default(),
            token_file: None,
        }
    }
}

impl DashboardConfig {
    /// Load from a TOML file, falling back to defaults when it does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| DashboardError::Config(format!("{}: {}", path.display(), e)))?;
        let config = Self::from_toml(&content)?;
        info!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| DashboardError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.api_url.starts_with("http://") || self.api_url.starts_with("https://")) {
            return Err(DashboardError::Config(format!(
                "api_url must be an http(s) URL, got {:?}",
                self.api_url
            )));
        }
        if self.timeout_secs == 0 {
            return Err(DashboardError::Config("timeout_secs must be positive".into()));
        }
        if self.page_size == 0 {
            return Err(DashboardError::Config("page_size must be positive".into()));
        }
        match &self.hierarchy {
            HierarchySource::Flat { page_size: 0, .. } => Err(DashboardError::Config(
                "hierarchy.page_size must be positive".into(),
            )),
            HierarchySource::Flat { path, .. } | HierarchySource::Nested { path }
                if !path.starts_with('/') =>
            {
                Err(DashboardError::Config(format!(
                    "hierarchy.path must start with '/', got {:?}",
                    path
                )))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = DashboardConfig::from_toml("").unwrap();
        assert_eq!(config.api_url, "http://localhost:8000");
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.page_size, 100);
        assert_eq!(
            config.hierarchy,
            HierarchySource::Flat {
                path: "/nodes".into(),
                page_size: 100
            }
        );
        assert_eq!(config.risk_scoping, RiskScoping::Unscoped);
        assert!(config.token_file.is_none());
    }

    #[test]
    fn test_full_document() {
        let config = DashboardConfig::from_toml(
            r#"
api_url = "https://risk.example.com"
timeout_secs = 5
risk_scoping = "client_side"
token_file = "/tmp/riskwrapped/token"

[hierarchy]
source = "nested"
"#,
        )
        .unwrap();

        assert_eq!(config.api_url, "https://risk.example.com");
        assert_eq!(config.timeout_secs, 5);
        assert_eq!(config.risk_scoping, RiskScoping::ClientSide);
        assert_eq!(
            config.hierarchy,
            HierarchySource::Nested {
                path: "/nodes/tree".into()
            }
        );
        assert_eq!(
            config.token_file.as_deref(),
            Some(Path::new("/tmp/riskwrapped/token"))
        );
    }

    #[test]
    fn test_static_hierarchy() {
        let config = DashboardConfig::from_toml("[hierarchy]\nsource = \"static\"\n").unwrap();
        assert_eq!(config.hierarchy, HierarchySource::Static);
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(matches!(
            DashboardConfig::from_toml("api_url = \"localhost:8000\""),
            Err(DashboardError::Config(_))
        ));
        assert!(matches!(
            DashboardConfig::from_toml("timeout_secs = 0"),
            Err(DashboardError::Config(_))
        ));
        assert!(matches!(
            DashboardConfig::from_toml("page_size = 0"),
            Err(DashboardError::Config(_))
        ));
        assert!(matches!(
            DashboardConfig::from_toml("[hierarchy]\nsource = \"flat\"\npage_size = 0\n"),
            Err(DashboardError::Config(_))
        ));
        assert!(matches!(
            DashboardConfig::from_toml("[hierarchy]\nsource = \"nested\"\npath = \"tree\"\n"),
            Err(DashboardError::Config(_))
        ));
        assert!(matches!(
            DashboardConfig::from_toml("[hierarchy]\nsource = \"ldap\"\n"),
            Err(DashboardError::Config(_))
        ));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = DashboardConfig::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.timeout_secs, 30);
    }
}
