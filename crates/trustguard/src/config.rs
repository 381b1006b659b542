use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use trustguard_audit::DriftWindows;
use trustguard_fusion::FusionConfig;
use trustguard_pipeline::PipelineConfig;
use trustguard_policy::PolicyConfig;

use crate::error::{RootError, RootResult};

/// Where audit output goes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Append-only JSON-lines audit trail.
    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,

    /// Root of the date-partitioned evidence store referenced by review tasks.
    #[serde(default = "default_evidence_root")]
    pub evidence_root: PathBuf,

    #[serde(default)]
    pub drift: DriftWindows,
}

fn default_log_path() -> PathBuf {
    dirs_or_default(".trustguard/logs/audit_trail.jsonl")
}

fn default_evidence_root() -> PathBuf {
    dirs_or_default(".trustguard/evidence")
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            log_path: default_log_path(),
            evidence_root: default_evidence_root(),
            drift: DriftWindows::default(),
        }
    }
}

/// Top-level configuration for the TrustGuard root binary.
///
/// Loaded from a TOML file (typically `~/.trustguard/config.toml`). Every
/// section is optional and falls back to its defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RootConfig {
    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub fusion: FusionConfig,

    #[serde(default)]
    pub policy: PolicyConfig,

    #[serde(default)]
    pub audit: AuditConfig,
}

/// Returns `$HOME/<suffix>` if HOME is available, otherwise `./<suffix>`.
fn dirs_or_default(suffix: &str) -> PathBuf {
    std::env::var("HOME")
        .map(|h| PathBuf::from(h).join(suffix))
        .unwrap_or_else(|_| PathBuf::from(suffix))
}

impl RootConfig {
    /// Load configuration from a TOML file. If the file does not exist,
    /// returns a default configuration.
    pub fn load(path: &Path) -> RootResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let config: RootConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> RootResult<()> {
        let contents = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Validate every section.
    pub fn validate(&self) -> RootResult<()> {
        self.pipeline.validate()?;
        self.fusion.validate()?;
        self.policy.validate()?;
        self.audit.drift.validate().map_err(RootError::Config)?;
        if self.audit.log_path.as_os_str().is_empty() {
            return Err(RootError::Config("audit.log_path must not be empty".into()));
        }
        Ok(())
    }

    /// Return the path to the default config file location.
    pub fn default_config_path() -> PathBuf {
        dirs_or_default(".trustguard/config.toml")
    }
}
