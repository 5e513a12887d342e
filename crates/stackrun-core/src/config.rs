//! Configuration - one immutable value loaded at startup
//!
//! Lookup order:
//! - explicit `--config <path>`
//! - `./stackrun.json`
//! - `~/.stackrun/config.json`
//! - built-in defaults
//!
//! Every field is optional in the file; missing ones fall back to defaults.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONCURRENCY: usize = 6;

const REDACTED: &str = "********";

const DEFAULT_STACKS: &[&str] = &[
    "vpc",
    "eks",
    "rds",
    "monitoring",
    "app",
    "bastion",
    "network",
    "iam",
    "s3",
    "cloudfront",
    "dynamodb",
    "lambda",
    "api",
    "ecs",
    "logs",
    "metrics",
    "secrets",
    "ecr",
    "kinesis",
    "elasticache",
    "cdn",
    "edge",
    "batch",
    "vpn",
    "ad",
    "cloudtrail",
    "glue",
    "athena",
    "redshift",
    "config",
];

/// Runner and sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Project root; relative paths below are resolved against it
    pub root: PathBuf,
    pub tf_bin: String,
    /// Ordered stack list. Destroy walks it backwards.
    pub stacks: Vec<String>,
    pub stacks_dir: PathBuf,
    pub backend_config_dir: PathBuf,
    pub plans_dir: PathBuf,
    pub tfvars_dir: PathBuf,
    pub tfvars_suffix: String,
    /// Remote prefix the variable files are pulled from (`s3://bucket/prefix`)
    pub tfvars_remote: String,
    pub deploy_bucket: String,
    pub deploy_dir: PathBuf,
    pub artifact_pattern: String,
    pub concurrency: usize,
    pub step_timeout_secs: Option<u64>,
    pub store: StoreConfig,
}

/// Object store backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum StoreConfig {
    /// Shell out to the `aws` CLI
    AwsCli {
        #[serde(default = "default_aws_bin")]
        bin: String,
    },
    /// Talk to an S3-compatible endpoint directly
    S3(S3Config),
}

/// S3/R2 configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    pub endpoint: String,
    #[serde(default = "default_region")]
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
}

fn default_aws_bin() -> String {
    "aws".to_string()
}

fn default_region() -> String {
    "auto".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::AwsCli {
            bin: default_aws_bin(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            tf_bin: "terraform".to_string(),
            stacks: DEFAULT_STACKS.iter().map(|s| s.to_string()).collect(),
            stacks_dir: PathBuf::from("stacks"),
            backend_config_dir: PathBuf::from("backend-config"),
            plans_dir: PathBuf::from("plans"),
            tfvars_dir: PathBuf::from("/opt/agent/agent-dev"),
            tfvars_suffix: "_v2.tfvars".to_string(),
            tfvars_remote: "s3://my-tfvars-bucket/env-tfvars".to_string(),
            deploy_bucket: "my-deployment-artifacts".to_string(),
            deploy_dir: PathBuf::from("/opt/agent/agent-dev/deployments"),
            artifact_pattern: "*.zip".to_string(),
            concurrency: DEFAULT_CONCURRENCY,
            step_timeout_secs: None,
            store: StoreConfig::default(),
        }
    }
}

/// A name that can be joined onto a directory without leaving it
pub fn is_path_segment(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(&['/', '\\'][..])
}

/// Get user config file path (~/.stackrun/config.json)
pub fn get_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".stackrun")
        .join("config.json")
}

impl Config {
    /// Load config following the lookup order, rooted at `cwd`
    pub fn load(explicit: Option<&Path>, cwd: &Path) -> Result<Self, ConfigError> {
        let candidates = match explicit {
            Some(path) => vec![path.to_path_buf()],
            None => vec![cwd.join("stackrun.json"), get_config_path()],
        };

        let mut config = match candidates.iter().find(|p| explicit.is_some() || p.exists()) {
            Some(path) => {
                tracing::debug!("Loading config from {}", path.display());
                Self::from_file(path)?
            }
            None => Self::default(),
        };

        if config.root.is_relative() {
            config.root = cwd.join(&config.root);
        }
        config.validate()?;
        Ok(config)
    }

    /// Parse a config file without applying the lookup order
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stacks.is_empty() {
            return Err(ConfigError::Invalid("stack list is empty".into()));
        }
        let mut seen = HashSet::new();
        for stack in &self.stacks {
            if !is_path_segment(stack) {
                return Err(ConfigError::Invalid(format!("bad stack name '{}'", stack)));
            }
            if !seen.insert(stack.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate stack '{}'", stack)));
            }
        }
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid("concurrency must be at least 1".into()));
        }
        Ok(())
    }

    /// Copy safe to print: the S3 secret key is masked
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if let StoreConfig::S3(s3) = &mut config.store {
            s3.secret_key = REDACTED.to_string();
        }
        config
    }

    /// Resolve a configured path against the project root
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}
