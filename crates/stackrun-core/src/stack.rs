//! Stack and environment descriptors
//!
//! Both are value objects derived from the config for a single invocation.

use crate::config::{is_path_segment, Config};
use crate::error::TaskError;
use std::path::{Path, PathBuf};

/// Per-environment paths
#[derive(Debug, Clone)]
pub struct EnvironmentContext {
    pub name: String,
    /// Variable file passed to plan/destroy
    pub tfvars: PathBuf,
    pub backend_config_dir: PathBuf,
}

impl EnvironmentContext {
    pub fn new(config: &Config, env: &str) -> Result<Self, TaskError> {
        if !is_path_segment(env) {
            return Err(TaskError::InvalidArgument(format!(
                "bad environment name '{}'",
                env
            )));
        }

        Ok(Self {
            name: env.to_string(),
            tfvars: config
                .resolve(&config.tfvars_dir)
                .join(tfvars_file_name(config, env)),
            backend_config_dir: config.resolve(&config.backend_config_dir),
        })
    }

    pub fn backend_config(&self) -> PathBuf {
        self.backend_config_dir.join(format!("{}.config", self.name))
    }

    /// The variable file, which must already be on disk
    pub fn require_tfvars(&self) -> Result<&Path, TaskError> {
        if self.tfvars.is_file() {
            Ok(&self.tfvars)
        } else {
            Err(TaskError::MissingConfiguration(self.tfvars.clone()))
        }
    }
}

/// `<env><suffix>`, e.g. `dev1_v2.tfvars`
pub fn tfvars_file_name(config: &Config, env: &str) -> String {
    format!("{}{}", env, config.tfvars_suffix)
}

/// One deployable unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackDescriptor {
    pub name: String,
    pub dir: PathBuf,
    pub backend_config: PathBuf,
    pub plan: PathBuf,
}

impl StackDescriptor {
    pub fn new(config: &Config, env: &EnvironmentContext, name: &str) -> Self {
        Self {
            name: name.to_string(),
            dir: config.resolve(&config.stacks_dir).join(name),
            backend_config: env.backend_config(),
            plan: config
                .resolve(&config.plans_dir)
                .join(format!("{}-{}.tfplan", name, env.name)),
        }
    }
}

/// All configured stacks, in configured order
pub fn stacks_for(config: &Config, env: &EnvironmentContext) -> Vec<StackDescriptor> {
    config
        .stacks
        .iter()
        .map(|name| StackDescriptor::new(config, env, name))
        .collect()
}

/// Look up a single configured stack by name
pub fn find_stack(
    config: &Config,
    env: &EnvironmentContext,
    name: &str,
) -> Result<StackDescriptor, TaskError> {
    if config.stacks.iter().any(|s| s == name) {
        Ok(StackDescriptor::new(config, env, name))
    } else {
        Err(TaskError::InvalidArgument(format!("unknown stack '{}'", name)))
    }
}
