//! Stackrun Core - per-environment infrastructure stack orchestration
//!
//! Features:
//! - Content-addressed artifact sync (SHA-256 recorded as object metadata)
//! - `aws` CLI and direct S3-compatible object store backends
//! - Plan/apply/destroy pipelines over an ordered stack list
//! - Bounded worker pool for parallel plans
//! - Structured process invocation, no shell

pub mod config;
pub mod digest;
pub mod error;
pub mod exec;
pub mod pool;
pub mod runner;
pub mod stack;
pub mod store;
pub mod sync;

pub use config::{Config, S3Config, StoreConfig};
pub use digest::compute_digest;
pub use error::{ConfigError, SyncError, TaskError};
pub use exec::{CommandRunner, Invocation, ProcessRunner};
pub use pool::{Job, JobResult, WorkerPool};
pub use runner::{Operation, OutcomeStatus, RunReport, StackRunner, Step, TaskOutcome};
pub use stack::{EnvironmentContext, StackDescriptor};
pub use store::{open_store, BlobStore, ObjectLocation, RemoteDigest};
pub use sync::{SyncOutcome, SyncSummary, Syncer};
