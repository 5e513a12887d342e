//! External process execution
//!
//! Commands are argument lists with an explicit working directory; nothing
//! goes through a shell. stdout/stderr are inherited so the operator sees
//! the tool's own output.

use crate::error::TaskError;
use std::fmt;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// One external command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

impl Invocation {
    pub fn new<I, A>(program: impl Into<String>, args: I, cwd: impl Into<PathBuf>) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            cwd: cwd.into(),
        }
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Runs invocations to completion; a non-zero exit is an error
pub trait CommandRunner: Send + Sync {
    fn run(&self, invocation: &Invocation) -> Result<(), TaskError>;
}

/// Spawns real child processes
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    timeout: Option<Duration>,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill any step still running after `timeout`
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

impl CommandRunner for ProcessRunner {
    fn run(&self, invocation: &Invocation) -> Result<(), TaskError> {
        tracing::debug!(cwd = %invocation.cwd.display(), "spawning {}", invocation);

        let mut child = Command::new(&invocation.program)
            .args(&invocation.args)
            .current_dir(&invocation.cwd)
            .stdin(Stdio::null())
            .spawn()?;

        let status = match self.timeout {
            None => child.wait()?,
            Some(limit) => {
                let start = Instant::now();
                loop {
                    if let Some(status) = child.try_wait()? {
                        break status;
                    }
                    if start.elapsed() >= limit {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(TaskError::Timeout {
                            command: invocation.to_string(),
                            limit,
                        });
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
            }
        };

        if status.success() {
            Ok(())
        } else {
            Err(TaskError::ProcessFailure {
                command: invocation.to_string(),
                code: status.code().unwrap_or(-1),
            })
        }
    }
}
