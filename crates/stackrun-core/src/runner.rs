//! Stack Task Runner - plan/apply/destroy across the configured stacks
//!
//! Pipelines per stack:
//! - plan:    clean → init → fmt → validate → plan
//! - apply:   apply
//! - destroy: init → destroy
//!
//! Sequential runs stop at the first failing stack; the remaining stacks are
//! reported as not run. Parallel plan runs dispatch every stack to a bounded
//! worker pool and report every outcome, failed or not.

use crate::config::Config;
use crate::error::TaskError;
use crate::exec::{CommandRunner, Invocation};
use crate::pool::{Job, WorkerPool};
use crate::stack::{find_stack, stacks_for, EnvironmentContext, StackDescriptor};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

const PLAN_STEPS: &[Step] = &[Step::Clean, Step::Init, Step::Format, Step::Validate, Step::Plan];
const APPLY_STEPS: &[Step] = &[Step::Apply];
const DESTROY_STEPS: &[Step] = &[Step::Init, Step::Destroy];

/// A single pipeline step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Clean,
    Init,
    Format,
    Validate,
    Plan,
    Apply,
    Destroy,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Clean => "clean",
            Step::Init => "init",
            Step::Format => "fmt",
            Step::Validate => "validate",
            Step::Plan => "plan",
            Step::Apply => "apply",
            Step::Destroy => "destroy",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Plan,
    Apply,
    Destroy,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Plan => "plan",
            Operation::Apply => "apply",
            Operation::Destroy => "destroy",
        })
    }
}

/// Per-stack status
#[derive(Debug)]
pub enum OutcomeStatus {
    Done,
    /// `step` is `None` when the pipeline panicked
    Failed {
        step: Option<Step>,
        error: TaskError,
    },
    NotRun,
}

/// Result of one stack's pipeline
#[derive(Debug)]
pub struct TaskOutcome {
    pub stack: String,
    pub status: OutcomeStatus,
    pub duration: Duration,
}

impl TaskOutcome {
    fn not_run(stack: &str) -> Self {
        Self {
            stack: stack.to_string(),
            status: OutcomeStatus::NotRun,
            duration: Duration::ZERO,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self.status, OutcomeStatus::Done)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, OutcomeStatus::Failed { .. })
    }
}

/// Outcomes of one multi-stack run, in the order stacks were visited
#[derive(Debug)]
pub struct RunReport {
    pub operation: Operation,
    pub env: String,
    pub outcomes: Vec<TaskOutcome>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(TaskOutcome::is_done)
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_done()).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &TaskOutcome> {
        self.outcomes.iter().filter(|o| o.is_failed())
    }

    pub fn outcome(&self, stack: &str) -> Option<&TaskOutcome> {
        self.outcomes.iter().find(|o| o.stack == stack)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Summary ({} {}):", self.operation, self.env)?;
        for outcome in &self.outcomes {
            match &outcome.status {
                OutcomeStatus::Done => {
                    writeln!(f, " - {}: done ({:.1?})", outcome.stack, outcome.duration)?
                }
                OutcomeStatus::Failed {
                    step: Some(step),
                    error,
                } => writeln!(f, " - {}: failed at {}: {}", outcome.stack, step, error)?,
                OutcomeStatus::Failed { step: None, error } => {
                    writeln!(f, " - {}: {}", outcome.stack, error)?
                }
                OutcomeStatus::NotRun => writeln!(f, " - {}: not run", outcome.stack)?,
            }
        }
        Ok(())
    }
}

/// Drives the infrastructure tool over the configured stacks
pub struct StackRunner<C> {
    config: Arc<Config>,
    commands: Arc<C>,
}

impl<C: CommandRunner + 'static> StackRunner<C> {
    pub fn new(config: Arc<Config>, commands: C) -> Self {
        Self {
            config,
            commands: Arc::new(commands),
        }
    }

    pub fn commands(&self) -> &C {
        &self.commands
    }

    /// Plan every stack. Sequential mode stops at the first failure;
    /// parallel mode runs all stacks through the worker pool regardless.
    pub async fn plan_all(&self, env: &str, parallel: bool) -> Result<RunReport, TaskError> {
        self.plan_all_with(env, parallel, self.config.concurrency).await
    }

    /// `plan_all` with an explicit worker count for parallel mode
    pub async fn plan_all_with(
        &self,
        env: &str,
        parallel: bool,
        workers: usize,
    ) -> Result<RunReport, TaskError> {
        let ctx = EnvironmentContext::new(&self.config, env)?;
        ctx.require_tfvars()?;
        self.ensure_plans_dir()?;

        let stacks = stacks_for(&self.config, &ctx);
        let outcomes = if parallel {
            self.run_parallel(&ctx, stacks, workers).await
        } else {
            self.run_sequential(&ctx, stacks, PLAN_STEPS)
        };

        Ok(self.report(Operation::Plan, &ctx, outcomes))
    }

    pub fn plan_stack(&self, env: &str, stack: &str) -> Result<RunReport, TaskError> {
        let ctx = EnvironmentContext::new(&self.config, env)?;
        let stack = find_stack(&self.config, &ctx, stack)?;
        ctx.require_tfvars()?;
        self.ensure_plans_dir()?;

        let outcomes = self.run_sequential(&ctx, vec![stack], PLAN_STEPS);
        Ok(self.report(Operation::Plan, &ctx, outcomes))
    }

    /// Apply saved plans in configured order; the first failure halts the run.
    /// Missing plan files are left for the tool to reject.
    pub fn apply_all(&self, env: &str) -> Result<RunReport, TaskError> {
        let ctx = EnvironmentContext::new(&self.config, env)?;
        let stacks = stacks_for(&self.config, &ctx);

        let outcomes = self.run_sequential(&ctx, stacks, APPLY_STEPS);
        Ok(self.report(Operation::Apply, &ctx, outcomes))
    }

    pub fn apply_stack(&self, env: &str, stack: &str) -> Result<RunReport, TaskError> {
        let ctx = EnvironmentContext::new(&self.config, env)?;
        let stack = find_stack(&self.config, &ctx, stack)?;

        let outcomes = self.run_sequential(&ctx, vec![stack], APPLY_STEPS);
        Ok(self.report(Operation::Apply, &ctx, outcomes))
    }

    /// Destroy stacks last-created first; the first failure halts the run.
    pub fn destroy_all(&self, env: &str) -> Result<RunReport, TaskError> {
        let ctx = EnvironmentContext::new(&self.config, env)?;
        ctx.require_tfvars()?;

        let mut stacks = stacks_for(&self.config, &ctx);
        stacks.reverse();

        let outcomes = self.run_sequential(&ctx, stacks, DESTROY_STEPS);
        Ok(self.report(Operation::Destroy, &ctx, outcomes))
    }

    pub fn destroy_stack(&self, env: &str, stack: &str) -> Result<RunReport, TaskError> {
        let ctx = EnvironmentContext::new(&self.config, env)?;
        let stack = find_stack(&self.config, &ctx, stack)?;
        ctx.require_tfvars()?;

        let outcomes = self.run_sequential(&ctx, vec![stack], DESTROY_STEPS);
        Ok(self.report(Operation::Destroy, &ctx, outcomes))
    }

    fn ensure_plans_dir(&self) -> Result<(), TaskError> {
        std::fs::create_dir_all(self.config.resolve(&self.config.plans_dir))?;
        Ok(())
    }

    fn report(
        &self,
        operation: Operation,
        ctx: &EnvironmentContext,
        outcomes: Vec<TaskOutcome>,
    ) -> RunReport {
        let report = RunReport {
            operation,
            env: ctx.name.clone(),
            outcomes,
        };
        tracing::info!(
            "{} {}: {} of {} stacks succeeded",
            operation,
            ctx.name,
            report.succeeded(),
            report.outcomes.len()
        );
        report
    }

    fn run_sequential(
        &self,
        ctx: &EnvironmentContext,
        stacks: Vec<StackDescriptor>,
        steps: &[Step],
    ) -> Vec<TaskOutcome> {
        let mut outcomes = Vec::with_capacity(stacks.len());
        let mut halted = false;

        for stack in stacks {
            if halted {
                outcomes.push(TaskOutcome::not_run(&stack.name));
                continue;
            }
            let outcome = run_pipeline(
                self.commands.as_ref(),
                &self.config.tf_bin,
                ctx,
                &stack,
                steps,
            );
            halted = outcome.is_failed();
            outcomes.push(outcome);
        }

        outcomes
    }

    async fn run_parallel(
        &self,
        ctx: &EnvironmentContext,
        stacks: Vec<StackDescriptor>,
        workers: usize,
    ) -> Vec<TaskOutcome> {
        let order: Vec<String> = stacks.iter().map(|s| s.name.clone()).collect();
        let pool = WorkerPool::new(workers);
        tracing::info!("Planning {} stacks with {} workers", stacks.len(), pool.workers());

        let jobs: Vec<Job<TaskOutcome>> = stacks
            .into_iter()
            .map(|stack| {
                let commands = Arc::clone(&self.commands);
                let tf_bin = self.config.tf_bin.clone();
                let ctx = ctx.clone();
                Job::new(stack.name.clone(), move || {
                    run_pipeline(commands.as_ref(), &tf_bin, &ctx, &stack, PLAN_STEPS)
                })
            })
            .collect();

        let mut outcomes: Vec<TaskOutcome> = pool
            .execute(jobs)
            .await
            .into_iter()
            .map(|result| match result.output {
                Ok(outcome) => {
                    if outcome.is_done() {
                        tracing::info!("✅ {} planned", outcome.stack);
                    }
                    outcome
                }
                Err(panic) => TaskOutcome {
                    stack: result.name,
                    status: OutcomeStatus::Failed {
                        step: None,
                        error: TaskError::Panicked(panic),
                    },
                    duration: result.duration,
                },
            })
            .collect();

        outcomes.sort_by_key(|o| order.iter().position(|name| *name == o.stack));
        outcomes
    }
}

/// Run `steps` for one stack, stopping at the first failing step
fn run_pipeline<C: CommandRunner + ?Sized>(
    commands: &C,
    tf_bin: &str,
    ctx: &EnvironmentContext,
    stack: &StackDescriptor,
    steps: &[Step],
) -> TaskOutcome {
    let start = Instant::now();
    tracing::info!("===== {} {} ({}) =====", steps[steps.len() - 1], stack.name, ctx.name);

    for &step in steps {
        let result = match step_invocation(step, tf_bin, ctx, stack) {
            Some(invocation) => {
                tracing::info!(stack = %stack.name, "→ {}", invocation);
                commands.run(&invocation)
            }
            None => clean_stack(&stack.dir),
        };

        if let Err(error) = result {
            tracing::error!(stack = %stack.name, "{} failed: {}", step, error);
            return TaskOutcome {
                stack: stack.name.clone(),
                status: OutcomeStatus::Failed {
                    step: Some(step),
                    error,
                },
                duration: start.elapsed(),
            };
        }
    }

    TaskOutcome {
        stack: stack.name.clone(),
        status: OutcomeStatus::Done,
        duration: start.elapsed(),
    }
}

/// Tool invocation for `step`; `None` for steps handled in-process
pub fn step_invocation(
    step: Step,
    tf_bin: &str,
    ctx: &EnvironmentContext,
    stack: &StackDescriptor,
) -> Option<Invocation> {
    let args: Vec<String> = match step {
        Step::Clean => return None,
        Step::Init => vec![
            "init".into(),
            "-input=false".into(),
            "-reconfigure".into(),
            format!("-backend-config={}", stack.backend_config.display()),
        ],
        Step::Format => vec!["fmt".into(), "-recursive".into()],
        Step::Validate => vec!["validate".into()],
        Step::Plan => vec![
            "plan".into(),
            "-input=false".into(),
            format!("-var-file={}", ctx.tfvars.display()),
            format!("-out={}", stack.plan.display()),
        ],
        Step::Apply => vec![
            "apply".into(),
            "-auto-approve".into(),
            stack.plan.display().to_string(),
        ],
        Step::Destroy => vec![
            "destroy".into(),
            "-auto-approve".into(),
            format!("-var-file={}", ctx.tfvars.display()),
        ],
    };
    Some(Invocation::new(tf_bin, args, &stack.dir))
}

/// Drop the stack's `.terraform` dir so init starts from scratch
fn clean_stack(dir: &Path) -> Result<(), TaskError> {
    let local_state = dir.join(".terraform");
    if local_state.exists() {
        std::fs::remove_dir_all(&local_state)?;
    }
    Ok(())
}
