//! Run lifecycle orchestration.
//!
//! A run goes through: configuration upload, run creation, plan polling, an
//! approval decision, and optionally apply polling. Polling uses exponential
//! backoff ([`backoff`]); only the plan-start phase carries an elapsed-time
//! budget, since a run stuck in the remote queue is the one case worth
//! bailing out of. Once a run exists, any later failure triggers a
//! best-effort discard so the workspace is not left locked.

pub mod backoff;

use crate::errors::{DriftsyncError, Result};
use crate::remote::types::{ApplyStatus, Plan, PlanStatus, Run, Workspace};
use crate::remote::RemoteClient;
use backoff::{poll_until, Poll};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Options for one run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub message: String,
    /// Approve without prompting when the plan has changes.
    pub auto_approve: bool,
    /// Discard without prompting when the plan has changes.
    pub auto_discard: bool,
    /// Never prompt; leave the run pending if no auto decision applies.
    pub no_prompt: bool,
    /// Fail if the plan has not started executing within this budget.
    pub start_timeout: Option<Duration>,
    /// Write the created run id to this file for later approve/discard calls.
    pub output_path: Option<PathBuf>,
}

/// Terminal state of a driven run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    NoChanges { run_id: String },
    Applied { run_id: String },
    Discarded { run_id: String },
    /// Plan has changes but no decision was taken (`no_prompt`).
    Pending { run_id: String },
}

pub struct RunOrchestrator {
    client: RemoteClient,
}

impl RunOrchestrator {
    pub fn new(client: RemoteClient) -> Self {
        Self { client }
    }

    /// Upload the configuration, create a run, and drive it to an outcome.
    pub async fn create_run(
        &self,
        workspace: &Workspace,
        directory: &Path,
        options: &RunOptions,
        out: &mut dyn Write,
    ) -> Result<RunOutcome> {
        if !workspace.operations {
            return Err(DriftsyncError::precondition(format!(
                "remote execution is disabled on workspace '{}'",
                workspace.name
            )));
        }

        let upload_dir = upload_directory(directory, workspace.working_directory.as_deref());

        let version = self.client.create_configuration_version(&workspace.id).await?;
        self.client.upload_configuration(&version.upload_url, &upload_dir).await?;

        let run = self.client.create_run(&workspace.id, &version.id, &options.message).await?;
        info!(run_id = %run.id, workspace = %workspace.name, "created run");

        match self.drive(workspace, &run, options, out).await {
            Ok(outcome) => Ok(outcome),
            Err(error) => {
                // keep the workspace unlocked after a failed run
                if let Err(discard_error) =
                    self.client.discard_run(&run.id, "discarded after failure").await
                {
                    warn!(
                        run_id = %run.id,
                        error = %discard_error,
                        "failed to discard run after error"
                    );
                }
                Err(error)
            }
        }
    }

    /// Approve a pending run and follow its apply to completion.
    pub async fn approve_run(
        &self,
        run_id: &str,
        comment: &str,
        out: &mut dyn Write,
    ) -> Result<()> {
        self.client.apply_run(run_id, comment).await?;
        info!(run_id, "approved run");
        let apply_id = self.wait_for_apply_id(run_id).await?;
        self.wait_for_apply(&apply_id, out).await
    }

    /// Discard a pending run.
    pub async fn discard_run(&self, run_id: &str, comment: &str) -> Result<()> {
        self.client.discard_run(run_id, comment).await?;
        info!(run_id, "discarded run");
        Ok(())
    }

    async fn drive(
        &self,
        workspace: &Workspace,
        run: &Run,
        options: &RunOptions,
        out: &mut dyn Write,
    ) -> Result<RunOutcome> {
        if let Some(path) = &options.output_path {
            std::fs::write(path, &run.id).map_err(|e| {
                DriftsyncError::io(e, format!("writing run id to {}", path.display()))
            })?;
        }

        let plan_id = match &run.plan_id {
            Some(id) => id.clone(),
            None => self.wait_for_plan_id(&run.id).await?,
        };

        let plan = self.wait_for_plan(&plan_id, options.start_timeout, out).await?;

        if !plan.has_changes {
            info!(run_id = %run.id, "plan has no changes");
            return Ok(RunOutcome::NoChanges { run_id: run.id.clone() });
        }

        if workspace.auto_apply {
            // the remote applies on its own; follow the apply it starts
            info!(run_id = %run.id, "workspace auto-applies, following apply");
            let apply_id = self.wait_for_apply_id(&run.id).await?;
            self.wait_for_apply(&apply_id, out).await?;
            return Ok(RunOutcome::Applied { run_id: run.id.clone() });
        }

        if options.auto_discard {
            self.discard_run(&run.id, &options.message).await?;
            return Ok(RunOutcome::Discarded { run_id: run.id.clone() });
        }

        if options.auto_approve {
            self.approve_run(&run.id, &options.message, out).await?;
            return Ok(RunOutcome::Applied { run_id: run.id.clone() });
        }

        if options.no_prompt {
            info!(run_id = %run.id, "plan has changes, leaving run pending approval");
            return Ok(RunOutcome::Pending { run_id: run.id.clone() });
        }

        if prompt_approval(&run.id)? {
            self.approve_run(&run.id, &options.message, out).await?;
            Ok(RunOutcome::Applied { run_id: run.id.clone() })
        } else {
            self.discard_run(&run.id, &options.message).await?;
            Ok(RunOutcome::Discarded { run_id: run.id.clone() })
        }
    }

    /// Poll the run until the remote attaches a plan to it. Unbounded; the
    /// plan relationship appears quickly once the run is accepted.
    async fn wait_for_plan_id(&self, run_id: &str) -> Result<String> {
        poll_until("run plan id", None, || {
            let client = self.client.clone();
            let run_id = run_id.to_string();
            async move {
                let run = client.read_run(&run_id).await?;
                Ok(match run.plan_id {
                    Some(id) => Poll::Ready(id),
                    None => Poll::Pending(run.status),
                })
            }
        })
        .await
    }

    /// Poll the run until its apply relationship appears.
    async fn wait_for_apply_id(&self, run_id: &str) -> Result<String> {
        poll_until("run apply id", None, || {
            let client = self.client.clone();
            let run_id = run_id.to_string();
            async move {
                let run = client.read_run(&run_id).await?;
                Ok(match run.apply_id {
                    Some(id) => Poll::Ready(id),
                    None => Poll::Pending(run.status),
                })
            }
        })
        .await
    }

    /// Wait for the plan to finish, then stream its logs.
    ///
    /// `start_timeout` budgets this whole phase; plans stuck in the remote
    /// queue (or running away) fail with a timeout instead of hanging.
    async fn wait_for_plan(
        &self,
        plan_id: &str,
        start_timeout: Option<Duration>,
        out: &mut dyn Write,
    ) -> Result<Plan> {
        let plan = poll_until("plan", start_timeout, || {
            let client = self.client.clone();
            let plan_id = plan_id.to_string();
            async move {
                let plan = client.read_plan(&plan_id).await?;
                match plan.status {
                    PlanStatus::Finished => Ok(Poll::Ready(plan)),
                    PlanStatus::Errored | PlanStatus::Canceled | PlanStatus::Unreachable => {
                        Err(DriftsyncError::remote_terminal("plan", plan.status.as_str()))
                    }
                    status => Ok(Poll::Pending(status.to_string())),
                }
            }
        })
        .await?;

        if let Some(url) = &plan.log_read_url {
            self.client.stream_logs(url, out).await?;
        }

        Ok(plan)
    }

    /// Wait for an apply to finish, then stream its logs. Unbounded; applies
    /// may legitimately run long.
    async fn wait_for_apply(&self, apply_id: &str, out: &mut dyn Write) -> Result<()> {
        let apply = poll_until("apply", None, || {
            let client = self.client.clone();
            let apply_id = apply_id.to_string();
            async move {
                let apply = client.read_apply(&apply_id).await?;
                match apply.status {
                    ApplyStatus::Finished => Ok(Poll::Ready(apply)),
                    ApplyStatus::Errored | ApplyStatus::Canceled | ApplyStatus::Unreachable => {
                        Err(DriftsyncError::remote_terminal("apply", apply.status.as_str()))
                    }
                    status => Ok(Poll::Pending(status.to_string())),
                }
            }
        })
        .await?;

        if let Some(url) = &apply.log_read_url {
            self.client.stream_logs(url, out).await?;
        }

        info!(apply_id, "apply finished");
        Ok(())
    }
}

/// Directory to archive for upload. When the workspace has a working
/// directory configured, the archive root is the parent that contains it, so
/// the remote resolves the working directory inside the archive.
fn upload_directory(directory: &Path, working_directory: Option<&str>) -> PathBuf {
    match working_directory {
        Some(working) if !working.is_empty() => {
            let trimmed = working.trim_matches('/');
            let mut path = directory.to_path_buf();
            let mut components = trimmed.split('/').rev().peekable();
            while let Some(component) = components.peek() {
                if path.file_name().map(|n| n == std::ffi::OsStr::new(component)).unwrap_or(false)
                {
                    path.pop();
                    components.next();
                } else {
                    break;
                }
            }
            path
        }
        _ => directory.to_path_buf(),
    }
}

/// Interactive approval prompt on stdin.
fn prompt_approval(run_id: &str) -> Result<bool> {
    print!("Apply run {}? [y/N] ", run_id);
    std::io::stdout().flush().map_err(|e| DriftsyncError::io(e, "flushing prompt"))?;

    let mut answer = String::new();
    std::io::stdin()
        .read_line(&mut answer)
        .map_err(|e| DriftsyncError::io(e, "reading approval answer"))?;

    let answer = answer.trim().to_lowercase();
    Ok(answer == "y" || answer == "yes")
}
