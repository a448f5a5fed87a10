//! Workflow backed by external commands.
//!
//! The generation and adjustment layers live outside this binary (model
//! calls, prompt assembly). The coordinator invokes them as child
//! processes: `<command> <user_id>`, with `NUTRIQ_DB_PATH` pointing at the
//! shared store. Exit code 75 (EX_TEMPFAIL) marks a transient failure and
//! is retried under the model-call policy; any other non-zero exit is
//! terminal for the invocation.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::Result;
use async_trait::async_trait;
use tokio::process::Command;

use nutriq_core::workflow::PlanWorkflow;
use nutriq_core::workflow::retry::{ProviderError, RetryPolicy, call_with_retry};

/// EX_TEMPFAIL from sysexits.h.
const EXIT_TRANSIENT: i32 = 75;

pub struct CommandWorkflow {
    process_command: Option<String>,
    adjust_command: Option<String>,
    db_path: PathBuf,
    policy: RetryPolicy,
}

impl CommandWorkflow {
    pub fn new(
        process_command: Option<String>,
        adjust_command: Option<String>,
        db_path: PathBuf,
    ) -> Self {
        Self {
            process_command,
            adjust_command,
            db_path,
            policy: RetryPolicy::model_calls(),
        }
    }

    async fn invoke(&self, label: &str, command: Option<&str>, user_id: &str) -> Result<()> {
        let Some(command) = command else {
            anyhow::bail!(
                "no {label} command configured; set [workflow] {label}_command in the config file"
            );
        };

        call_with_retry(&self.policy, || {
            run_command(command, user_id, &self.db_path)
        })
        .await?;
        tracing::info!(user_id = %user_id, command = %command, "{label} command succeeded");
        Ok(())
    }
}

/// One attempt: spawn the command and classify its exit.
async fn run_command(command: &str, user_id: &str, db_path: &Path) -> Result<(), ProviderError> {
    let status = Command::new(command)
        .arg(user_id)
        .env("NUTRIQ_DB_PATH", db_path)
        .stdin(Stdio::null())
        .status()
        .await
        .map_err(|e| ProviderError::Fatal(anyhow::anyhow!("failed to spawn {command}: {e}")))?;

    match status.code() {
        Some(0) => Ok(()),
        Some(EXIT_TRANSIENT) => Err(ProviderError::Overloaded),
        Some(code) => Err(ProviderError::Fatal(anyhow::anyhow!(
            "{command} {user_id} exited with code {code}"
        ))),
        None => Err(ProviderError::Fatal(anyhow::anyhow!(
            "{command} {user_id} terminated by signal"
        ))),
    }
}

#[async_trait]
impl PlanWorkflow for CommandWorkflow {
    async fn process_plan(&self, user_id: &str) -> Result<()> {
        self.invoke("process", self.process_command.as_deref(), user_id)
            .await
    }

    async fn adjust_principles(&self, user_id: &str) -> Result<()> {
        self.invoke("adjust", self.adjust_command.as_deref(), user_id)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workflow_with(process: Option<&str>) -> CommandWorkflow {
        CommandWorkflow::new(
            process.map(String::from),
            None,
            PathBuf::from("/tmp/nutriq-test.db"),
        )
    }

    #[tokio::test]
    async fn unconfigured_command_is_an_error() {
        let workflow = workflow_with(None);
        let err = workflow.process_plan("alice").await.unwrap_err();
        assert!(err.to_string().contains("process_command"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn successful_command_completes() {
        let workflow = workflow_with(Some("true"));
        workflow.process_plan("alice").await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_command_is_an_error() {
        let workflow = workflow_with(Some("false"));
        assert!(workflow.process_plan("alice").await.is_err());
    }
}
