use async_trait::async_trait;

use crate::models::command::CommandPayload;

/// What a task runner reports when it ran to completion, successfully or
/// not. Launch failures are `TaskError` instead.
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub success: bool,
    pub detail: String,
}

/// External collaborator that performs the actual local work. The call is
/// synchronous from the poller's perspective and may take from seconds to
/// tens of seconds; it must not be assumed non-blocking.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run_task(&self, payload: &CommandPayload) -> Result<TaskOutcome, TaskError>;
}

/// Task runner that executes a configured local program, passing the task
/// identifier as its argument. Exit status zero maps to success; the tail
/// of the captured output becomes the result detail.
pub struct ProcessTaskRunner {
    program: String,
}

impl ProcessTaskRunner {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl TaskRunner for ProcessTaskRunner {
    async fn run_task(&self, payload: &CommandPayload) -> Result<TaskOutcome, TaskError> {
        tracing::info!(task = %payload.task, program = %self.program, "running local task");
        let started = std::time::Instant::now();

        let output = tokio::process::Command::new(&self.program)
            .arg(&payload.task)
            .output()
            .await
            .map_err(TaskError::Launch)?;

        let duration = started.elapsed();
        tracing::info!(
            task = %payload.task,
            duration_secs = duration.as_secs_f64(),
            exit_code = output.status.code(),
            "local task finished"
        );

        if output.status.success() {
            let summary = output_tail(&String::from_utf8_lossy(&output.stdout));
            let detail = if summary.is_empty() {
                format!("completed in {:.1}s", duration.as_secs_f64())
            } else {
                summary
            };
            Ok(TaskOutcome {
                success: true,
                detail,
            })
        } else {
            let stderr = output_tail(&String::from_utf8_lossy(&output.stderr));
            let detail = match output.status.code() {
                Some(code) if !stderr.is_empty() => format!("exit code {code}: {stderr}"),
                Some(code) => format!("exit code {code}"),
                None => "terminated by signal".to_string(),
            };
            Ok(TaskOutcome {
                success: false,
                detail,
            })
        }
    }
}

const MAX_DETAIL_CHARS: usize = 200;

/// Last non-empty line of captured output, truncated to a size that fits
/// in a result record.
fn output_tail(output: &str) -> String {
    let line = output
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("");
    line.chars().take(MAX_DETAIL_CHARS).collect()
}

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("failed to launch task command: {0}")]
    Launch(#[from] std::io::Error),
}
