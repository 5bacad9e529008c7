use tokio_util::sync::CancellationToken;

use crate::core::domain::{CompileLimits, ExecutionLimits, Invocation, Language, RunOutput};

#[derive(Debug, Clone, thiserror::Error)]
pub enum PrepareError {
    #[error("language '{0}' is not supported")]
    Unsupported(String),
    /// The compiler ran and rejected the source. `msg` is the compiler's
    /// stderr, verbatim.
    #[error("compilation failed: {msg}")]
    CompilationFailed { msg: String },
    #[error("compilation exceeded the time limit")]
    TimedOut,
    #[error("{msg}")]
    Internal { msg: String },
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum RunError {
    /// The child process could not be started at all. `msg` is the
    /// underlying OS error, verbatim.
    #[error("failed to spawn process: {msg}")]
    SpawnFailed { msg: String },
    /// The child was terminated by a signal instead of exiting.
    #[error("process terminated abnormally")]
    Crash { output: RunOutput },
    /// The child was killed after exceeding its time limit; `output` holds
    /// whatever it wrote before that.
    #[error("process exceeded the time limit")]
    TimedOut { output: RunOutput },
    /// The run's cancellation token fired; the child was killed.
    #[error("run was cancelled")]
    Cancelled { output: RunOutput },
    #[error("{msg}")]
    Internal { msg: String },
}

#[mockall::automock]
#[async_trait::async_trait]
pub trait Executor: std::fmt::Debug + Send + Sync {
    /// Turns a source snippet into something runnable: an inline-eval
    /// interpreter command for Python/JavaScript, a compiled artifact for
    /// C++. Any temp source file written here is removed before returning,
    /// on every path.
    async fn prepare(
        &self,
        source: &str,
        language: &Language,
        limits: &CompileLimits,
    ) -> Result<Invocation, PrepareError>;

    /// Spawns the invocation, captures stdout and stderr, and waits for
    /// exit. A normal exit with any status code is `Ok`; the error variants
    /// cover spawn failures, signals, timeouts and cancellation.
    async fn run(
        &self,
        invocation: &Invocation,
        limits: &ExecutionLimits,
        cancel: &CancellationToken,
    ) -> Result<RunOutput, RunError>;

    /// Releases whatever `prepare` left on disk for this invocation. Called
    /// by the pipeline after `run` returns, regardless of the result.
    async fn cleanup(&self, invocation: &Invocation);
}
