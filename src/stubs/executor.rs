use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::core::domain::{
    CompileLimits, ExecutionLimits, Invocation, Language, RunOutput,
};
use crate::core::traits::executor::{Executor, PrepareError, RunError};

/// Executor double with fixed results and configurable delays, for
/// exercising the pipeline and facade without touching the OS.
#[derive(Debug, Clone)]
pub struct ExecutorStub {
    prepare_result: Result<Invocation, PrepareError>,
    run_result: Result<RunOutput, RunError>,
    prepare_delay: Duration,
    run_delay: Duration,
}

impl ExecutorStub {
    pub fn new(
        prepare_result: Result<Invocation, PrepareError>,
        run_result: Result<RunOutput, RunError>,
        prepare_delay: Duration,
        run_delay: Duration,
    ) -> Self {
        Self {
            prepare_result,
            run_result,
            prepare_delay,
            run_delay,
        }
    }
}

#[async_trait::async_trait]
impl Executor for ExecutorStub {
    #[tracing::instrument]
    async fn prepare(
        &self,
        source: &str,
        language: &Language,
        limits: &CompileLimits,
    ) -> Result<Invocation, PrepareError> {
        tracing::debug!(
            "Stub prepare: source={:?}, language={:?}, limits={:?}",
            source,
            language,
            limits
        );
        tokio::time::sleep(self.prepare_delay).await;
        self.prepare_result.clone()
    }

    #[tracing::instrument]
    async fn run(
        &self,
        invocation: &Invocation,
        limits: &ExecutionLimits,
        cancel: &CancellationToken,
    ) -> Result<RunOutput, RunError> {
        tracing::debug!("Stub run: invocation={:?}, limits={:?}", invocation, limits);
        tokio::select! {
            _ = tokio::time::sleep(self.run_delay) => self.run_result.clone(),
            _ = cancel.cancelled() => Err(RunError::Cancelled {
                output: RunOutput::empty(),
            }),
        }
    }

    async fn cleanup(&self, _invocation: &Invocation) {}
}
