use std::sync::Arc;

use tokio::sync::mpsc::{Receiver, Sender};
use tokio_util::sync::CancellationToken;

use crate::{
    constants::RES_TX_ERR,
    core::{
        domain::{Run, RunOutput, RunState},
        traits::executor::{Executor, RunError},
    },
};

#[tracing::instrument]
pub fn handle_running(
    res_tx: Sender<Run>,
    mut run_rx: Receiver<Run>,
    executor: Arc<dyn Executor>,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        while let Some(run) = run_rx.recv().await {
            process_run(run, &res_tx, &executor, &cancel).await;
        }
    });
}

/// Runs a single prepared invocation and reports the terminal state. The
/// artifact is released after the run on every path, including
/// cancellation observed before the spawn.
async fn process_run(
    run: Run,
    res_tx: &Sender<Run>,
    executor: &Arc<dyn Executor>,
    cancel: &CancellationToken,
) {
    tracing::debug!("Running: {:?}", run.id);

    let RunState::Prepared(invocation) = run.state.clone() else {
        tracing::error!("Run is not prepared");
        return;
    };

    if cancel.is_cancelled() {
        executor.cleanup(&invocation).await;
        let run = run.change_state(RunState::Cancelled { output: None });
        res_tx.send(run).await.expect(RES_TX_ERR);
        return;
    }

    let run = run.change_state(RunState::Running);
    res_tx.send(run.clone()).await.expect(RES_TX_ERR);

    let result = executor
        .run(&invocation, &run.execution_limits, cancel)
        .await;
    executor.cleanup(&invocation).await;

    let run = run.change_state(result.into());
    tracing::info!("Run completed: {:?}", run.id);
    res_tx.send(run).await.expect(RES_TX_ERR);
}

impl From<Result<RunOutput, RunError>> for RunState {
    fn from(result: Result<RunOutput, RunError>) -> Self {
        match result {
            Ok(output) => RunState::Finished { output },
            Err(RunError::Crash { output }) => RunState::Crashed { output },
            Err(RunError::TimedOut { output }) => RunState::TimedOut { output },
            Err(RunError::Cancelled { output }) => RunState::Cancelled {
                output: Some(output),
            },
            Err(RunError::SpawnFailed { msg }) => RunState::SpawnFailed { msg },
            Err(RunError::Internal { msg }) => {
                tracing::error!("Internal error while running: {}", msg);
                RunState::InternalError
            }
        }
    }
}
