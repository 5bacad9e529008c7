use std::sync::Arc;

use tokio::sync::mpsc::{Receiver, Sender};
use tokio_util::sync::CancellationToken;

use crate::{
    constants::{RES_TX_ERR, RUN_TX_ERR},
    core::{
        domain::{Run, RunState},
        traits::executor::{Executor, PrepareError},
    },
};

#[tracing::instrument]
pub fn handle_preparing(
    res_tx: Sender<Run>,
    run_tx: Sender<Run>,
    mut prepare_rx: Receiver<Run>,
    executor: Arc<dyn Executor>,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        while let Some(run) = prepare_rx.recv().await {
            let executor = executor.clone();
            let res_tx = res_tx.clone();
            let run_tx = run_tx.clone();
            let cancel = cancel.clone();

            tokio::spawn(async move {
                handle_run(run, res_tx, run_tx, executor, cancel).await;
            });
        }
    });
}

async fn handle_run(
    run: Run,
    res_tx: Sender<Run>,
    run_tx: Sender<Run>,
    executor: Arc<dyn Executor>,
    cancel: CancellationToken,
) {
    if cancel.is_cancelled() {
        let run = run.change_state(RunState::Cancelled { output: None });
        res_tx.send(run).await.expect(RES_TX_ERR);
        return;
    }

    let run = run.change_state(RunState::Preparing);
    res_tx.send(run.clone()).await.expect(RES_TX_ERR);

    tracing::debug!("Start preparing");
    let prepare_result = executor
        .prepare(&run.source, &run.language, &run.compile_limits)
        .await;
    tracing::debug!("Prepare result: {:?}", prepare_result);

    match prepare_result {
        Ok(invocation) => {
            let run = run.change_state(RunState::Prepared(invocation));
            run_tx.send(run.clone()).await.expect(RUN_TX_ERR);
            res_tx.send(run).await.expect(RES_TX_ERR);
        }
        Err(e) => match e {
            PrepareError::Unsupported(language) => {
                let run = run.change_state(RunState::Unsupported { language });
                res_tx.send(run).await.expect(RES_TX_ERR);
            }
            PrepareError::CompilationFailed { msg } => {
                let run = run.change_state(RunState::CompilationFailed { msg });
                res_tx.send(run).await.expect(RES_TX_ERR);
            }
            PrepareError::TimedOut => {
                let run = run.change_state(RunState::CompilationTimedOut);
                res_tx.send(run).await.expect(RES_TX_ERR);
            }
            PrepareError::Internal { msg } => {
                tracing::error!("Internal error while preparing: {}", msg);
                let run = run.change_state(RunState::InternalError);
                res_tx.send(run).await.expect(RES_TX_ERR);
            }
        },
    }
}
