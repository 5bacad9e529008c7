use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc::{Sender, channel};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    constants::{PREPARE_TX_ERR, STREAM_CLOSED_ERR},
    core::{
        domain::{Run, RunRequest, RunState},
        pipeline::{preparing::handle_preparing, running::handle_running},
        traits::executor::Executor,
    },
    hooks::RunHook,
};

/// Caller-facing entry point. Wires a per-run channel pipeline around the
/// executor, streams state snapshots back, and tracks in-flight runs so
/// they can be cancelled by id.
#[derive(Clone, Debug)]
pub struct CodeRunner {
    executor: Arc<dyn Executor>,
    hooks: Vec<Arc<dyn RunHook>>,
    active: Arc<DashMap<Uuid, CancellationToken>>,
}

/// Handle to one submitted run: the snapshot stream plus cancellation.
pub struct RunTicket {
    pub id: Uuid,
    pub updates: ReceiverStream<Run>,
    cancel: CancellationToken,
}

impl RunTicket {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Consumes snapshots until the run reaches a terminal state and
    /// returns that final snapshot.
    pub async fn wait(mut self) -> Run {
        let mut last = None;
        while let Some(run) = self.updates.next().await {
            let terminal = run.state.is_terminal();
            last = Some(run);
            if terminal {
                break;
            }
        }
        last.expect(STREAM_CLOSED_ERR)
    }
}

impl CodeRunner {
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self {
            executor,
            hooks: Vec::new(),
            active: Arc::new(DashMap::new()),
        }
    }

    /// Registers an observer invoked on every state transition of every
    /// subsequently submitted run.
    pub fn register_hook(&mut self, hook: Arc<dyn RunHook>) {
        self.hooks.push(hook);
    }

    /// Validates the request, spawns the pipeline stages for it and
    /// returns a ticket. An unsupported language short-circuits to a
    /// terminal snapshot without ever touching the executor.
    #[tracing::instrument(skip(self, request))]
    pub async fn submit(&self, request: RunRequest) -> RunTicket {
        let run: Run = request.into();
        tracing::info!("Accepted run {} ({})", run.id, run.language);

        let cancel = CancellationToken::new();
        let (stream_tx, stream_rx) = channel::<Run>(128);
        let ticket = RunTicket {
            id: run.id,
            updates: ReceiverStream::new(stream_rx),
            cancel: cancel.clone(),
        };

        Self::emit(&self.hooks, &stream_tx, run.clone()).await;

        if !run.language.is_supported() {
            let language = run.language.tag().to_string();
            let run = run.change_state(RunState::Unsupported { language });
            Self::emit(&self.hooks, &stream_tx, run).await;
            return ticket;
        }

        let (res_tx, mut res_rx) = channel::<Run>(128);
        let (run_tx, run_rx) = channel::<Run>(128);
        let (prepare_tx, prepare_rx) = channel::<Run>(128);

        handle_preparing(
            res_tx.clone(),
            run_tx,
            prepare_rx,
            self.executor.clone(),
            cancel.clone(),
        );
        handle_running(res_tx, run_rx, self.executor.clone(), cancel.clone());

        self.active.insert(run.id, cancel);
        prepare_tx.send(run.clone()).await.expect(PREPARE_TX_ERR);

        let hooks = self.hooks.clone();
        let active = self.active.clone();
        let id = run.id;
        tokio::spawn(async move {
            while let Some(update) = res_rx.recv().await {
                tracing::debug!("New run state: {:?}", update.state);
                let terminal = update.state.is_terminal();
                Self::emit(&hooks, &stream_tx, update).await;
                if terminal {
                    break;
                }
            }
            active.remove(&id);
        });

        ticket
    }

    /// Submits the request and blocks (asynchronously) until the run ends.
    pub async fn execute(&self, request: RunRequest) -> Run {
        self.submit(request).await.wait().await
    }

    /// Fires the cancellation token of an in-flight run. Returns false for
    /// unknown or already completed ids.
    pub fn cancel(&self, id: Uuid) -> bool {
        match self.active.get(&id) {
            Some(entry) => {
                entry.value().cancel();
                true
            }
            None => false,
        }
    }

    async fn emit(hooks: &[Arc<dyn RunHook>], stream_tx: &Sender<Run>, run: Run) {
        for hook in hooks {
            hook.on_transition(&run);
        }
        // The caller may have dropped the ticket and only observe through
        // hooks; a closed stream is not an error.
        let _ = stream_tx.send(run).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::{
        CompileLimits, ExecutionLimits, Invocation, Language, RunOutput,
    };
    use crate::core::traits::executor::{MockExecutor, RunError};
    use crate::stubs::executor::ExecutorStub;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::time::Duration;

    fn hello_request() -> RunRequest {
        RunRequest {
            language: Language::Python,
            source: "print('hello')".to_string(),
            compile_limits: CompileLimits { time_ms: Some(5000) },
            execution_limits: ExecutionLimits { time_ms: Some(1000) },
        }
    }

    fn interpreter_invocation() -> Invocation {
        Invocation::Interpreter {
            program: PathBuf::from("python3"),
            args: vec!["-c".to_string(), "print('hello')".to_string()],
        }
    }

    fn hello_output() -> RunOutput {
        RunOutput {
            status: Some(0),
            stdout: "hello\n".to_string(),
            stderr: String::new(),
        }
    }

    fn instant_stub() -> Arc<ExecutorStub> {
        Arc::new(ExecutorStub::new(
            Ok(interpreter_invocation()),
            Ok(hello_output()),
            Duration::ZERO,
            Duration::ZERO,
        ))
    }

    fn state_name(state: &RunState) -> &'static str {
        match state {
            RunState::Queued => "Queued",
            RunState::Unsupported { .. } => "Unsupported",
            RunState::Preparing => "Preparing",
            RunState::CompilationFailed { .. } => "CompilationFailed",
            RunState::CompilationTimedOut => "CompilationTimedOut",
            RunState::Prepared(_) => "Prepared",
            RunState::Running => "Running",
            RunState::Finished { .. } => "Finished",
            RunState::Crashed { .. } => "Crashed",
            RunState::TimedOut { .. } => "TimedOut",
            RunState::Cancelled { .. } => "Cancelled",
            RunState::SpawnFailed { .. } => "SpawnFailed",
            RunState::InternalError => "InternalError",
        }
    }

    #[derive(Debug, Default)]
    struct RecordingHook {
        seen: Mutex<Vec<String>>,
    }

    impl RunHook for RecordingHook {
        fn on_transition(&self, run: &Run) {
            self.seen
                .lock()
                .unwrap()
                .push(state_name(&run.state).to_string());
        }
    }

    #[tokio::test]
    async fn test_execute_successful_flow() {
        let runner = CodeRunner::new(instant_stub());

        let run = runner.execute(hello_request()).await;

        if let RunState::Finished { output } = run.state {
            assert_eq!(output, hello_output());
        } else {
            panic!("Expected Finished state, got: {:?}", run.state);
        }
    }

    #[tokio::test]
    async fn test_submit_streams_all_states() {
        let runner = CodeRunner::new(instant_stub());

        let mut ticket = runner.submit(hello_request()).await;

        let mut names = Vec::new();
        while let Some(update) = ticket.updates.next().await {
            names.push(state_name(&update.state).to_string());
        }

        assert_eq!(
            names,
            vec!["Queued", "Preparing", "Prepared", "Running", "Finished"]
        );
    }

    #[tokio::test]
    async fn test_unsupported_language_spawns_nothing() {
        // No expectations set: any executor call panics the test.
        let executor = Arc::new(MockExecutor::new());
        let runner = CodeRunner::new(executor);

        let run = runner
            .execute(RunRequest::new(
                Language::Other("ruby".to_string()),
                "puts 'hello'",
            ))
            .await;

        if let RunState::Unsupported { language } = run.state {
            assert_eq!(language, "ruby");
        } else {
            panic!("Expected Unsupported state, got: {:?}", run.state);
        }
    }

    #[tokio::test]
    async fn test_cancel_in_flight_run() {
        let stub = Arc::new(ExecutorStub::new(
            Ok(interpreter_invocation()),
            Ok(hello_output()),
            Duration::ZERO,
            Duration::from_secs(30),
        ));
        let runner = CodeRunner::new(stub);

        let ticket = runner.submit(hello_request()).await;
        let id = ticket.id;

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(runner.cancel(id));

        let started = std::time::Instant::now();
        let run = ticket.wait().await;
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(matches!(run.state, RunState::Cancelled { .. }));

        // The run is deregistered once it reaches a terminal state.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!runner.cancel(id));
    }

    #[tokio::test]
    async fn test_cancel_unknown_id() {
        let runner = CodeRunner::new(instant_stub());
        assert!(!runner.cancel(Uuid::new_v4()));
    }

    #[tokio::test]
    async fn test_timed_out_run_reported() {
        let stub = Arc::new(ExecutorStub::new(
            Ok(interpreter_invocation()),
            Err(RunError::TimedOut {
                output: RunOutput::empty(),
            }),
            Duration::ZERO,
            Duration::ZERO,
        ));
        let runner = CodeRunner::new(stub);

        let run = runner.execute(hello_request()).await;
        assert!(matches!(run.state, RunState::TimedOut { .. }));
    }

    #[tokio::test]
    async fn test_hooks_observe_every_transition() {
        let hook = Arc::new(RecordingHook::default());
        let mut runner = CodeRunner::new(instant_stub());
        runner.register_hook(hook.clone());

        let _run = runner.execute(hello_request()).await;

        let seen = hook.seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec!["Queued", "Preparing", "Prepared", "Running", "Finished"]
        );
    }

    #[tokio::test]
    async fn test_sequential_executions_idempotent() {
        let runner = CodeRunner::new(instant_stub());

        let first = runner.execute(hello_request()).await;
        let second = runner.execute(hello_request()).await;

        match (first.state, second.state) {
            (
                RunState::Finished { output: a },
                RunState::Finished { output: b },
            ) => assert_eq!(a, b),
            (a, b) => panic!("Expected two Finished states, got: {:?} and {:?}", a, b),
        }
    }
}
