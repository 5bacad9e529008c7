use std::path::{Path, PathBuf};
use std::process::Stdio;

use itertools::Itertools;
use tokio::fs;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::time::{Duration, timeout};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::Toolchain;
use crate::core::domain::{
    Artifact, ArtifactKind, CompileLimits, ExecutionLimits, Invocation, Language, RunOutput,
};
use crate::core::traits::executor::{Executor, PrepareError, RunError};

/// Executes runs against the local toolchain. Every instance owns a unique
/// work directory for C++ artifacts; the directory is removed when the
/// executor is dropped, as a backstop behind the per-run cleanup.
#[derive(Debug)]
pub struct NativeExecutor {
    work_dir: PathBuf,
    toolchain: Toolchain,
}

impl NativeExecutor {
    pub fn new<T: AsRef<Path>>(base_dir: T, toolchain: Toolchain) -> std::io::Result<Self> {
        let work_dir = base_dir
            .as_ref()
            .join(format!("executor_{}", Uuid::new_v4()));
        std::fs::create_dir_all(&work_dir)?;
        Ok(Self {
            work_dir,
            toolchain,
        })
    }

    fn source_path(&self, artifact_id: &Uuid) -> PathBuf {
        self.work_dir.join(format!("{}.cpp", artifact_id))
    }

    fn executable_path(&self, artifact_id: &Uuid) -> PathBuf {
        self.work_dir.join(format!("{}.out", artifact_id))
    }

    async fn compile_cpp(
        &self,
        source: &str,
        limits: &CompileLimits,
    ) -> Result<Invocation, PrepareError> {
        let artifact_id = Uuid::new_v4();
        let source_path = self.source_path(&artifact_id);
        let executable_path = self.executable_path(&artifact_id);

        fs::write(&source_path, source)
            .await
            .map_err(|e| PrepareError::Internal {
                msg: format!("failed to write source file: {}", e),
            })?;

        let mut cmd = Command::new(&self.toolchain.gnucpp);
        cmd.arg("-o")
            .arg(&executable_path)
            .arg(&source_path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        tracing::debug!(
            "$ {} -o {} {}",
            self.toolchain.gnucpp.display(),
            executable_path.display(),
            source_path.display()
        );

        let compile_future = cmd.output();
        let result = if let Some(time_limit_ms) = limits.time_ms {
            match timeout(Duration::from_millis(time_limit_ms), compile_future).await {
                Ok(result) => result,
                Err(_) => {
                    let _ = fs::remove_file(&source_path).await;
                    let _ = fs::remove_file(&executable_path).await;
                    return Err(PrepareError::TimedOut);
                }
            }
        } else {
            compile_future.await
        };

        // The temp source is gone after this point on every path.
        let _ = fs::remove_file(&source_path).await;

        let output = result.map_err(|e| PrepareError::Internal {
            msg: format!(
                "failed to execute {}: {}",
                self.toolchain.gnucpp.display(),
                e
            ),
        })?;

        if !output.status.success() {
            let _ = fs::remove_file(&executable_path).await;
            return Err(PrepareError::CompilationFailed {
                msg: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }

        if !fs::try_exists(&executable_path).await.unwrap_or(false) {
            return Err(PrepareError::Internal {
                msg: format!(
                    "executable was not created at: {}",
                    executable_path.display()
                ),
            });
        }

        Ok(Invocation::Artifact(Artifact {
            id: artifact_id,
            kind: ArtifactKind::Executable,
        }))
    }
}

#[async_trait::async_trait]
impl Executor for NativeExecutor {
    #[tracing::instrument(skip(source))]
    async fn prepare(
        &self,
        source: &str,
        language: &Language,
        limits: &CompileLimits,
    ) -> Result<Invocation, PrepareError> {
        match language {
            Language::Python => Ok(Invocation::Interpreter {
                program: self.toolchain.python.clone(),
                args: vec!["-c".to_string(), source.to_string()],
            }),
            Language::JavaScript => Ok(Invocation::Interpreter {
                program: self.toolchain.node.clone(),
                args: vec!["-e".to_string(), source.to_string()],
            }),
            Language::GnuCpp => self.compile_cpp(source, limits).await,
            Language::Other(tag) => Err(PrepareError::Unsupported(tag.clone())),
        }
    }

    #[tracing::instrument]
    async fn run(
        &self,
        invocation: &Invocation,
        limits: &ExecutionLimits,
        cancel: &CancellationToken,
    ) -> Result<RunOutput, RunError> {
        let (program, args) = match invocation {
            Invocation::Interpreter { program, args } => (program.clone(), args.clone()),
            Invocation::Artifact(artifact) => (self.executable_path(&artifact.id), Vec::new()),
        };

        tracing::debug!("$ {} {}", program.display(), args.iter().join(" "));

        let mut cmd = Command::new(&program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| RunError::SpawnFailed {
            msg: e.to_string(),
        })?;

        let stdout_task = tokio::spawn(drain(child.stdout.take()));
        let stderr_task = tokio::spawn(drain(child.stderr.take()));

        let deadline = limits.time_ms.map(Duration::from_millis);
        let outcome = wait_child(&mut child, deadline, cancel)
            .await
            .map_err(|e| RunError::Internal {
                msg: format!("failed to wait for process: {}", e),
            })?;

        if !matches!(outcome, WaitOutcome::Exited(_)) {
            // wait returned early; stop the child before collecting what it
            // managed to write.
            let _ = child.kill().await;
        }

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();

        match outcome {
            WaitOutcome::Exited(status) => {
                let output = RunOutput {
                    status: status.code(),
                    stdout,
                    stderr,
                };
                match output.status {
                    Some(_) => Ok(output),
                    // No exit code means the child was taken down by a signal.
                    None => Err(RunError::Crash { output }),
                }
            }
            WaitOutcome::TimedOut => Err(RunError::TimedOut {
                output: RunOutput {
                    status: None,
                    stdout,
                    stderr,
                },
            }),
            WaitOutcome::Cancelled => Err(RunError::Cancelled {
                output: RunOutput {
                    status: None,
                    stdout,
                    stderr,
                },
            }),
        }
    }

    #[tracing::instrument]
    async fn cleanup(&self, invocation: &Invocation) {
        if let Invocation::Artifact(artifact) = invocation {
            let _ = fs::remove_file(self.executable_path(&artifact.id)).await;
        }
    }
}

#[derive(Debug)]
enum WaitOutcome {
    Exited(std::process::ExitStatus),
    TimedOut,
    Cancelled,
}

async fn wait_child(
    child: &mut Child,
    deadline: Option<Duration>,
    cancel: &CancellationToken,
) -> std::io::Result<WaitOutcome> {
    if let Some(deadline) = deadline {
        tokio::select! {
            status = child.wait() => Ok(WaitOutcome::Exited(status?)),
            _ = cancel.cancelled() => Ok(WaitOutcome::Cancelled),
            _ = tokio::time::sleep(deadline) => Ok(WaitOutcome::TimedOut),
        }
    } else {
        tokio::select! {
            status = child.wait() => Ok(WaitOutcome::Exited(status?)),
            _ = cancel.cancelled() => Ok(WaitOutcome::Cancelled),
        }
    }
}

async fn drain<R>(pipe: Option<R>) -> String
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    let Some(mut pipe) = pipe else {
        return String::new();
    };
    let mut buf = Vec::new();
    let _ = pipe.read_to_end(&mut buf).await;
    String::from_utf8_lossy(&buf).to_string()
}

impl Drop for NativeExecutor {
    fn drop(&mut self) {
        // Clean up this executor's specific work directory
        let _ = std::fs::remove_dir_all(&self.work_dir);
    }
}
