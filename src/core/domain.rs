use std::path::PathBuf;

use uuid::Uuid;

/// A single run of a source snippet, from submission to terminal state.
///
/// Snapshots of this value are streamed to the caller on every state
/// transition.
#[derive(Clone, Debug)]
pub struct Run {
    pub id: Uuid,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub language: Language,
    pub source: String,
    pub compile_limits: CompileLimits,
    pub execution_limits: ExecutionLimits,
    pub state: RunState,
}

impl Run {
    pub fn change_state(&self, new_state: RunState) -> Self {
        Self {
            state: new_state,
            updated_at: chrono::Utc::now(),
            ..self.clone()
        }
    }
}

/// What the caller hands in; everything else on [`Run`] is assigned at
/// submission time.
#[derive(Clone, Debug)]
pub struct RunRequest {
    pub language: Language,
    pub source: String,
    pub compile_limits: CompileLimits,
    pub execution_limits: ExecutionLimits,
}

impl RunRequest {
    pub fn new(language: Language, source: impl Into<String>) -> Self {
        Self {
            language,
            source: source.into(),
            compile_limits: CompileLimits::default(),
            execution_limits: ExecutionLimits::default(),
        }
    }
}

impl From<RunRequest> for Run {
    fn from(request: RunRequest) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            language: request.language,
            source: request.source,
            compile_limits: request.compile_limits,
            execution_limits: request.execution_limits,
            state: RunState::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Language {
    Python,
    JavaScript,
    GnuCpp,
    /// A language tag this crate has no backend for. Accepted at the API
    /// boundary, rejected by validation before any process is spawned.
    Other(String),
}

impl Language {
    /// Total parse; unknown tags land in [`Language::Other`].
    pub fn from_tag(tag: &str) -> Self {
        match tag.to_ascii_lowercase().as_str() {
            "python" | "py" => Language::Python,
            "javascript" | "js" | "node" => Language::JavaScript,
            "cpp" | "c++" | "gnucpp" => Language::GnuCpp,
            _ => Language::Other(tag.to_string()),
        }
    }

    pub fn tag(&self) -> &str {
        match self {
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::GnuCpp => "cpp",
            Language::Other(tag) => tag,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Language::Other(_))
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompileLimits {
    pub time_ms: Option<u64>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecutionLimits {
    pub time_ms: Option<u64>,
}

#[derive(Clone, Debug)]
pub enum RunState {
    Queued,
    Unsupported { language: String },

    Preparing,
    CompilationFailed { msg: String },
    CompilationTimedOut,
    Prepared(Invocation),

    Running,
    Finished { output: RunOutput },
    Crashed { output: RunOutput },
    TimedOut { output: RunOutput },
    Cancelled { output: Option<RunOutput> },
    SpawnFailed { msg: String },
    InternalError,
}

impl RunState {
    /// Terminal states end the snapshot stream; no further transitions
    /// follow them.
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            RunState::Queued | RunState::Preparing | RunState::Prepared(_) | RunState::Running
        )
    }
}

impl Default for RunState {
    fn default() -> Self {
        RunState::Queued
    }
}

/// Captured output of a finished child process. Both streams are kept
/// distinct; `status` is `None` when the child never exited normally
/// (signal, timeout, cancellation).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunOutput {
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl RunOutput {
    pub fn empty() -> Self {
        Self {
            status: None,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    /// stdout followed by stderr, for terminal-style display.
    pub fn combined(&self) -> String {
        let mut combined = String::with_capacity(self.stdout.len() + self.stderr.len());
        combined.push_str(&self.stdout);
        combined.push_str(&self.stderr);
        combined
    }
}

/// How to launch the prepared program.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Invocation {
    /// Inline-eval through an interpreter; no file is ever written.
    Interpreter { program: PathBuf, args: Vec<String> },
    /// A compiled binary owned by the executor's work directory.
    Artifact(Artifact),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Artifact {
    pub id: Uuid,
    pub kind: ArtifactKind,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArtifactKind {
    Executable,
}
