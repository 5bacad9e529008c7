use std::io::Read;
use std::panic;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use coderun::config::{Toolchain, default_work_dir};
use coderun::core::domain::{CompileLimits, ExecutionLimits, Language, Run, RunRequest, RunState};
use coderun::native::executor::NativeExecutor;
use coderun::service::CodeRunner;

#[derive(Parser, Debug)]
#[clap(
    name = "coderun",
    version,
    about = "Run a source snippet with the local toolchain"
)]
struct Cli {
    #[clap(long, short, help = "Language of the source: python, javascript or cpp")]
    language: String,

    #[clap(help = "Path to the source file, or - to read from stdin")]
    file: String,

    #[clap(long, help = "Kill the program after this many milliseconds")]
    time_limit_ms: Option<u64>,

    #[clap(long, help = "Abort compilation after this many milliseconds")]
    compile_time_limit_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    set_panic_hook();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(msg) => {
            eprintln!("coderun: {}", msg);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, String> {
    let source = read_source(&cli.file)?;
    let language = Language::from_tag(&cli.language);

    let executor = NativeExecutor::new(default_work_dir(), Toolchain::from_env())
        .map_err(|e| format!("failed to create work directory: {}", e))?;
    let runner = CodeRunner::new(Arc::new(executor));

    let request = RunRequest {
        language,
        source,
        compile_limits: CompileLimits {
            time_ms: cli.compile_time_limit_ms,
        },
        execution_limits: ExecutionLimits {
            time_ms: cli.time_limit_ms,
        },
    };

    report(runner.execute(request).await)
}

/// Writes the captured streams to our own stdout/stderr and converts the
/// terminal state into the process exit code.
fn report(run: Run) -> Result<ExitCode, String> {
    match run.state {
        RunState::Finished { output } => {
            print!("{}", output.stdout);
            eprint!("{}", output.stderr);
            Ok(exit_code_for(output.status))
        }
        RunState::Crashed { output } => {
            print!("{}", output.stdout);
            eprint!("{}", output.stderr);
            Err("process terminated abnormally".to_string())
        }
        RunState::TimedOut { output } => {
            print!("{}", output.stdout);
            eprint!("{}", output.stderr);
            Err("process exceeded the time limit".to_string())
        }
        RunState::Cancelled { .. } => Err("run was cancelled".to_string()),
        RunState::CompilationFailed { msg } => Err(format!("compilation failed:\n{}", msg)),
        RunState::CompilationTimedOut => Err("compilation exceeded the time limit".to_string()),
        RunState::Unsupported { language } => Err(format!(
            "running '{}' code is not supported yet",
            language
        )),
        RunState::SpawnFailed { msg } => Err(msg),
        RunState::InternalError => Err("internal error".to_string()),
        other => Err(format!("run ended in unexpected state: {:?}", other)),
    }
}

fn exit_code_for(status: Option<i32>) -> ExitCode {
    match status {
        Some(code) => ExitCode::from(code.clamp(0, 255) as u8),
        None => ExitCode::FAILURE,
    }
}

fn read_source(file: &str) -> Result<String, String> {
    if file == "-" {
        let mut source = String::new();
        std::io::stdin()
            .read_to_string(&mut source)
            .map_err(|e| format!("failed to read stdin: {}", e))?;
        Ok(source)
    } else {
        std::fs::read_to_string(file).map_err(|e| format!("failed to read {}: {}", file, e))
    }
}

fn set_panic_hook() {
    panic::set_hook(Box::new(|panic_info| {
        tracing::error!(
            message = "panic occurred",
            panic = %panic_info
        );
    }));
}
