use std::env;
use std::path::PathBuf;

/// Paths of the external tools the executor shells out to. Each one can be
/// overridden through the environment; the defaults are resolved through
/// PATH by the OS at spawn time.
#[derive(Clone, Debug)]
pub struct Toolchain {
    pub python: PathBuf,
    pub node: PathBuf,
    pub gnucpp: PathBuf,
}

impl Toolchain {
    pub fn from_env() -> Self {
        Self {
            python: path_from_env("CODERUN_PYTHON_PATH", "python3"),
            node: path_from_env("CODERUN_NODE_PATH", "node"),
            gnucpp: path_from_env("CODERUN_GNUCPP_PATH", "g++"),
        }
    }
}

impl Default for Toolchain {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Base directory under which each executor instance creates its own work
/// directory.
pub fn default_work_dir() -> PathBuf {
    env::var("CODERUN_WORK_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| env::temp_dir().join("coderun"))
}

fn path_from_env(var: &str, default: &str) -> PathBuf {
    env::var(var)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(default))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_resolve_through_path() {
        // The variables are not normally set in the test environment, so
        // the plain command names come back.
        let toolchain = Toolchain::from_env();
        if env::var("CODERUN_GNUCPP_PATH").is_err() {
            assert_eq!(toolchain.gnucpp, PathBuf::from("g++"));
        }
    }

    #[test]
    fn test_work_dir_under_temp() {
        if env::var("CODERUN_WORK_DIR").is_err() {
            assert!(default_work_dir().starts_with(env::temp_dir()));
        }
    }
}
