//! Discovery and invocation of external matching executables.

use std::env;
use std::ffi::OsString;
use std::fmt::Debug;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::ToolFailure;

/// Environment variable naming a directory that holds the matching executables.
pub const TOOL_DIR_ENV: &str = "CATCORR_TOOL_DIR";

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Finds `name` in, in order: `explicit_dir`, `$CATCORR_TOOL_DIR`, each `PATH` entry.
///
/// Nothing is cached; every call re-reads the environment.
pub fn locate_executable(name: &str, explicit_dir: Option<&Path>) -> Result<PathBuf, ToolFailure> {
    let mut dirs: Vec<PathBuf> = explicit_dir.into_iter().map(Path::to_path_buf).collect();
    if let Some(dir) = env::var_os(TOOL_DIR_ENV).filter(|d| !d.is_empty()) {
        dirs.push(PathBuf::from(dir));
    }
    if let Some(path) = env::var_os("PATH") {
        dirs.extend(env::split_paths(&path));
    }

    for dir in &dirs {
        let candidate = dir.join(name);
        if is_executable(&candidate) {
            return Ok(candidate);
        }
    }

    let searched = if dirs.is_empty() {
        "no search directories".to_string()
    } else {
        dirs.iter()
            .map(|d| d.display().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    };
    Err(ToolFailure::MissingExecutable {
        name: name.to_string(),
        searched,
    })
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file() || path.with_extension("exe").is_file()
}

/// A fully prepared external tool call.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub working_dir: PathBuf,
    /// Files the tool's stdout and stderr are redirected to.
    pub stdout_path: PathBuf,
    pub stderr_path: PathBuf,
    pub timeout: Option<Duration>,
    /// Result tables the tool must leave behind, in catalogue order (A, B).
    pub expected_outputs: Vec<PathBuf>,
}

impl ToolInvocation {
    /// The value of the first `key=value` argument, if present.
    pub fn keyword(&self, key: &str) -> Option<String> {
        let prefix = format!("{key}=");
        self.args
            .iter()
            .filter_map(|arg| arg.to_str())
            .find_map(|arg| arg.strip_prefix(&prefix).map(str::to_string))
    }

    /// Shell-like rendering for logs.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_os_str())
            .chain(self.args.iter().map(OsString::as_os_str))
            .map(|s| s.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// How the tool terminated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolStatus {
    Success,
    Failed(String),
    TimedOut(Duration),
}

#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub status: ToolStatus,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

impl ToolOutput {
    /// Diagnostic text worth surfacing: stderr, or stdout if stderr is empty.
    pub fn diagnostics(&self) -> &str {
        if self.stderr.trim().is_empty() {
            self.stdout.trim()
        } else {
            self.stderr.trim()
        }
    }
}

/// Executes tool invocations.
///
/// Owned by a backend; the default [`ProcessRunner`] spawns real processes.
pub trait ToolRunner: Debug + Send + Sync {
    /// Resolves the executable for `name`. Called on every correlation.
    fn locate(&self, name: &str, explicit_dir: Option<&Path>) -> Result<PathBuf, ToolFailure> {
        locate_executable(name, explicit_dir)
    }

    /// Runs to completion (or until the timeout). A non-zero exit is reported
    /// through [`ToolStatus`], not as an error.
    fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput, ToolFailure>;
}

/// Runs tools as blocking child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

impl ToolRunner for ProcessRunner {
    fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput, ToolFailure> {
        let stdout = create_capture(&invocation.stdout_path)?;
        let stderr = create_capture(&invocation.stderr_path)?;

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .current_dir(&invocation.working_dir)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr);

        tracing::debug!("Command: {}", invocation.command_line());

        let start = Instant::now();
        let mut child = cmd.spawn().map_err(ToolFailure::Spawn)?;

        let status = loop {
            let exit = child.try_wait().map_err(|source| ToolFailure::Io {
                path: invocation.program.clone(),
                source,
            })?;
            if let Some(exit) = exit {
                break describe_exit(exit);
            }

            let elapsed = start.elapsed();
            if let Some(limit) = invocation.timeout {
                if elapsed >= limit {
                    if let Err(err) = child.kill() {
                        tracing::warn!("Failed to kill timed out tool: {}", err);
                    }
                    if let Err(err) = child.wait() {
                        tracing::warn!("Failed to reap timed out tool: {}", err);
                    }
                    break ToolStatus::TimedOut(limit);
                }
                thread::sleep(POLL_INTERVAL.min(limit - elapsed));
            } else {
                thread::sleep(POLL_INTERVAL);
            }
        };

        Ok(ToolOutput {
            status,
            stdout: read_capture(&invocation.stdout_path),
            stderr: read_capture(&invocation.stderr_path),
            elapsed: start.elapsed(),
        })
    }
}

fn create_capture(path: &Path) -> Result<File, ToolFailure> {
    File::create(path).map_err(|source| ToolFailure::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn read_capture(path: &Path) -> String {
    std::fs::read(path)
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

fn describe_exit(exit: ExitStatus) -> ToolStatus {
    if exit.success() {
        ToolStatus::Success
    } else {
        ToolStatus::Failed(exit.to_string())
    }
}
