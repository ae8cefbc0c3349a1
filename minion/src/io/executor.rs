//! Action executor: performs proposed operations against the repository.
//!
//! The [`Executor`] trait decouples the agent loop from the filesystem and
//! process spawning. [`RepoExecutor`] is the real implementation; tests use
//! recording or scripted executors that never touch the disk.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::core::path::confine;
use crate::core::types::{ActionRequest, ActionResult, FailureKind};
use crate::io::process::{ProcessError, run_command_with_timeout};

/// Limits applied to `run-command` actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLimits {
    /// Timeout used when the proposal does not name one.
    pub default_timeout: Duration,
    /// Upper bound for proposal-supplied timeouts.
    pub max_timeout: Duration,
    /// Bytes kept per output stream.
    pub output_limit_bytes: usize,
}

impl Default for CommandLimits {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(120),
            max_timeout: Duration::from_secs(900),
            output_limit_bytes: 100_000,
        }
    }
}

impl CommandLimits {
    /// Effective timeout for a proposal.
    pub fn timeout_for(&self, requested_secs: Option<u64>) -> Duration {
        match requested_secs {
            Some(secs) if secs > 0 => Duration::from_secs(secs).min(self.max_timeout),
            _ => self.default_timeout,
        }
    }
}

/// Executor-level failure. Always captured into a failed [`ActionResult`].
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("access denied: '{path}' resolves outside the repository root")]
    AccessDenied { path: String },
    #[error("not found: '{path}'")]
    NotFound { path: String },
    #[error("i/o error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("command timed out after {}s", timeout.as_secs_f64())]
    Timeout {
        timeout: Duration,
        /// Output captured before the process was killed.
        partial_output: String,
    },
    #[error("failed to launch command: {0}")]
    Spawn(String),
    #[error("'finish' is handled by the agent loop and cannot be executed")]
    NotExecutable,
}

impl ActionError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ActionError::AccessDenied { .. } => FailureKind::AccessDenied,
            ActionError::NotFound { .. } => FailureKind::NotFound,
            ActionError::Io { .. } | ActionError::NotExecutable => FailureKind::IoError,
            ActionError::Timeout { .. } => FailureKind::Timeout,
            ActionError::Spawn(_) => FailureKind::SpawnError,
        }
    }

    /// Convert into the failed result fed back to the reasoning backend.
    pub fn into_result(self) -> ActionResult {
        let kind = self.kind();
        let detail = self.to_string();
        let mut result = ActionResult::failed(kind, detail);
        if let ActionError::Timeout { partial_output, .. } = self {
            result.output = partial_output;
        }
        result
    }
}

/// Abstraction over action execution backends.
pub trait Executor {
    /// Execute one non-`finish` action. Blocks until the action is done.
    fn execute(&self, request: &ActionRequest) -> Result<ActionResult, ActionError>;
}

impl<E: Executor + ?Sized> Executor for &E {
    fn execute(&self, request: &ActionRequest) -> Result<ActionResult, ActionError> {
        (**self).execute(request)
    }
}

/// Executor confined to a canonical repository root.
#[derive(Debug, Clone)]
pub struct RepoExecutor {
    root: PathBuf,
    limits: CommandLimits,
}

impl RepoExecutor {
    /// Create an executor rooted at `root`, which is canonicalized here.
    pub fn new(root: &Path, limits: CommandLimits) -> io::Result<Self> {
        let root = root.canonicalize()?;
        if !root.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("{} is not a directory", root.display()),
            ));
        }
        Ok(Self { root, limits })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    #[instrument(skip_all, fields(path = %requested))]
    pub fn read_file(&self, requested: &str) -> Result<ActionResult, ActionError> {
        let path = self.resolve(requested)?;
        let bytes = fs::read(&path).map_err(|source| map_io(requested, source))?;
        debug!(bytes = bytes.len(), "read file");
        Ok(ActionResult::ok(String::from_utf8_lossy(&bytes)))
    }

    /// Create or overwrite a file. Content goes to a temp file in the target
    /// directory first and is renamed into place, so a failed write leaves
    /// the previous file (or nothing) on disk.
    #[instrument(skip_all, fields(path = %requested, bytes = content.len()))]
    pub fn write_file(&self, requested: &str, content: &str) -> Result<ActionResult, ActionError> {
        let path = self.resolve(requested)?;
        let parent = path
            .parent()
            .ok_or_else(|| ActionError::AccessDenied {
                path: requested.to_string(),
            })?
            .to_path_buf();
        if path.is_dir() {
            return Err(ActionError::Io {
                path: requested.to_string(),
                source: io::Error::new(io::ErrorKind::IsADirectory, "path is a directory"),
            });
        }
        fs::create_dir_all(&parent).map_err(|source| map_io(requested, source))?;

        let mut temp =
            tempfile::NamedTempFile::new_in(&parent).map_err(|source| map_io(requested, source))?;
        temp.write_all(content.as_bytes())
            .and_then(|()| temp.as_file().sync_all())
            .map_err(|source| map_io(requested, source))?;
        temp.persist(&path)
            .map_err(|err| map_io(requested, err.error))?;

        info!("wrote file");
        Ok(ActionResult::ok(format!(
            "wrote {} bytes to {requested}",
            content.len()
        )))
    }

    #[instrument(skip_all, fields(command = %command))]
    pub fn run_command(
        &self,
        command: &str,
        timeout_secs: Option<u64>,
    ) -> Result<ActionResult, ActionError> {
        let timeout = self.limits.timeout_for(timeout_secs);
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command).current_dir(&self.root);

        let output = match run_command_with_timeout(cmd, timeout, self.limits.output_limit_bytes) {
            Ok(output) => output,
            Err(ProcessError::Spawn(e)) => return Err(ActionError::Spawn(e.to_string())),
            Err(ProcessError::Io { context, source }) => {
                return Err(ActionError::Io {
                    path: format!("<{context}>"),
                    source,
                });
            }
        };

        let rendered = render_command_output(
            &String::from_utf8_lossy(&output.stdout),
            &(String::from_utf8_lossy(&output.stderr).into_owned()
                + &output.stdout_truncated_notice("command")
                + &output.stderr_truncated_notice("command")),
            output.status.code(),
        );

        if output.timed_out {
            warn!(timeout_secs = timeout.as_secs(), "command timed out");
            return Err(ActionError::Timeout {
                timeout,
                partial_output: rendered,
            });
        }

        let exit_code = output.status.code();
        debug!(?exit_code, "command completed");
        Ok(ActionResult {
            success: output.status.success(),
            output: rendered,
            exit_code,
            error: None,
        })
    }

    /// Confine `requested` to the root: lexical check first (no filesystem
    /// access), then canonicalize the deepest existing ancestor so symlinks
    /// cannot lead outside.
    fn resolve(&self, requested: &str) -> Result<PathBuf, ActionError> {
        let denied = || ActionError::AccessDenied {
            path: requested.to_string(),
        };
        let lexical = confine(&self.root, requested).ok_or_else(denied)?;

        let mut existing = lexical.as_path();
        let mut rest = Vec::new();
        while fs::symlink_metadata(existing).is_err() {
            let Some(name) = existing.file_name() else {
                return Err(denied());
            };
            rest.push(name.to_os_string());
            existing = existing.parent().ok_or_else(denied)?;
        }

        let mut resolved = existing
            .canonicalize()
            .map_err(|source| map_io(requested, source))?;
        if !resolved.starts_with(&self.root) {
            warn!(path = requested, "symlink escapes repository root");
            return Err(denied());
        }
        for name in rest.into_iter().rev() {
            resolved.push(name);
        }
        Ok(resolved)
    }
}

impl Executor for RepoExecutor {
    fn execute(&self, request: &ActionRequest) -> Result<ActionResult, ActionError> {
        match request {
            ActionRequest::ReadFile { path } => self.read_file(path),
            ActionRequest::WriteFile { path, content } => self.write_file(path, content),
            ActionRequest::RunCommand {
                command,
                timeout_secs,
            } => self.run_command(command, *timeout_secs),
            ActionRequest::Finish { .. } => Err(ActionError::NotExecutable),
        }
    }
}

fn map_io(path: &str, source: io::Error) -> ActionError {
    match source.kind() {
        io::ErrorKind::NotFound => ActionError::NotFound {
            path: path.to_string(),
        },
        _ => ActionError::Io {
            path: path.to_string(),
            source,
        },
    }
}

fn render_command_output(stdout: &str, stderr: &str, exit_code: Option<i32>) -> String {
    let status = exit_code
        .map(|code| code.to_string())
        .unwrap_or_else(|| "killed by signal".to_string());
    format!("stdout:\n```\n{stdout}\n```\nstderr:\n```\n{stderr}\n```\nexit status: {status}\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn executor(root: &Path) -> RepoExecutor {
        RepoExecutor::new(root, CommandLimits::default()).expect("executor")
    }

    #[test]
    fn write_then_read_round_trips_content() {
        let temp = tempfile::tempdir().expect("tempdir");
        let exec = executor(temp.path());

        let written = exec
            .write_file("docs/notes/README.md", "hello\nworld")
            .expect("write");
        assert!(written.success);
        assert!(written.output.contains("11 bytes"));

        let read = exec.read_file("docs/notes/README.md").expect("read");
        assert_eq!(read.output, "hello\nworld");
    }

    #[test]
    fn write_overwrites_and_leaves_no_temp_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let exec = executor(temp.path());
        exec.write_file("a.txt", "old").expect("write");
        exec.write_file("a.txt", "new").expect("write");

        assert_eq!(
            fs::read_to_string(temp.path().join("a.txt")).expect("read"),
            "new"
        );
        let names: Vec<_> = fs::read_dir(temp.path())
            .expect("read dir")
            .map(|e| e.expect("entry").file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("a.txt")]);
    }

    #[test]
    fn read_missing_file_is_not_found() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = executor(temp.path()).read_file("missing.txt").unwrap_err();
        assert_eq!(err.kind(), FailureKind::NotFound);
    }

    #[test]
    fn traversal_is_denied_for_read_and_write() {
        let temp = tempfile::tempdir().expect("tempdir");
        let repo = temp.path().join("repo");
        fs::create_dir(&repo).expect("mkdir");
        let exec = executor(&repo);

        let err = exec.read_file("../../etc/passwd").unwrap_err();
        assert_eq!(err.kind(), FailureKind::AccessDenied);

        let err = exec.write_file("../outside.txt", "x").unwrap_err();
        assert_eq!(err.kind(), FailureKind::AccessDenied);
        assert!(!temp.path().join("outside.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn symlink_leading_outside_is_denied() {
        let temp = tempfile::tempdir().expect("tempdir");
        let repo = temp.path().join("repo");
        let outside = temp.path().join("outside");
        fs::create_dir(&repo).expect("mkdir repo");
        fs::create_dir(&outside).expect("mkdir outside");
        fs::write(outside.join("secret.txt"), "secret").expect("write secret");
        std::os::unix::fs::symlink(&outside, repo.join("link")).expect("symlink");

        let exec = executor(&repo);
        let err = exec.read_file("link/secret.txt").unwrap_err();
        assert_eq!(err.kind(), FailureKind::AccessDenied);
        let err = exec.write_file("link/new.txt", "x").unwrap_err();
        assert_eq!(err.kind(), FailureKind::AccessDenied);
        assert!(!outside.join("new.txt").exists());
    }

    #[test]
    fn writing_onto_a_directory_is_an_io_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::create_dir(temp.path().join("dir")).expect("mkdir");
        let err = executor(temp.path()).write_file("dir", "x").unwrap_err();
        assert_eq!(err.kind(), FailureKind::IoError);
    }

    #[cfg(unix)]
    #[test]
    fn run_command_uses_repo_root_and_reports_exit_code() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("marker.txt"), "").expect("write");
        let exec = executor(temp.path());

        let ok = exec.run_command("ls", None).expect("run");
        assert!(ok.success);
        assert!(ok.output.contains("marker.txt"));
        assert_eq!(ok.exit_code, Some(0));

        let failed = exec.run_command("echo boom >&2; exit 7", None).expect("run");
        assert!(!failed.success);
        assert_eq!(failed.exit_code, Some(7));
        assert!(failed.output.contains("boom"));
        assert!(failed.error.is_none());
    }

    #[cfg(unix)]
    #[test]
    fn run_command_times_out() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = executor(temp.path())
            .run_command("echo started; sleep 100", Some(1))
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::Timeout);
        let result = err.into_result();
        assert!(result.output.contains("started"));
        assert_eq!(result.failure_kind(), Some(FailureKind::Timeout));
    }

    #[cfg(unix)]
    #[test]
    fn run_command_background_child_does_not_outlive_the_timeout() {
        let temp = tempfile::tempdir().expect("tempdir");
        let start = std::time::Instant::now();
        let err = executor(temp.path())
            .run_command("sleep 8 & echo hi", Some(1))
            .unwrap_err();
        assert!(start.elapsed() < Duration::from_secs(6));
        assert_eq!(err.kind(), FailureKind::Timeout);
        assert!(err.into_result().output.contains("hi"));
    }

    #[cfg(unix)]
    #[test]
    fn os_permission_denied_is_an_io_error_not_access_denied() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::tempdir().expect("tempdir");
        let locked = temp.path().join("locked");
        fs::create_dir(&locked).expect("mkdir");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o555)).expect("chmod");
        // Root ignores directory permissions; nothing to observe then.
        let enforced = fs::write(locked.join("check"), "").is_err();

        let result = executor(temp.path()).write_file("locked/new.txt", "x");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).expect("chmod");

        if enforced {
            let err = result.unwrap_err();
            assert_eq!(err.kind(), FailureKind::IoError);
            assert!(!locked.join("new.txt").exists());
        }
    }

    #[test]
    fn finish_is_not_executable() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = executor(temp.path())
            .execute(&ActionRequest::Finish {
                message: "done".to_string(),
            })
            .unwrap_err();
        assert!(matches!(err, ActionError::NotExecutable));
    }

    #[test]
    fn timeouts_are_clamped_and_defaulted() {
        let limits = CommandLimits {
            default_timeout: Duration::from_secs(5),
            max_timeout: Duration::from_secs(60),
            output_limit_bytes: 10,
        };
        assert_eq!(limits.timeout_for(None), Duration::from_secs(5));
        assert_eq!(limits.timeout_for(Some(0)), Duration::from_secs(5));
        assert_eq!(limits.timeout_for(Some(30)), Duration::from_secs(30));
        assert_eq!(limits.timeout_for(Some(3600)), Duration::from_secs(60));
    }
}
