//! Git adapter used to record a completed task's changes.
//!
//! A small, explicit wrapper around `git` subprocess calls. Failures are
//! reported with `anyhow` context; the session decides whether they matter.

use std::path::PathBuf;
use std::process::{Command, Output, Stdio};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument};

/// Commit identity passed with `-c user.name=.. -c user.email=..`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub email: String,
}

/// What a completion commit recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitSummary {
    /// Short id of the new commit, `None` when nothing changed.
    pub commit: Option<String>,
    pub changed_files: Vec<String>,
}

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
    identity: Option<Identity>,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            identity: None,
        }
    }

    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// True if the workdir is inside a git work tree. Never errors.
    pub fn is_work_tree(&self) -> bool {
        match self.run(&["rev-parse", "--is-inside-work-tree"]) {
            Ok(out) => out.status.success() && String::from_utf8_lossy(&out.stdout).trim() == "true",
            Err(_) => false,
        }
    }

    /// `git init` the workdir.
    pub fn init(&self) -> Result<()> {
        self.run_checked(&["init", "--quiet"])?;
        Ok(())
    }

    /// Return the current HEAD short SHA.
    pub fn head_short_sha(&self, len: usize) -> Result<String> {
        let arg = format!("--short={len}");
        let out = self.run_capture(&["rev-parse", &arg, "HEAD"])?;
        Ok(out.trim().to_string())
    }

    /// Stage all changes (respects .gitignore).
    pub fn add_all(&self) -> Result<()> {
        self.run_checked(&["add", "-A"])?;
        Ok(())
    }

    /// Paths staged for commit, relative to the repository root.
    pub fn staged_paths(&self) -> Result<Vec<String>> {
        let out = self.run_checked(&["diff", "--cached", "--name-only", "-z"])?;
        Ok(split_nul(&out.stdout))
    }

    /// Commit staged changes with a message.
    ///
    /// If there are no staged changes, this returns Ok(false) and does nothing.
    #[instrument(skip_all)]
    pub fn commit_staged(&self, message: &str) -> Result<bool> {
        if self.staged_paths()?.is_empty() {
            debug!("no staged changes, skipping commit");
            return Ok(false);
        }
        debug!("committing staged changes");
        self.run_checked(&["commit", "--quiet", "--no-verify", "-m", message])?;
        Ok(true)
    }

    /// Stage everything and commit it; reports the commit and the changed paths.
    #[instrument(skip_all, fields(workdir = %self.workdir.display()))]
    pub fn commit_all(&self, message: &str) -> Result<CommitSummary> {
        self.add_all()?;
        let changed_files = self.staged_paths()?;
        if !self.commit_staged(message)? {
            return Ok(CommitSummary {
                commit: None,
                changed_files,
            });
        }
        let commit = self.head_short_sha(12)?;
        debug!(%commit, files = changed_files.len(), "recorded completion commit");
        Ok(CommitSummary {
            commit: Some(commit),
            changed_files,
        })
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        let mut cmd = Command::new("git");
        if let Some(identity) = &self.identity {
            cmd.arg("-c")
                .arg(format!("user.name={}", identity.name))
                .arg("-c")
                .arg(format!("user.email={}", identity.email));
        }
        cmd.args(args)
            .current_dir(&self.workdir)
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}

fn split_nul(bytes: &[u8]) -> Vec<String> {
    bytes
        .split(|b| *b == 0)
        .filter(|chunk| !chunk.is_empty())
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect()
}
