//! Child-process git runner.
//!
//! The plain repository is a bare store whose working tree is an ordinary
//! directory, so every invocation carries explicit `--git-dir`/`--work-tree`
//! overrides; the encrypted repository is addressed with `-C`. Output is
//! captured, stderr is folded into the error on failure, and trailing
//! newlines are chomped.

use crate::error::{MybaError, Result};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct Git {
    git_dir: Option<PathBuf>,
    work_tree: Option<PathBuf>,
    dir: Option<PathBuf>,
}

impl Git {
    /// Bare repository at `git_dir` with `work_tree` as its aliased tree.
    pub fn bare_alias(git_dir: impl AsRef<Path>, work_tree: impl AsRef<Path>) -> Self {
        Git {
            git_dir: Some(git_dir.as_ref().to_path_buf()),
            work_tree: Some(work_tree.as_ref().to_path_buf()),
            dir: None,
        }
    }

    /// Ordinary repository rooted at `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Git {
            git_dir: None,
            work_tree: None,
            dir: Some(dir.as_ref().to_path_buf()),
        }
    }

    /// Same repository, different aliased working tree.
    pub fn with_work_tree(&self, work_tree: impl AsRef<Path>) -> Self {
        Git {
            git_dir: self.git_dir.clone(),
            work_tree: Some(work_tree.as_ref().to_path_buf()),
            dir: self.dir.clone(),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new("git");
        if let Some(dir) = &self.dir {
            cmd.arg("-C").arg(dir);
        }
        if let Some(git_dir) = &self.git_dir {
            cmd.arg("--git-dir").arg(git_dir);
        }
        if let Some(work_tree) = &self.work_tree {
            cmd.arg("--work-tree").arg(work_tree);
        }
        cmd
    }

    fn spawn_captured<I, S>(&self, args: I, envs: &[(&str, &str)]) -> Result<Output>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = self.command();
        cmd.args(args);
        for (k, v) in envs {
            cmd.env(k, v);
        }
        debug!("running {:?}", cmd);
        Ok(cmd.stdin(Stdio::null()).output()?)
    }

    fn fail(output: &Output, what: &str) -> MybaError {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut detail = stderr.trim().to_owned();
        if detail.is_empty() {
            detail = stdout.trim().to_owned();
        }
        MybaError::GitCommand {
            command: what.to_owned(),
            detail,
        }
    }

    /// Run, capture stdout as UTF-8, chomp the trailing newline.
    pub fn run<I, S>(&self, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.run_with_env(args, &[])
    }

    pub fn run_with_env<I, S>(&self, args: I, envs: &[(&str, &str)]) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<_> = args.into_iter().collect();
        let what = describe(&args);
        let output = self.spawn_captured(args, envs)?;
        if !output.status.success() {
            return Err(Self::fail(&output, &what));
        }
        let mut stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        while stdout.ends_with('\n') || stdout.ends_with('\r') {
            stdout.pop();
        }
        Ok(stdout)
    }

    /// Run, capture raw stdout bytes.
    pub fn run_bytes<I, S>(&self, args: I) -> Result<Vec<u8>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<_> = args.into_iter().collect();
        let what = describe(&args);
        let output = self.spawn_captured(args, &[])?;
        if !output.status.success() {
            return Err(Self::fail(&output, &what));
        }
        Ok(output.stdout)
    }

    /// Run and report only whether git exited zero.
    pub fn succeeds<I, S>(&self, args: I) -> Result<bool>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        Ok(self.spawn_captured(args, &[])?.status.success())
    }

    /// Run with inherited stdio, for pass-through subcommands whose output
    /// belongs to the user (log, diff, interactive pagers).
    pub fn run_interactive<I, S>(&self, args: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<_> = args.into_iter().collect();
        let what = describe(&args);
        let mut cmd = self.command();
        cmd.args(args);
        debug!("running {:?}", cmd);
        let status = cmd.spawn()?.wait()?;
        if !status.success() {
            return Err(MybaError::GitCommand {
                command: what,
                detail: format!("exit status {status}"),
            });
        }
        Ok(())
    }
}

fn describe<S: AsRef<OsStr>>(args: &[S]) -> String {
    args.first()
        .map(|a| a.as_ref().to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_run_captures_and_chomps() {
        let dir = TempDir::new().unwrap();
        let git = Git::in_dir(dir.path());
        let version = git.run(["version"]).unwrap();
        assert!(version.starts_with("git version"));
        assert!(!version.ends_with('\n'));
    }

    #[test]
    fn test_failure_carries_stderr() {
        let dir = TempDir::new().unwrap();
        let git = Git::in_dir(dir.path());
        let err = git.run(["rev-parse", "HEAD"]).unwrap_err();
        match err {
            MybaError::GitCommand { command, detail } => {
                assert_eq!(command, "rev-parse");
                assert!(!detail.is_empty());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_succeeds_reports_status() {
        let dir = TempDir::new().unwrap();
        let git = Git::in_dir(dir.path());
        assert!(git.succeeds(["version"]).unwrap());
        assert!(!git.succeeds(["rev-parse", "HEAD"]).unwrap());
    }
}
