//! Plain-repository facade.
//!
//! P is a bare git store whose working tree is the user's directory,
//! addressed with explicit `--git-dir`/`--work-tree` overrides on every
//! call. It is never pushed anywhere. Alongside the git dir it carries a
//! `manifest/` directory of plaintext manifests, one file per plain-commit
//! hash, and an `info/exclude` seeded with a default ignore set.

use crate::config::Settings;
use crate::error::{MybaError, Result};
use crate::gitcmd::Git;
use git2::{Repository, RepositoryInitOptions};
use std::fs;
use std::path::{Path, PathBuf};

/// Marker file tracked inside every directory added as a whole; commit
/// re-adds all directories carrying one.
pub const DIR_MARKER: &str = ".mybabackup";

const GIT_DIR: &str = "repo.git";

const DEFAULT_EXCLUDES: &str = "\
.myba/
.cache/
.Trash*/
*.swp
*.tmp
";

/// One entry of a name-status listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Added(String),
    Modified(String),
    Renamed { from: String, to: String },
    Copied { from: String, to: String },
    Deleted(String),
    TypeChanged(String),
    Unmerged(String),
    Unknown(char, String),
}

pub struct PlainRepo {
    git_dir: PathBuf,
    work_tree: PathBuf,
    git: Git,
}

impl PlainRepo {
    /// Create P under `settings.plain_repo`, configured for rename and copy
    /// detection and isolated from the user's global excludes.
    pub fn init(settings: &Settings) -> Result<Self> {
        let git_dir = settings.plain_repo.join(GIT_DIR);
        fs::create_dir_all(&settings.plain_repo)?;
        fs::create_dir_all(settings.manifest_dir())?;

        let mut opts = RepositoryInitOptions::new();
        opts.bare(true).no_reinit(false).initial_head("main");
        let repo = Repository::init_opts(&git_dir, &opts)?;
        Self::configure(&repo)?;

        let info_dir = git_dir.join("info");
        fs::create_dir_all(&info_dir)?;
        let exclude = info_dir.join("exclude");
        if !exclude.exists() || fs::read_to_string(&exclude)?.trim().is_empty() {
            fs::write(&exclude, DEFAULT_EXCLUDES)?;
        }

        Ok(Self::assemble(settings, git_dir))
    }

    pub fn open(settings: &Settings) -> Result<Self> {
        let git_dir = settings.plain_repo.join(GIT_DIR);
        if !git_dir.is_dir() {
            return Err(MybaError::Usage(format!(
                "no repository at {} (run init first)",
                settings.plain_repo.display()
            )));
        }
        Ok(Self::assemble(settings, git_dir))
    }

    fn assemble(settings: &Settings, git_dir: PathBuf) -> Self {
        let git = Git::bare_alias(&git_dir, &settings.work_tree);
        PlainRepo {
            git_dir,
            work_tree: settings.work_tree.clone(),
            git,
        }
    }

    fn configure(repo: &Repository) -> Result<()> {
        let mut config = repo.config()?;
        config.set_str("diff.renames", "copies")?;
        config.set_i32("diff.renameLimit", 10_000)?;
        config.set_str("core.excludesFile", "/dev/null")?;
        config.set_str("status.showUntrackedFiles", "no")?;
        Ok(())
    }

    pub fn git(&self) -> &Git {
        &self.git
    }

    /// Same repository staged against a different tree; used when replaying
    /// history through throwaway directories.
    pub fn git_at(&self, work_tree: &Path) -> Git {
        self.git.with_work_tree(work_tree)
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    pub fn work_tree(&self) -> &Path {
        &self.work_tree
    }

    pub fn add<I, S>(&self, paths: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let mut args: Vec<std::ffi::OsString> = vec!["add".into(), "-A".into(), "--".into()];
        args.extend(paths.into_iter().map(|p| p.as_ref().to_owned()));
        self.git.run(args)?;
        Ok(())
    }

    /// Stage updates and deletions of everything already tracked.
    pub fn add_update(&self) -> Result<()> {
        if self.has_commits() {
            self.git.run(["add", "-u"])?;
        }
        Ok(())
    }

    pub fn rm<I, S>(&self, paths: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let mut args: Vec<std::ffi::OsString> = vec![
            "rm".into(),
            "-r".into(),
            "-q".into(),
            "--cached".into(),
            "--ignore-unmatch".into(),
            "--".into(),
        ];
        args.extend(paths.into_iter().map(|p| p.as_ref().to_owned()));
        self.git.run(args)?;
        Ok(())
    }

    /// Commit the staged state; `None` when nothing is staged.
    pub fn commit(&self, message: &str) -> Result<Option<String>> {
        if !self.has_staged_changes()? {
            return Ok(None);
        }
        self.git.run(["commit", "-q", "-m", message])?;
        Ok(Some(self.head()?))
    }

    pub fn has_staged_changes(&self) -> Result<bool> {
        let status = self.git.run(["status", "--porcelain"])?;
        Ok(status
            .lines()
            .any(|l| !matches!(l.as_bytes().first(), None | Some(b' ') | Some(b'?'))))
    }

    pub fn has_commits(&self) -> bool {
        self.git
            .succeeds(["rev-parse", "--verify", "--quiet", "HEAD"])
            .unwrap_or(false)
    }

    pub fn head(&self) -> Result<String> {
        self.git.run(["rev-parse", "HEAD"])
    }

    /// Resolve a revision spec to a commit hash, or `None` when it does not
    /// name a commit here.
    pub fn resolve_commit(&self, spec: &str) -> Option<String> {
        resolve_in(&self.git_dir, spec)
    }

    pub fn checkout(&self, commit: &str) -> Result<()> {
        // Pathspecs are resolved against the process cwd, which need not be
        // inside the work tree; the absolute root always is.
        let mut args: Vec<std::ffi::OsString> =
            vec!["checkout".into(), "-f".into(), commit.into(), "--".into()];
        args.push(self.work_tree.as_os_str().to_owned());
        self.git.run(args)?;
        Ok(())
    }

    /// Raw `--name-status` listing of one commit against its first parent,
    /// with rename and copy detection.
    pub fn name_status_raw(&self, commit: &str) -> Result<String> {
        self.git.run([
            "diff-tree",
            "--no-commit-id",
            "--name-status",
            "--root",
            "-M",
            "-C",
            "-r",
            commit,
        ])
    }

    pub fn name_status(&self, commit: &str) -> Result<Vec<Change>> {
        Ok(parse_name_status(&self.name_status_raw(commit)?))
    }

    /// Blob bytes of `path` as committed at `commit`.
    pub fn cat_blob(&self, commit: &str, path: &str) -> Result<Vec<u8>> {
        self.git.run_bytes(["cat-file", "blob", &format!("{commit}:{path}")])
    }

    /// Author name, email, author date (ISO-8601 strict) and full message
    /// body of one commit.
    pub fn commit_meta(&self, commit: &str) -> Result<(String, String, String, String)> {
        let raw = self.git.run([
            "show",
            "-s",
            "--date=iso-strict",
            "--format=%an%x00%ae%x00%ad%x00%B",
            commit,
        ])?;
        let mut parts = raw.splitn(4, '\0');
        let name = parts.next().unwrap_or_default().to_owned();
        let email = parts.next().unwrap_or_default().to_owned();
        let date = parts.next().unwrap_or_default().to_owned();
        let body = parts.next().unwrap_or_default().to_owned();
        Ok((name, email, date, body))
    }

    pub fn log_hashes_oldest_first(&self) -> Result<Vec<String>> {
        if !self.has_commits() {
            return Ok(Vec::new());
        }
        let out = self.git.run(["log", "--topo-order", "--reverse", "--format=%H"])?;
        Ok(out.lines().map(str::to_owned).collect())
    }

    pub fn ls_files(&self) -> Result<Vec<String>> {
        let out = self.git.run(["ls-files"])?;
        Ok(out.lines().map(str::to_owned).collect())
    }

    /// Directories (work-tree relative) whose marker file is tracked.
    pub fn marker_dirs(&self) -> Result<Vec<String>> {
        if !self.has_commits() {
            return Ok(Vec::new());
        }
        let mut dirs = Vec::new();
        for file in self.ls_files()? {
            if file == DIR_MARKER {
                dirs.push(".".to_owned());
            } else if let Some(dir) = file.strip_suffix(&format!("/{DIR_MARKER}")) {
                dirs.push(dir.to_owned());
            }
        }
        Ok(dirs)
    }

    pub fn manifest_path(&self, settings: &Settings, commit: &str) -> PathBuf {
        settings.manifest_dir().join(commit)
    }
}

pub(crate) fn resolve_in(repo_path: &Path, spec: &str) -> Option<String> {
    let repo = Repository::open(repo_path).ok()?;
    let object = repo.revparse_single(spec).ok()?;
    let commit = object.peel_to_commit().ok()?;
    Some(commit.id().to_string())
}

pub fn parse_name_status(raw: &str) -> Vec<Change> {
    let mut changes = Vec::new();
    for line in raw.lines() {
        if line.is_empty() {
            continue;
        }
        let mut fields = line.split('\t');
        let status = match fields.next() {
            Some(s) if !s.is_empty() => s,
            _ => continue,
        };
        let code = status.chars().next().unwrap();
        match code {
            'A' | 'M' | 'D' | 'T' | 'U' => {
                if let Some(path) = fields.next() {
                    let path = path.to_owned();
                    changes.push(match code {
                        'A' => Change::Added(path),
                        'M' => Change::Modified(path),
                        'D' => Change::Deleted(path),
                        'T' => Change::TypeChanged(path),
                        _ => Change::Unmerged(path),
                    });
                }
            }
            'R' | 'C' => {
                if let (Some(from), Some(to)) = (fields.next(), fields.next()) {
                    let (from, to) = (from.to_owned(), to.to_owned());
                    changes.push(if code == 'R' {
                        Change::Renamed { from, to }
                    } else {
                        Change::Copied { from, to }
                    });
                }
            }
            other => {
                if let Some(path) = fields.next() {
                    changes.push(Change::Unknown(other, path.to_owned()));
                }
            }
        }
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_name_status_codes() {
        let raw = "A\tnew.txt\nM\tchanged.txt\nR100\told.txt\tnew-name.txt\nC75\tsrc.txt\tcopy.txt\nD\tgone.txt\nT\tlink\nU\tconflicted\nX\tweird\n";
        let changes = parse_name_status(raw);
        assert_eq!(
            changes,
            vec![
                Change::Added("new.txt".into()),
                Change::Modified("changed.txt".into()),
                Change::Renamed { from: "old.txt".into(), to: "new-name.txt".into() },
                Change::Copied { from: "src.txt".into(), to: "copy.txt".into() },
                Change::Deleted("gone.txt".into()),
                Change::TypeChanged("link".into()),
                Change::Unmerged("conflicted".into()),
                Change::Unknown('X', "weird".into()),
            ]
        );
    }

    #[test]
    fn test_parse_name_status_empty() {
        assert!(parse_name_status("").is_empty());
    }
}
