// Not every test file uses every helper.
#![allow(dead_code)]

use assert_cmd::Command;
use std::path::PathBuf;
use std::process::Command as StdCommand;
use tempfile::TempDir;

/// Test KDF strength; full strength would dominate test time.
pub const TEST_KDF_ITERS: &str = "1000";

/// One isolated backup environment: a temp working tree with its repository
/// pair under `<work>/.myba`.
pub struct BackupEnv {
    _root: TempDir,
    work: PathBuf,
    pub password: String,
}

impl BackupEnv {
    pub fn new() -> Self {
        let root = TempDir::new().expect("failed to create temp dir");
        let work = root.path().join("work");
        std::fs::create_dir(&work).unwrap();
        BackupEnv {
            _root: root,
            work,
            password: "secret".to_owned(),
        }
    }

    pub fn work_tree(&self) -> &PathBuf {
        &self.work
    }

    pub fn plain_repo(&self) -> PathBuf {
        self.work.join(".myba")
    }

    pub fn enc_repo(&self) -> PathBuf {
        self.plain_repo().join("_encrypted")
    }

    pub fn manifest_dir(&self) -> PathBuf {
        self.plain_repo().join("manifest")
    }

    /// The myba binary with this environment's variables applied.
    pub fn myba(&self) -> Command {
        let mut cmd = Command::cargo_bin("myba").expect("myba binary");
        cmd.env("WORK_TREE", &self.work)
            .env("PASSWORD", &self.password)
            .env("KDF_ITERS", TEST_KDF_ITERS)
            .env("N_JOBS", "2")
            .env("GIT_AUTHOR_NAME", "Test User")
            .env("GIT_AUTHOR_EMAIL", "test@example.com")
            .env("GIT_COMMITTER_NAME", "Test User")
            .env("GIT_COMMITTER_EMAIL", "test@example.com")
            .env_remove("YES_OVERWRITE");
        cmd
    }

    /// Raw git against the plain repository, asserting success.
    pub fn git_plain(&self, args: &[&str]) -> String {
        let out = StdCommand::new("git")
            .arg("--git-dir")
            .arg(self.plain_repo().join("repo.git"))
            .arg("--work-tree")
            .arg(&self.work)
            .args(args)
            .output()
            .expect("failed to run git");
        assert!(
            out.status.success(),
            "git {args:?} failed: {}",
            String::from_utf8_lossy(&out.stderr)
        );
        String::from_utf8_lossy(&out.stdout).trim_end().to_owned()
    }

    /// Raw git against the encrypted repository, asserting success.
    pub fn git_enc(&self, args: &[&str]) -> String {
        let out = StdCommand::new("git")
            .arg("-C")
            .arg(self.enc_repo())
            .args(args)
            .output()
            .expect("failed to run git");
        assert!(
            out.status.success(),
            "git {args:?} failed: {}",
            String::from_utf8_lossy(&out.stderr)
        );
        String::from_utf8_lossy(&out.stdout).trim_end().to_owned()
    }

    pub fn write_file(&self, rel: &str, content: &[u8]) {
        let path = self.work.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    pub fn read_file(&self, rel: &str) -> Vec<u8> {
        std::fs::read(self.work.join(rel)).unwrap()
    }
}

/// A bare git repository usable as a remote, with partial-clone support
/// switched on.
pub struct BareRemote {
    _root: TempDir,
    pub path: PathBuf,
}

impl BareRemote {
    pub fn new() -> Self {
        let root = TempDir::new().expect("failed to create temp dir");
        let path = root.path().join("remote.git");
        for args in [
            vec!["init", "--bare", path.to_str().unwrap()],
            vec!["-C", path.to_str().unwrap(), "symbolic-ref", "HEAD", "refs/heads/main"],
            vec!["-C", path.to_str().unwrap(), "config", "uploadpack.allowfilter", "true"],
            vec![
                "-C",
                path.to_str().unwrap(),
                "config",
                "uploadpack.allowanysha1inwant",
                "true",
            ],
        ] {
            let out = StdCommand::new("git").args(&args).output().unwrap();
            assert!(out.status.success(), "git {args:?} failed");
        }
        BareRemote { _root: root, path }
    }

    pub fn url(&self) -> String {
        format!("file://{}", self.path.display())
    }
}

/// Library-side cipher matching the environment the binary runs under.
pub fn test_cipher(env: &BackupEnv) -> myba::Cipher {
    let settings = myba::Settings {
        work_tree: env.work_tree().clone(),
        plain_repo: env.plain_repo(),
        use_gpg: false,
        kdf_iters: TEST_KDF_ITERS.parse().unwrap(),
        lfs_threshold: 40 * 1024 * 1024,
        n_jobs: 2,
        yes_overwrite: false,
        self_copy: true,
        verbose: false,
    };
    myba::Cipher::new(&settings, myba::password::Password::new(env.password.clone()))
}

/// Deterministic pseudo-random bytes; contains NULs, so it exercises the
/// binary (no-compression) path.
pub fn pseudo_random_bytes(len: usize) -> Vec<u8> {
    let mut state = 0x2545f4914f6cdd1du64;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state & 0xff) as u8
        })
        .collect()
}
