mod common;

use common::{pseudo_random_bytes, test_cipher, BackupEnv};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use myba::commands::commit::parse_commit_record;
use myba::Manifest;
use std::process::{Command as StdCommand, Stdio};

#[test]
fn test_init_creates_repo_pair() {
    let env = BackupEnv::new();
    env.myba().arg("init").assert().success();

    assert!(env.plain_repo().join("repo.git").is_dir());
    assert!(env.manifest_dir().is_dir());
    assert!(env.enc_repo().join(".git").is_dir());

    let excludes =
        std::fs::read_to_string(env.plain_repo().join("repo.git").join("info").join("exclude"))
            .unwrap();
    assert!(excludes.contains(".myba/"));

    // The manifest cone is installed from the start.
    let cone = env.git_enc(&["sparse-checkout", "list"]);
    assert_eq!(cone, "manifest");

    let attributes = std::fs::read_to_string(
        env.enc_repo().join(".git").join("info").join("attributes"),
    )
    .unwrap();
    assert!(attributes.contains("binary -diff"));
}

#[test]
fn test_commit_mirrors_into_encrypted_repo() {
    let env = BackupEnv::new();
    env.myba().arg("init").assert().success();
    env.write_file("foo/.dotfile", b"foo\n");
    env.write_file("foo/other.file", &pseudo_random_bytes(1024 * 1024));
    env.myba()
        .args(["add", "foo/.dotfile", "foo/other.file"])
        .assert()
        .success();
    env.myba().args(["commit", "-m", "m"]).assert().success();

    let plain_head = env.git_plain(&["rev-parse", "HEAD"]);

    // Plaintext manifest mirrors the commit.
    let manifest_text =
        std::fs::read_to_string(env.manifest_dir().join(&plain_head)).unwrap();
    let manifest = Manifest::parse(&manifest_text).unwrap();
    assert_eq!(manifest.len(), 2);
    let plains: Vec<&str> = manifest
        .entries()
        .iter()
        .map(|e| e.plain_path.as_str())
        .collect();
    assert_eq!(plains, vec!["foo/.dotfile", "foo/other.file"]);

    // Encrypted tree: two blobs, the manifest, and the tool's own copy.
    let tracked = env.git_enc(&["ls-files"]);
    let tracked: Vec<&str> = tracked.lines().collect();
    assert_eq!(tracked.len(), 4);
    assert!(tracked.contains(&"myba"));
    assert!(tracked.contains(&format!("manifest/{plain_head}").as_str()));
    for entry in manifest.entries() {
        assert!(tracked.contains(&entry.enc_path.as_str()));
    }

    // The encrypted commit message decrypts to the plain commit metadata.
    let cipher = test_cipher(&env);
    let armored = env.git_enc(&["log", "-1", "--format=%B"]);
    let payload = BASE64.decode(armored.trim()).unwrap();
    let record_bytes = myba::compress::decode(&cipher.decrypt("", &payload).unwrap());
    let record = parse_commit_record(&record_bytes).unwrap();
    assert_eq!(record.author, "Test User");
    assert_eq!(record.body.trim_end(), "m");
    assert!(record.listing.contains("foo/.dotfile"));
    assert!(record.listing.contains("foo/other.file"));

    // Each blob decrypts back to its plaintext.
    for (entry, expected) in manifest.entries().iter().zip([
        b"foo\n".to_vec(),
        pseudo_random_bytes(1024 * 1024),
    ]) {
        let ciphertext = std::fs::read(env.enc_repo().join(&entry.enc_path)).unwrap();
        let decrypted = cipher.decrypt(&entry.plain_path, &ciphertext).unwrap();
        assert_eq!(myba::compress::decode(&decrypted), expected);
    }
}

#[test]
fn test_commit_with_no_changes_is_a_noop() {
    let env = BackupEnv::new();
    env.myba().arg("init").assert().success();
    env.myba()
        .args(["commit", "-m", "m"])
        .assert()
        .success()
        .stdout(predicates::str::contains("Nothing to commit"));
}

#[test]
fn test_directory_marker_tracks_new_files() {
    let env = BackupEnv::new();
    env.myba().arg("init").assert().success();
    env.write_file("docs/a.txt", b"a\n");
    env.myba().args(["add", "docs"]).assert().success();
    env.myba().args(["commit", "-m", "one"]).assert().success();

    assert!(env.work_tree().join("docs/.mybabackup").is_file());

    // A file created later is picked up by the next commit via the marker.
    env.write_file("docs/b.txt", b"b\n");
    env.myba().args(["commit", "-m", "two"]).assert().success();
    let tracked = env.git_plain(&["ls-files"]);
    assert!(tracked.contains("docs/b.txt"));
}

#[test]
fn test_rm_untracks_and_removes_blob() {
    let env = BackupEnv::new();
    env.myba().arg("init").assert().success();
    env.write_file("doomed.txt", b"going away\n");
    env.myba().args(["add", "doomed.txt"]).assert().success();
    env.myba().args(["commit", "-m", "add"]).assert().success();

    env.myba().args(["rm", "doomed.txt"]).assert().success();
    env.myba().args(["commit", "-m", "rm"]).assert().success();

    assert_eq!(env.git_plain(&["ls-files"]), "");
    // Only the first commit's manifest and the self copy remain tracked.
    let tracked = env.git_enc(&["ls-files"]);
    let tracked: Vec<&str> = tracked.lines().collect();
    assert_eq!(tracked.len(), 2);
    assert!(tracked.contains(&"myba"));
}

#[test]
fn test_checkout_restores_deleted_file() {
    let env = BackupEnv::new();
    env.myba().arg("init").assert().success();
    env.write_file("foo/.dotfile", b"foo\n");
    env.myba().args(["add", "foo/.dotfile"]).assert().success();
    env.myba().args(["commit", "-m", "m"]).assert().success();

    std::fs::remove_file(env.work_tree().join("foo/.dotfile")).unwrap();
    env.myba().args(["checkout", "foo/.dotfile"]).assert().success();
    assert_eq!(env.read_file("foo/.dotfile"), b"foo\n");
}

#[test]
fn test_checkout_overwrite_refused_without_tty() {
    let env = BackupEnv::new();
    env.myba().arg("init").assert().success();
    env.write_file("foo/.dotfile", b"foo\n");
    env.myba().args(["add", "foo/.dotfile"]).assert().success();
    env.myba().args(["commit", "-m", "m"]).assert().success();

    // setsid detaches from any controlling terminal, so the prompt cannot
    // be answered and counts as a refusal.
    let myba_bin = env!("CARGO_BIN_EXE_myba");
    let status = StdCommand::new("setsid")
        .args([myba_bin, "checkout", "foo/.dotfile"])
        .env("WORK_TREE", env.work_tree())
        .env("PASSWORD", &env.password)
        .env("KDF_ITERS", common::TEST_KDF_ITERS)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .expect("failed to run myba under setsid");
    assert!(!status.success());

    // With YES_OVERWRITE the same checkout goes through.
    env.myba()
        .args(["checkout", "foo/.dotfile"])
        .env("YES_OVERWRITE", "1")
        .assert()
        .success();
    assert_eq!(env.read_file("foo/.dotfile"), b"foo\n");
}

#[test]
fn test_checkout_plain_commit_restores_old_state() {
    let env = BackupEnv::new();
    env.myba().arg("init").assert().success();
    env.write_file("note.txt", b"first\n");
    env.myba().args(["add", "note.txt"]).assert().success();
    env.myba().args(["commit", "-m", "one"]).assert().success();
    let first = env.git_plain(&["rev-parse", "HEAD"]);

    env.write_file("note.txt", b"second\n");
    env.myba().args(["commit", "-m", "two"]).assert().success();

    env.myba().args(["checkout", &first]).assert().success();
    assert_eq!(env.read_file("note.txt"), b"first\n");
}

#[test]
fn test_largest_lists_biggest_files() {
    let env = BackupEnv::new();
    env.myba().arg("init").assert().success();
    env.write_file("big.bin", &pseudo_random_bytes(64 * 1024));
    env.write_file("small.txt", b"tiny\n");
    env.myba().args(["add", "big.bin", "small.txt"]).assert().success();
    env.myba().args(["commit", "-m", "m"]).assert().success();

    let out = env.myba().arg("largest").assert().success();
    let stdout = String::from_utf8(out.get_output().stdout.clone()).unwrap();
    let first_line = stdout.lines().next().unwrap();
    assert!(first_line.contains("big.bin"));
}
