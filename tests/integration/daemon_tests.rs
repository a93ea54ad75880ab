use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::time::{Duration, Instant};

use bsh::storage::SearchScope;
use git2::{Repository, Signature};
use tempfile::TempDir;

use crate::fixture::{eventually, raw_lines, DaemonFixture};

fn repo_on_branch(branch: &str) -> TempDir {
    let dir = TempDir::new().unwrap();
    let repo = Repository::init(dir.path()).unwrap();
    let sig = Signature::now("bsh", "bsh@example.com").unwrap();
    let tree_id = repo.index().unwrap().write_tree().unwrap();
    let tree = repo.find_tree(tree_id).unwrap();
    let oid = repo
        .commit(Some("HEAD"), &sig, &sig, "init", &tree, &[])
        .unwrap();
    let commit = repo.find_commit(oid).unwrap();
    repo.branch(branch, &commit, false).unwrap();
    repo.set_head(&format!("refs/heads/{branch}")).unwrap();
    dir
}

#[test]
fn record_then_suggest_over_socket() {
    let daemon = DaemonFixture::start();
    let cwd = daemon.dir.path().to_path_buf();

    assert_eq!(daemon.record("  cargo build --release  ", &cwd, 0), "OK");
    assert!(eventually(|| {
        raw_lines(&daemon.suggest("cargo", SearchScope::Global, &cwd, false))
            == vec!["cargo build --release"]
    }));

    let reply = daemon.suggest("cargo", SearchScope::Directory, &cwd, true);
    assert!(reply.contains("##BOX##\n╭─ dir "));
    assert!(reply.contains("│ 1. cargo build --release"));
    assert!(daemon.db.exists());
}

#[test]
fn branch_scope_follows_the_checked_out_branch() {
    let daemon = DaemonFixture::start();
    let repo = repo_on_branch("trunk");
    let elsewhere = TempDir::new().unwrap();

    daemon.record("git status", repo.path(), 0);
    daemon.record("git status", repo.path(), 1);
    daemon.record("git stash", elsewhere.path(), 0);

    assert!(eventually(|| {
        raw_lines(&daemon.suggest("git", SearchScope::Global, repo.path(), false)).len() == 2
    }));

    let reply = daemon.suggest("git", SearchScope::Branch, repo.path(), true);
    assert!(reply.starts_with("##BRANCH##trunk\n"), "{reply:?}");
    assert_eq!(raw_lines(&reply), vec!["git status"]);

    let reply = daemon.suggest("git", SearchScope::Branch, repo.path(), false);
    assert_eq!(raw_lines(&reply), vec!["git status"]);
}

#[test]
fn branch_scope_outside_a_repository_is_skipped() {
    let daemon = DaemonFixture::start();
    let plain = TempDir::new().unwrap();

    daemon.record("ls", plain.path(), 0);
    assert!(eventually(|| {
        !raw_lines(&daemon.suggest("ls", SearchScope::Global, plain.path(), false)).is_empty()
    }));

    assert_eq!(
        daemon.suggest("ls", SearchScope::Branch, plain.path(), false),
        "##SKIP##\n"
    );
}

#[test]
fn own_invocations_are_not_remembered() {
    let daemon = DaemonFixture::start();
    let cwd = daemon.dir.path().to_path_buf();

    assert_eq!(daemon.record("bsh suggest git", &cwd, 0), "OK");
    assert_eq!(daemon.record("echo done", &cwd, 0), "OK");
    assert!(eventually(|| {
        !raw_lines(&daemon.suggest("echo", SearchScope::Global, &cwd, false)).is_empty()
    }));

    for scope in [SearchScope::Global, SearchScope::Directory] {
        assert!(raw_lines(&daemon.suggest("bsh", scope, &cwd, false)).is_empty());
    }
}

#[test]
fn bad_input_does_not_stop_the_server() {
    let daemon = DaemonFixture::start();
    let cwd = daemon.dir.path().to_path_buf();

    assert_eq!(daemon.send_raw(b""), "");
    assert_eq!(daemon.send_raw(b"DROP TABLE commands"), "");
    assert_eq!(daemon.send_raw(&[0xff, 0x00, 0x1f]), "");
    assert_eq!(daemon.send_raw(&vec![b'x'; 9000]), "");
    assert_eq!(daemon.send_raw("SUGGEST\u{1f}q\u{1f}nowhere\u{1f}\u{1f}0".as_bytes()), "");

    assert_eq!(daemon.record("still alive", &cwd, 0), "OK");
    assert!(eventually(|| {
        raw_lines(&daemon.suggest("still", SearchScope::Global, &cwd, false)) == vec!["still alive"]
    }));
}

#[test]
fn silent_client_times_out_without_blocking_others() {
    let daemon = DaemonFixture::start_with(|config| config.daemon.read_timeout_ms = 200);
    let cwd = daemon.dir.path().to_path_buf();

    let started = Instant::now();
    let mut idle = UnixStream::connect(&daemon.socket).unwrap();
    idle.write_all(b"RECORD").unwrap();
    idle.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    let mut reply = Vec::new();
    idle.read_to_end(&mut reply).unwrap();
    assert!(reply.is_empty());
    assert!(started.elapsed() < Duration::from_secs(5));

    assert_eq!(daemon.record("after timeout", &cwd, 0), "OK");
}

#[test]
fn shutdown_removes_the_socket() {
    let daemon = DaemonFixture::start();
    let socket = daemon.socket.clone();
    assert!(socket.exists());

    daemon.stop().unwrap();
    assert!(!socket.exists());
}

#[test]
fn history_survives_restart() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("history.db");
    let cwd = dir.path().to_path_buf();

    let first = DaemonFixture::start_with(|config| config.storage.db_path = Some(db.clone()));
    first.record("make check", &cwd, 0);
    first.stop().unwrap();

    let second = DaemonFixture::start_with(|config| config.storage.db_path = Some(db.clone()));
    assert_eq!(
        raw_lines(&second.suggest("make", SearchScope::Global, &cwd, true)),
        vec!["make check"]
    );
}
