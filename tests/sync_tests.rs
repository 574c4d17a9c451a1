use assert_fs::TempDir;
use gitdist::{
    CloneOptions, Credential, MergeOutcome, ObjectId, PushOutcome, Repository, Server, ServerConfig, SyncOptions, SyncPhase,
    VcsError,
};
use pretty_assertions::assert_eq;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

mod common;

struct Sandbox {
    _dir: TempDir,
    root: PathBuf,
    remote: PathBuf,
    /// Commit the remote starts from
    seed: ObjectId,
}

impl Sandbox {
    async fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let root = dir.path().canonicalize().expect("Failed to canonicalize temp dir");
        let remote = root.join("remote.git");
        let seed = common::seeded_remote(&remote, &root.join("seed")).await;

        Sandbox {
            _dir: dir,
            root,
            remote,
            seed,
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn remote_tip(&self) -> Option<ObjectId> {
        let mut remote = Repository::open(&self.remote).expect("Failed to open remote");
        let tip = remote.head().expect("Failed to read remote head");
        remote.free();
        tip
    }
}

async fn serve(path: &Path, token: Option<&str>) -> SocketAddr {
    let config = ServerConfig {
        bind: SocketAddr::from(([127, 0, 0, 1], 0)),
        token: token.map(str::to_string),
        path: path.to_path_buf(),
    };
    let server = Server::bind(config).await.expect("Failed to bind server");
    let address = server.local_addr().expect("Server has no address");
    tokio::spawn(server.serve());
    address
}

#[tokio::test]
async fn clone_checks_out_the_remote_default_branch() {
    let sandbox = Sandbox::new().await;
    let path = sandbox.path("alice");

    let alice = common::clone(&sandbox.remote, &path).await;

    assert_eq!(alice.head().unwrap(), Some(sandbox.seed.clone()));
    assert_eq!(alice.current_branch().unwrap().to_string(), "master");
    assert_eq!(common::read_file(&path, "a.txt"), "alpha\n");
    assert_eq!(common::read_file(&path, "dir/b.txt"), "beta\n");
    assert!(alice.status().unwrap().is_empty());
}

#[tokio::test]
async fn cloning_into_a_non_empty_directory_fails_without_touching_it() {
    let sandbox = Sandbox::new().await;
    let path = sandbox.path("occupied");
    common::write_file(&path, "mine.txt", "mine\n");

    let result = Repository::clone(&sandbox.remote.display().to_string(), &path, CloneOptions::default()).await;

    assert!(matches!(result, Err(VcsError::InvalidState(_))));
    assert_eq!(common::read_file(&path, "mine.txt"), "mine\n");
    assert!(!path.join(".git").exists());
}

#[tokio::test]
async fn cloning_a_missing_remote_is_not_found() {
    let sandbox = Sandbox::new().await;

    let result = Repository::clone(
        &sandbox.path("missing").display().to_string(),
        sandbox.path("copy"),
        CloneOptions::default(),
    )
    .await;

    assert!(matches!(result, Err(VcsError::NotFound(_))));
    assert!(!sandbox.path("copy").exists());
}

#[tokio::test]
async fn unsupported_schemes_are_network_errors() {
    let sandbox = Sandbox::new().await;

    let result = Repository::clone("ssh://example.com/repo", sandbox.path("copy"), CloneOptions::default()).await;

    assert!(matches!(result, Err(ref e @ VcsError::Network(_)) if e.is_retryable()));
}

#[tokio::test]
async fn fetching_twice_transfers_nothing_the_second_time() {
    let sandbox = Sandbox::new().await;
    let mut alice = common::clone(&sandbox.remote, &sandbox.path("alice")).await;
    let mut bob = common::clone(&sandbox.remote, &sandbox.path("bob")).await;

    common::write_file(&sandbox.path("alice"), "a.txt", "alpha from alice\n");
    let pushed = common::commit_all(&mut alice, "alice edits a");
    alice.push().await.unwrap();

    let first = bob.fetch().await.unwrap();
    assert_eq!(first.updated.len(), 1);
    assert_eq!(first.updated[0].1, pushed);
    assert!(first.received > 0);

    let second = bob.fetch().await.unwrap();
    assert!(second.is_up_to_date());
    assert_eq!(second.received, 0);

    // fetch leaves the local branch and working directory alone
    assert_eq!(bob.head().unwrap(), Some(sandbox.seed.clone()));
    assert_eq!(common::read_file(&sandbox.path("bob"), "a.txt"), "alpha\n");
}

#[tokio::test]
async fn merging_without_new_commits_is_up_to_date() {
    let sandbox = Sandbox::new().await;
    let mut alice = common::clone(&sandbox.remote, &sandbox.path("alice")).await;

    alice.fetch().await.unwrap();

    assert_eq!(alice.merge().await.unwrap(), MergeOutcome::UpToDate);
    assert_eq!(alice.head().unwrap(), Some(sandbox.seed.clone()));
}

#[tokio::test]
async fn merging_a_remote_tip_already_in_local_history_is_up_to_date() {
    let sandbox = Sandbox::new().await;
    let path = sandbox.path("alice");
    let mut alice = common::clone(&sandbox.remote, &path).await;

    common::write_file(&path, "c.txt", "gamma\n");
    let local = common::commit_all(&mut alice, "local only");
    assert!(alice.fetch().await.unwrap().is_up_to_date());

    assert_eq!(alice.merge().await.unwrap(), MergeOutcome::UpToDate);
    assert_eq!(alice.head().unwrap(), Some(local.clone()));
    assert_eq!(alice.lookup_commit(&local).unwrap().parents(), &[sandbox.seed.clone()]);
    assert_eq!(common::read_file(&path, "c.txt"), "gamma\n");
    assert!(alice.status().unwrap().is_empty());
}

#[tokio::test]
async fn a_repeated_fetch_leaves_the_repository_byte_for_byte_unchanged() {
    let sandbox = Sandbox::new().await;
    let mut alice = common::clone(&sandbox.remote, &sandbox.path("alice")).await;
    let mut bob = common::clone(&sandbox.remote, &sandbox.path("bob")).await;

    common::write_file(&sandbox.path("alice"), "dir/c.txt", "gamma\n");
    common::commit_all(&mut alice, "alice adds c");
    alice.push().await.unwrap();

    assert!(!bob.fetch().await.unwrap().is_up_to_date());
    let after_first = common::repository_snapshot(&sandbox.path("bob"));

    let second = bob.fetch().await.unwrap();
    assert!(second.is_up_to_date());
    assert_eq!(second.received, 0);
    assert!(common::repository_snapshot(&sandbox.path("bob")) == after_first);
}

#[tokio::test]
async fn pull_fast_forwards_a_branch_without_local_work() {
    let sandbox = Sandbox::new().await;
    let mut alice = common::clone(&sandbox.remote, &sandbox.path("alice")).await;
    let mut bob = common::clone(&sandbox.remote, &sandbox.path("bob")).await;

    common::write_file(&sandbox.path("alice"), "dir/b.txt", "beta from alice\n");
    common::write_file(&sandbox.path("alice"), "c.txt", "gamma\n");
    let pushed = common::commit_all(&mut alice, "alice edits");
    alice.push().await.unwrap();

    assert_eq!(bob.pull().await.unwrap(), MergeOutcome::FastForward(pushed.clone()));
    assert_eq!(bob.head().unwrap(), Some(pushed));
    assert_eq!(common::read_file(&sandbox.path("bob"), "dir/b.txt"), "beta from alice\n");
    assert_eq!(common::read_file(&sandbox.path("bob"), "c.txt"), "gamma\n");
    assert!(bob.status().unwrap().is_empty());
}

#[tokio::test]
async fn diverged_pushes_are_rejected_until_merged() {
    let sandbox = Sandbox::new().await;
    let mut alice = common::clone(&sandbox.remote, &sandbox.path("alice")).await;
    let mut bob = common::clone(&sandbox.remote, &sandbox.path("bob")).await;

    common::write_file(&sandbox.path("alice"), "a.txt", "alpha from alice\n");
    let alice_tip = common::commit_all(&mut alice, "alice edits a");
    assert!(matches!(alice.push().await.unwrap(), PushOutcome::Pushed { .. }));

    common::write_file(&sandbox.path("bob"), "dir/b.txt", "beta from bob\n");
    let bob_tip = common::commit_all(&mut bob, "bob edits b");
    assert!(matches!(bob.push().await, Err(VcsError::NonFastForward { .. })));
    assert_eq!(sandbox.remote_tip(), Some(alice_tip.clone()));

    bob.fetch().await.unwrap();
    let merged = match bob.merge().await.unwrap() {
        MergeOutcome::Merged(oid) => oid,
        other => panic!("expected a merge commit, got {other:?}"),
    };
    let merge_commit = bob.lookup_commit(&merged).unwrap();
    assert_eq!(merge_commit.parents(), &[bob_tip, alice_tip]);
    assert_eq!(common::read_file(&sandbox.path("bob"), "a.txt"), "alpha from alice\n");
    assert_eq!(common::read_file(&sandbox.path("bob"), "dir/b.txt"), "beta from bob\n");

    match bob.push().await.unwrap() {
        PushOutcome::Pushed { old, new, objects, .. } => {
            assert_eq!(old.as_ref(), merge_commit.parents().get(1));
            assert_eq!(new, merged);
            assert!(objects > 0);
        }
        other => panic!("expected a push, got {other:?}"),
    }
    assert_eq!(sandbox.remote_tip(), Some(merged));
    assert_eq!(bob.push().await.unwrap(), PushOutcome::UpToDate);
}

#[tokio::test]
async fn conflicting_merges_leave_everything_in_place() {
    let sandbox = Sandbox::new().await;
    let mut alice = common::clone(&sandbox.remote, &sandbox.path("alice")).await;
    let mut bob = common::clone(&sandbox.remote, &sandbox.path("bob")).await;

    common::write_file(&sandbox.path("alice"), "a.txt", "alpha from alice\n");
    common::commit_all(&mut alice, "alice edits a");
    alice.push().await.unwrap();

    common::write_file(&sandbox.path("bob"), "a.txt", "alpha from bob\n");
    let bob_tip = common::commit_all(&mut bob, "bob edits a");
    bob.fetch().await.unwrap();

    match bob.merge().await {
        Err(VcsError::MergeConflict { paths }) => assert_eq!(paths, vec![PathBuf::from("a.txt")]),
        other => panic!("expected a conflict, got {other:?}"),
    }
    assert_eq!(bob.head().unwrap(), Some(bob_tip));
    assert_eq!(common::read_file(&sandbox.path("bob"), "a.txt"), "alpha from bob\n");
}

#[tokio::test]
async fn merges_refuse_to_overwrite_uncommitted_changes() {
    let sandbox = Sandbox::new().await;
    let mut alice = common::clone(&sandbox.remote, &sandbox.path("alice")).await;
    let mut bob = common::clone(&sandbox.remote, &sandbox.path("bob")).await;

    common::write_file(&sandbox.path("alice"), "a.txt", "alpha from alice\n");
    common::commit_all(&mut alice, "alice edits a");
    alice.push().await.unwrap();

    common::write_file(&sandbox.path("bob"), "a.txt", "unsaved work\n");
    let result = bob.pull().await;

    assert!(matches!(result, Err(VcsError::UncommittedChanges { .. })));
    assert_eq!(bob.head().unwrap(), Some(sandbox.seed.clone()));
    assert_eq!(common::read_file(&sandbox.path("bob"), "a.txt"), "unsaved work\n");
}

#[tokio::test]
async fn progress_walks_through_every_phase() {
    let sandbox = Sandbox::new().await;
    let mut alice = common::clone(&sandbox.remote, &sandbox.path("alice")).await;
    let mut bob = common::clone(&sandbox.remote, &sandbox.path("bob")).await;
    common::write_file(&sandbox.path("alice"), "c.txt", "gamma\n");
    common::commit_all(&mut alice, "alice adds c");
    alice.push().await.unwrap();

    let phases = Arc::new(Mutex::new(Vec::new()));
    let recorded = phases.clone();
    let options = SyncOptions::default().with_progress(move |progress| {
        let mut phases = recorded.lock().unwrap();
        if phases.last() != Some(&progress.phase) {
            phases.push(progress.phase);
        }
    });
    bob.fetch_with(options).await.unwrap();

    assert_eq!(
        *phases.lock().unwrap(),
        vec![
            SyncPhase::Negotiating,
            SyncPhase::Transferring,
            SyncPhase::Integrating,
            SyncPhase::Done
        ]
    );
}

#[tokio::test]
async fn clone_and_push_over_tcp() {
    let sandbox = Sandbox::new().await;
    let address = serve(&sandbox.remote, None).await;
    let url = format!("gitdist://{address}");
    let path = sandbox.path("alice");

    let mut alice = Repository::clone(&url, &path, CloneOptions::default()).await.unwrap();
    assert_eq!(alice.head().unwrap(), Some(sandbox.seed.clone()));
    assert_eq!(common::read_file(&path, "dir/b.txt"), "beta\n");

    common::write_file(&path, "dir/b.txt", "beta over tcp\n");
    let pushed = common::commit_all(&mut alice, "tcp edit");
    assert!(matches!(alice.push().await.unwrap(), PushOutcome::Pushed { .. }));
    alice.free();

    assert_eq!(sandbox.remote_tip(), Some(pushed));
}

#[tokio::test]
async fn tcp_servers_reject_wrong_tokens() {
    let sandbox = Sandbox::new().await;
    let address = serve(&sandbox.remote, Some("s3cret")).await;
    let url = format!("gitdist://{address}");

    let wrong = CloneOptions {
        credential: Some(Credential::Token("guess".into())),
        ..CloneOptions::default()
    };
    let result = Repository::clone(&url, sandbox.path("intruder"), wrong).await;
    assert!(matches!(result, Err(VcsError::AuthenticationFailed(_))));
    assert!(!sandbox.path("intruder").exists());

    let right = CloneOptions {
        credential: Some(Credential::Token("s3cret".into())),
        ..CloneOptions::default()
    };
    let alice = Repository::clone(&url, sandbox.path("alice"), right).await.unwrap();
    assert_eq!(alice.head().unwrap(), Some(sandbox.seed.clone()));
}

#[tokio::test]
async fn objects_beyond_one_frame_travel_over_tcp() {
    let sandbox = Sandbox::new().await;
    let address = serve(&sandbox.remote, None).await;
    let url = format!("gitdist://{address}");
    let alice_path = sandbox.path("alice");
    let mut alice = Repository::clone(&url, &alice_path, CloneOptions::default()).await.unwrap();
    alice.set_author(common::AUTHOR_NAME, common::AUTHOR_EMAIL).unwrap();

    // together well over the 64 MiB frame limit; the first alone over the
    // per-frame object budget
    let mut files = vec![("big.bin".to_string(), "z".repeat(20 << 20))];
    for fill in ['a', 'b', 'c', 'd'] {
        files.push((format!("{fill}.bin"), fill.to_string().repeat(12 << 20)));
    }
    for (name, content) in &files {
        common::write_file(&alice_path, name, content);
    }
    let pushed = common::commit_all(&mut alice, "large files");
    assert!(matches!(alice.push().await.unwrap(), PushOutcome::Pushed { .. }));
    alice.free();
    assert_eq!(sandbox.remote_tip(), Some(pushed.clone()));

    let bob_path = sandbox.path("bob");
    let bob = Repository::clone(&url, &bob_path, CloneOptions::default()).await.unwrap();
    assert_eq!(bob.head().unwrap(), Some(pushed));
    for (name, content) in &files {
        assert!(common::read_file(&bob_path, name) == *content, "{name} differs");
    }
}

#[tokio::test(flavor = "current_thread")]
async fn a_single_threaded_runtime_serves_concurrent_clients() {
    let sandbox = Sandbox::new().await;
    let address = serve(&sandbox.remote, None).await;
    let url = format!("gitdist://{address}");

    let (first, second, third) = tokio::join!(
        Repository::clone(&url, sandbox.path("first"), CloneOptions::default()),
        Repository::clone(&url, sandbox.path("second"), CloneOptions::default()),
        Repository::clone(&url, sandbox.path("third"), CloneOptions::default()),
    );

    for repository in [first, second, third] {
        assert_eq!(repository.unwrap().head().unwrap(), Some(sandbox.seed.clone()));
    }
}
