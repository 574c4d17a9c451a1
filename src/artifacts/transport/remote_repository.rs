//! Serving side of the sync protocol
//!
//! `RemoteRepository` answers what a client asks of a remote: which branches
//! exist, which objects a want/have pair implies, the objects themselves, and
//! fast-forward-only branch updates. It works directly on the remote's object
//! store and references and does not take the repository handle lock; every
//! reference write goes through a per-reference compare-and-swap instead.

use crate::areas::config::Config;
use crate::areas::database::Database;
use crate::areas::refs::Refs;
use crate::areas::repository::Repository;
use crate::artifacts::branch::branch_name::{BranchName, SymRefName};
use crate::artifacts::merge::merge_base::MergeBaseFinder;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::transport::message::MAX_BATCH_BYTES;
use crate::artifacts::transport::negotiation::ObjectWalker;
use crate::artifacts::transport::{Advertisement, WireObject};
use crate::errors::{Result, VcsError};
use std::path::Path;

#[derive(Debug)]
pub struct RemoteRepository {
    database: Database,
    refs: Refs,
}

impl RemoteRepository {
    pub fn open(path: &Path) -> Result<Self> {
        let path = std::fs::canonicalize(path)
            .map_err(|_| VcsError::NotFound(format!("no repository at {}", path.display())))?;
        let git_dir = Repository::find_git_dir(&path)
            .ok_or_else(|| VcsError::NotFound(format!("no repository at {}", path.display())))?;

        let config = Config::load(&git_dir)?;
        let database = Database::new(git_dir.join("objects").into_boxed_path(), config.core.shared);
        let refs = Refs::new(git_dir.into_boxed_path());

        Ok(RemoteRepository { database, refs })
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn refs(&self) -> &Refs {
        &self.refs
    }

    /// Local branches and the branch `HEAD` names.
    ///
    /// Unborn branches are left out of `refs` but still named as `head`.
    pub fn advertise(&self) -> Result<Advertisement> {
        let head = match self.refs.current_branch() {
            Ok(branch) => Some(branch.to_string()),
            Err(VcsError::NotFound(_)) => None,
            Err(e) => return Err(e),
        };

        let refs = self
            .refs
            .list_ref_targets()?
            .into_iter()
            .filter(|(name, _)| name.is_branch())
            .map(|(name, oid)| (name.to_string(), oid))
            .collect();

        Ok(Advertisement { head, refs })
    }

    pub fn negotiate(&self, wants: &[ObjectId], haves: &[ObjectId]) -> Result<Vec<ObjectId>> {
        ObjectWalker::new(&self.database).missing_objects(wants, haves)
    }

    /// The longest prefix of `ids` whose encodings fit in `MAX_BATCH_BYTES`.
    ///
    /// Empty only when the first object alone is over the budget.
    pub fn get_objects(&self, ids: &[ObjectId]) -> Result<Vec<WireObject>> {
        let mut objects = Vec::new();
        let mut bytes = 0;

        for id in ids {
            let data = self.database.load(id)?;
            if bytes + data.len() > MAX_BATCH_BYTES {
                break;
            }
            bytes += data.len();
            objects.push(WireObject {
                id: id.clone(),
                data: data.to_vec(),
            });
        }

        Ok(objects)
    }

    /// Write objects pushed by a client, each checked against its id.
    pub fn store_objects(&self, objects: &[WireObject]) -> Result<usize> {
        for object in objects {
            self.database.put_verified(&object.id, &object.data)?;
        }
        tracing::debug!(count = objects.len(), "stored pushed objects");

        Ok(objects.len())
    }

    /// Move a branch from `old` to `new`, only forward.
    pub fn update_ref(&self, name: &str, old: Option<&ObjectId>, new: &ObjectId) -> Result<()> {
        let ref_name = SymRefName::new(name.to_string());
        // only refs/heads/<branch> may be pushed
        let branch = BranchName::try_parse_sym_ref_name(&ref_name)?;

        // the commit must have arrived in full before the branch may point at it
        self.database.parse_object_as_commit(new)?;

        if let Some(old) = old {
            let finder = MergeBaseFinder::new(|oid: &ObjectId| {
                Ok(self.database.parse_object_as_commit(oid)?.parents().to_vec())
            });
            if !finder.is_ancestor(old, new)? {
                tracing::warn!(branch = %branch, old = %old, new = %new, "rejected non-fast-forward push");
                return Err(VcsError::NonFastForward {
                    branch: branch.to_string(),
                });
            }
        }

        self.refs.compare_and_swap(&ref_name, old, new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::objects::blob::Blob;
    use crate::artifacts::objects::commit::{Author, Commit};
    use crate::artifacts::objects::tree::Tree;
    use assert_fs::TempDir;
    use bytes::Bytes;
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};

    #[fixture]
    fn remote() -> (TempDir, RemoteRepository) {
        let dir = TempDir::new().unwrap();
        let git_dir = dir.path().join(".git");
        std::fs::create_dir_all(git_dir.join("objects")).unwrap();
        let refs = Refs::new(git_dir.clone().into_boxed_path());
        refs.set_head(&BranchName::try_parse("master").unwrap()).unwrap();

        let remote = RemoteRepository::open(dir.path()).unwrap();
        (dir, remote)
    }

    fn commit(remote: &RemoteRepository, parents: Vec<ObjectId>, message: &str) -> ObjectId {
        let tree = remote.database().store(&Tree::default()).unwrap();
        let commit = Commit::new(parents, tree, Author::new("Ada", "ada@example.com"), message.to_string());
        remote.database().store(&commit).unwrap()
    }

    fn master() -> SymRefName {
        BranchName::try_parse("master").unwrap().to_head_ref()
    }

    #[rstest]
    fn empty_remote_advertises_its_unborn_head(remote: (TempDir, RemoteRepository)) {
        let (_dir, remote) = remote;
        let advertisement = remote.advertise().unwrap();

        assert_eq!(advertisement.head.as_deref(), Some("master"));
        assert!(advertisement.refs.is_empty());
    }

    #[rstest]
    fn advertisement_lists_only_branches(remote: (TempDir, RemoteRepository)) {
        let (_dir, remote) = remote;
        let tip = commit(&remote, vec![], "first");
        remote.refs().update_ref(&master(), &tip).unwrap();
        let tracking = BranchName::try_parse("master").unwrap().to_remote_ref("origin");
        remote.refs().update_ref(&tracking, &tip).unwrap();

        let advertisement = remote.advertise().unwrap();
        assert_eq!(advertisement.refs.len(), 1);
        assert_eq!(advertisement.tip("refs/heads/master"), Some(&tip));
    }

    #[rstest]
    fn update_ref_accepts_fast_forwards_only(remote: (TempDir, RemoteRepository)) {
        let (_dir, remote) = remote;
        let first = commit(&remote, vec![], "first");
        let second = commit(&remote, vec![first.clone()], "second");
        let sibling = commit(&remote, vec![first.clone()], "sibling");

        remote.update_ref("refs/heads/master", None, &first).unwrap();
        remote.update_ref("refs/heads/master", Some(&first), &second).unwrap();

        let rejected = remote.update_ref("refs/heads/master", Some(&second), &sibling);
        assert!(matches!(rejected, Err(VcsError::NonFastForward { ref branch }) if branch == "master"));
        assert_eq!(remote.refs().read_ref(&master()).unwrap(), second);
    }

    #[rstest]
    fn stale_old_value_is_rejected(remote: (TempDir, RemoteRepository)) {
        let (_dir, remote) = remote;
        let first = commit(&remote, vec![], "first");
        let second = commit(&remote, vec![first.clone()], "second");
        remote.update_ref("refs/heads/master", None, &second).unwrap();

        // the client last saw `first`, but the branch has moved since
        let third = commit(&remote, vec![second.clone()], "third");
        let rejected = remote.update_ref("refs/heads/master", Some(&first), &third);
        assert!(matches!(rejected, Err(VcsError::NonFastForward { .. })));
    }

    #[rstest]
    fn update_ref_requires_the_commit(remote: (TempDir, RemoteRepository)) {
        let (_dir, remote) = remote;
        let missing = ObjectId::try_parse("a".repeat(40)).unwrap();

        let result = remote.update_ref("refs/heads/master", None, &missing);
        assert!(matches!(result, Err(VcsError::NotFound(_))));
    }

    #[rstest]
    fn pushed_objects_are_verified(remote: (TempDir, RemoteRepository)) {
        let (_dir, remote) = remote;
        let data = b"blob 5\0hello".to_vec();
        let id = ObjectId::from_canonical(&data);

        let stored = remote.store_objects(&[WireObject { id: id.clone(), data }]).unwrap();
        assert_eq!(stored, 1);
        assert_eq!(
            remote.database().parse_object_as_blob(&id).unwrap(),
            Blob::new(Bytes::from_static(b"hello"))
        );

        let forged = WireObject {
            id: ObjectId::try_parse("b".repeat(40)).unwrap(),
            data: b"blob 1\0x".to_vec(),
        };
        assert!(matches!(remote.store_objects(&[forged]), Err(VcsError::Corrupt(_))));
    }

    #[rstest]
    fn object_batches_stop_at_the_byte_budget(remote: (TempDir, RemoteRepository)) {
        let (_dir, remote) = remote;
        let blob = |fill: u8, len: usize| {
            remote
                .database()
                .store(&Blob::new(Bytes::from(vec![fill; len])))
                .unwrap()
        };
        let half = MAX_BATCH_BYTES / 2;
        let ids = vec![blob(b'a', half - 64), blob(b'b', half - 64), blob(b'c', half), blob(b'd', 10)];

        let batch = remote.get_objects(&ids).unwrap();
        let received: Vec<_> = batch.iter().map(|object| object.id.clone()).collect();
        assert_eq!(received, ids[..2].to_vec());
        assert!(batch.iter().map(|object| object.data.len()).sum::<usize>() <= MAX_BATCH_BYTES);

        let oversized = blob(b'e', MAX_BATCH_BYTES);
        assert!(remote.get_objects(&[oversized, ids[3].clone()]).unwrap().is_empty());
    }
}
