use crate::areas::repository::Repository;
use crate::artifacts::branch::branch_name::{BranchName, SymRefName};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::transport::parts::LargeObjects;
use crate::artifacts::transport::session::{SyncOptions, SyncPhase, SyncSession};
use crate::artifacts::transport::{self, Transport};
use crate::errors::{Result, VcsError};
use std::collections::{HashSet, VecDeque};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchOutcome {
    /// Branch the remote's `HEAD` names
    pub remote_head: Option<BranchName>,
    /// Remote-tracking branches that moved, with their new tips
    pub updated: Vec<(BranchName, ObjectId)>,
    /// Objects written to the local store
    pub received: usize,
}

impl FetchOutcome {
    pub fn is_up_to_date(&self) -> bool {
        self.updated.is_empty()
    }
}

/// A tracking branch waiting for its objects
struct PendingUpdate {
    branch: BranchName,
    tracking_ref: SymRefName,
    tip: ObjectId,
}

impl Repository {
    pub async fn fetch(&mut self) -> Result<FetchOutcome> {
        self.fetch_with(SyncOptions::default()).await
    }

    /// Bring every branch of the remote into `refs/remotes/<remote>/`.
    ///
    /// Local branches and the working directory are not touched.
    pub async fn fetch_with(&mut self, options: SyncOptions) -> Result<FetchOutcome> {
        self.ensure_open()?;
        let url = self.remote_url()?;
        let mut session = SyncSession::new("fetch", &options, self.config().sync.timeout());

        let mut transport = session.run(transport::connect(&url, options.credential.clone())).await?;
        match self.fetch_from(transport.as_mut(), &mut session).await {
            Ok(outcome) => {
                session.finish();
                Ok(outcome)
            }
            Err(e) => {
                session.fail(&e);
                Err(e)
            }
        }
    }

    pub(crate) fn remote_url(&self) -> Result<String> {
        self.config()
            .remote_url()
            .map(str::to_string)
            .ok_or_else(|| VcsError::InvalidState("no remote configured".into()))
    }

    pub(crate) async fn fetch_from(
        &self,
        transport: &mut dyn Transport,
        session: &mut SyncSession,
    ) -> Result<FetchOutcome> {
        let advertisement = session.run(transport.advertise()).await?;
        let remote_name = self.config().remote_name().to_string();

        let remote_head = advertisement.head.as_deref().map(BranchName::try_parse).transpose()?;

        let mut pending = Vec::new();
        for (ref_name, tip) in &advertisement.refs {
            let branch = BranchName::try_parse_sym_ref_name(&SymRefName::new(ref_name.clone()))?;
            let tracking_ref = branch.to_remote_ref(&remote_name);

            // tips are compared, not looked up in the store, so a transfer
            // interrupted before Integrating is simply redone
            if self.refs().try_read_ref(&tracking_ref)?.as_ref() != Some(tip) {
                pending.push(PendingUpdate {
                    branch,
                    tracking_ref,
                    tip: tip.clone(),
                });
            }
        }

        let mut outcome = FetchOutcome {
            remote_head,
            ..FetchOutcome::default()
        };
        if pending.is_empty() {
            tracing::debug!(remote = %remote_name, "remote-tracking branches up to date");
            return Ok(outcome);
        }

        let wants = Self::dedup(pending.iter().map(|update| update.tip.clone()));
        let haves = Self::dedup(
            self.refs()
                .list_ref_targets()?
                .into_iter()
                .map(|(_, oid)| oid)
                .filter(|oid| self.database().has(oid)),
        );
        let ids = session.run(transport.negotiate(wants, haves)).await?;

        session.enter(SyncPhase::Transferring);
        outcome.received = self.receive_objects(transport, session, ids).await?;

        session.enter(SyncPhase::Integrating);
        for update in pending {
            self.refs().update_ref(&update.tracking_ref, &update.tip)?;
            outcome.updated.push((update.branch, update.tip));
        }

        tracing::info!(
            remote = %remote_name,
            branches = outcome.updated.len(),
            objects = outcome.received,
            "fetched"
        );
        Ok(outcome)
    }

    /// Request the objects this store lacks, verifying each.
    ///
    /// Objects already present, say from an interrupted fetch, are not asked
    /// for again. The remote answers each request with as many objects as fit
    /// in one frame; one too large for any frame is pulled in parts.
    async fn receive_objects(
        &self,
        transport: &mut dyn Transport,
        session: &mut SyncSession,
        ids: Vec<ObjectId>,
    ) -> Result<usize> {
        let mut missing: VecDeque<ObjectId> = ids.into_iter().filter(|id| !self.database().has(id)).collect();
        let batch_size = self.config().sync.batch_size.max(1);
        let total = missing.len();
        session.report(0, total);

        let mut done = 0;
        while let Some(first) = missing.front().cloned() {
            let batch: Vec<ObjectId> = missing.iter().take(batch_size).cloned().collect();
            let objects = session.run(transport.fetch_objects(batch.clone())).await?;

            if objects.is_empty() {
                self.receive_large_object(transport, session, &first).await?;
                missing.pop_front();
                done += 1;
            } else {
                if objects.len() > batch.len() {
                    return Err(VcsError::Network(format!(
                        "remote sent {} objects for a request of {}",
                        objects.len(),
                        batch.len()
                    )));
                }
                for (object, requested) in objects.iter().zip(&batch) {
                    if &object.id != requested {
                        return Err(VcsError::Network(format!(
                            "remote sent object {} instead of {requested}",
                            object.id
                        )));
                    }
                    self.database().put_verified(&object.id, &object.data)?;
                }
                missing = missing.split_off(objects.len());
                done += objects.len();
            }

            session.report(done, total);
        }

        Ok(total)
    }

    async fn receive_large_object(
        &self,
        transport: &mut dyn Transport,
        session: &mut SyncSession,
        id: &ObjectId,
    ) -> Result<()> {
        let mut large_objects = LargeObjects::default();
        let mut offset = 0;

        loop {
            let part = session.run(transport.fetch_object_part(id.clone(), offset)).await?;
            if &part.id != id || part.offset != offset {
                return Err(VcsError::Network(format!(
                    "remote sent part {}@{} while {id}@{offset} was requested",
                    part.id, part.offset
                )));
            }
            offset += part.data.len() as u64;
            if large_objects.write_part(self.database(), part)? {
                tracing::debug!(oid = %id, size = offset, "received object in parts");
                return Ok(());
            }
        }
    }

    fn dedup(oids: impl Iterator<Item = ObjectId>) -> Vec<ObjectId> {
        let mut seen = HashSet::new();
        oids.filter(|oid| seen.insert(oid.clone())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::objects::commit::Author;
    use crate::artifacts::transport::local::LocalTransport;
    use crate::artifacts::transport::{Advertisement, ObjectPart, WireObject};
    use crate::commands::porcelain::init::InitOptions;
    use assert_fs::TempDir;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::path::Path;
    use std::time::Duration;

    /// A local remote whose connection drops after `requests_left` object requests
    struct DroppingTransport {
        inner: LocalTransport,
        requests_left: usize,
        requested: Vec<ObjectId>,
    }

    impl DroppingTransport {
        fn new(remote: &Path, requests_left: usize) -> Self {
            DroppingTransport {
                inner: LocalTransport::open(remote).unwrap(),
                requests_left,
                requested: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl Transport for DroppingTransport {
        async fn advertise(&mut self) -> Result<Advertisement> {
            self.inner.advertise().await
        }

        async fn negotiate(&mut self, wants: Vec<ObjectId>, haves: Vec<ObjectId>) -> Result<Vec<ObjectId>> {
            self.inner.negotiate(wants, haves).await
        }

        async fn fetch_objects(&mut self, ids: Vec<ObjectId>) -> Result<Vec<WireObject>> {
            if self.requests_left == 0 {
                return Err(VcsError::Network("connection reset by peer".into()));
            }
            self.requests_left -= 1;
            self.requested.extend(ids.iter().cloned());
            self.inner.fetch_objects(ids).await
        }

        async fn fetch_object_part(&mut self, id: ObjectId, offset: u64) -> Result<ObjectPart> {
            self.inner.fetch_object_part(id, offset).await
        }

        async fn send_objects(&mut self, objects: Vec<WireObject>) -> Result<usize> {
            self.inner.send_objects(objects).await
        }

        async fn send_object_part(&mut self, part: ObjectPart) -> Result<()> {
            self.inner.send_object_part(part).await
        }

        async fn update_ref(&mut self, name: String, old: Option<ObjectId>, new: ObjectId) -> Result<()> {
            self.inner.update_ref(name, old, new).await
        }
    }

    fn session() -> SyncSession {
        SyncSession::new("fetch", &SyncOptions::default(), Duration::from_secs(5))
    }

    /// A remote with one commit of three files, and an empty repository
    /// tracking it that asks for one object per request.
    fn remote_and_local(dir: &Path) -> (ObjectId, Repository) {
        let remote_path = dir.join("remote");
        let mut remote = Repository::init(&remote_path, InitOptions::default()).unwrap();
        for (name, content) in [("a.txt", "alpha\n"), ("b.txt", "beta\n"), ("c.txt", "gamma\n")] {
            std::fs::write(remote_path.join(name), content).unwrap();
        }
        let tip = remote
            .commit_as(&[], "three files", Author::new("Ada", "ada@example.com"))
            .unwrap();
        remote.free();

        let local_path = dir.join("local");
        let mut local = Repository::init(&local_path, InitOptions::default()).unwrap();
        local.set_remote(remote_path.display().to_string()).unwrap();
        let mut config = local.config().clone();
        config.sync.batch_size = 1;
        config.save(local.git_dir()).unwrap();
        local.free();

        (tip, Repository::open(&local_path).unwrap())
    }

    #[tokio::test]
    async fn an_interrupted_fetch_resumes_with_only_the_missing_objects() {
        let dir = TempDir::new().unwrap();
        let (tip, local) = remote_and_local(dir.path());
        let remote_path = dir.path().join("remote");
        let tracking = BranchName::try_parse("master").unwrap().to_remote_ref("origin");

        let mut dropping = DroppingTransport::new(&remote_path, 2);
        let interrupted = local.fetch_from(&mut dropping, &mut session()).await;
        assert!(matches!(interrupted, Err(ref e) if e.is_retryable()));
        assert_eq!(local.refs().try_read_ref(&tracking).unwrap(), None);
        assert_eq!(dropping.requested.len(), 2);
        assert!(dropping.requested.iter().all(|id| local.database().has(id)));

        let mut resumed = DroppingTransport::new(&remote_path, usize::MAX);
        let outcome = local.fetch_from(&mut resumed, &mut session()).await.unwrap();

        // commit, tree and three blobs, two of which arrived the first time
        assert_eq!(outcome.received, 3);
        assert_eq!(resumed.requested.len(), 3);
        assert!(resumed.requested.iter().all(|id| !dropping.requested.contains(id)));
        assert_eq!(outcome.updated, vec![(BranchName::try_parse("master").unwrap(), tip.clone())]);
        assert_eq!(local.refs().try_read_ref(&tracking).unwrap(), Some(tip));
    }

    #[tokio::test]
    async fn a_remote_answering_with_other_objects_is_a_network_error() {
        struct Swapping(LocalTransport);

        #[async_trait]
        impl Transport for Swapping {
            async fn advertise(&mut self) -> Result<Advertisement> {
                self.0.advertise().await
            }

            async fn negotiate(&mut self, wants: Vec<ObjectId>, haves: Vec<ObjectId>) -> Result<Vec<ObjectId>> {
                self.0.negotiate(wants, haves).await
            }

            async fn fetch_objects(&mut self, ids: Vec<ObjectId>) -> Result<Vec<WireObject>> {
                let mut objects = self.0.fetch_objects(ids).await?;
                objects.reverse();
                Ok(objects)
            }

            async fn fetch_object_part(&mut self, id: ObjectId, offset: u64) -> Result<ObjectPart> {
                self.0.fetch_object_part(id, offset).await
            }

            async fn send_objects(&mut self, objects: Vec<WireObject>) -> Result<usize> {
                self.0.send_objects(objects).await
            }

            async fn send_object_part(&mut self, part: ObjectPart) -> Result<()> {
                self.0.send_object_part(part).await
            }

            async fn update_ref(&mut self, name: String, old: Option<ObjectId>, new: ObjectId) -> Result<()> {
                self.0.update_ref(name, old, new).await
            }
        }

        let dir = TempDir::new().unwrap();
        let (_tip, local) = remote_and_local(dir.path());
        let mut config = local.config().clone();
        config.sync.batch_size = 64;
        config.save(local.git_dir()).unwrap();
        drop(local);
        let local = Repository::open(dir.path().join("local")).unwrap();

        let mut swapping = Swapping(LocalTransport::open(&dir.path().join("remote")).unwrap());
        let result = local.fetch_from(&mut swapping, &mut session()).await;

        assert!(matches!(result, Err(VcsError::Network(_))));
    }
}
