use crate::areas::repository::Repository;
use crate::artifacts::branch::branch_name::BranchName;
use crate::artifacts::merge::merge_base::MergeBaseFinder;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::transport::message::MAX_BATCH_BYTES;
use crate::artifacts::transport::negotiation::ObjectWalker;
use crate::artifacts::transport::parts;
use crate::artifacts::transport::session::{SyncOptions, SyncPhase, SyncSession};
use crate::artifacts::transport::{self, Transport, WireObject};
use crate::errors::{Result, VcsError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    UpToDate,
    Pushed {
        branch: BranchName,
        old: Option<ObjectId>,
        new: ObjectId,
        /// Objects sent to the remote
        objects: usize,
    },
}

impl Repository {
    pub async fn push(&mut self) -> Result<PushOutcome> {
        self.push_with(SyncOptions::default()).await
    }

    /// Publish the active branch to the same-named branch of the remote.
    ///
    /// The remote branch must be exactly where the last fetch saw it, and
    /// that commit must be part of the local history.
    pub async fn push_with(&mut self, options: SyncOptions) -> Result<PushOutcome> {
        self.ensure_open()?;
        let url = self.remote_url()?;
        let branch = self.refs().current_branch()?;
        let local = self
            .refs()
            .read_head()?
            .ok_or_else(|| VcsError::InvalidState(format!("branch {branch} has no commits to push")))?;

        let mut session = SyncSession::new("push", &options, self.config().sync.timeout());
        let mut transport = session.run(transport::connect(&url, options.credential.clone())).await?;

        match self.push_to(transport.as_mut(), &mut session, &branch, &local).await {
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

    async fn push_to(
        &self,
        transport: &mut dyn Transport,
        session: &mut SyncSession,
        branch: &BranchName,
        local: &ObjectId,
    ) -> Result<PushOutcome> {
        let remote_ref = branch.to_head_ref();
        let tracking_ref = branch.to_remote_ref(self.config().remote_name());

        let advertisement = session.run(transport.advertise()).await?;
        let remote_tip = advertisement.tip(remote_ref.as_ref_path()).cloned();
        let tracking_tip = self.refs().try_read_ref(&tracking_ref)?;

        if remote_tip.as_ref() == Some(local) {
            if tracking_tip.as_ref() != Some(local) {
                self.refs().update_ref(&tracking_ref, local)?;
            }
            return Ok(PushOutcome::UpToDate);
        }

        if remote_tip != tracking_tip || !self.contains_commit(local, remote_tip.as_ref())? {
            tracing::warn!(
                branch = %branch,
                remote = ?remote_tip.as_ref().map(ObjectId::to_short_oid),
                tracking = ?tracking_tip.as_ref().map(ObjectId::to_short_oid),
                "push rejected: remote branch has diverged"
            );
            return Err(VcsError::NonFastForward {
                branch: branch.to_string(),
            });
        }

        let haves: Vec<ObjectId> = remote_tip.iter().cloned().collect();
        let ids = ObjectWalker::new(self.database()).missing_objects(std::slice::from_ref(local), &haves)?;

        session.enter(SyncPhase::Transferring);
        let total = ids.len();
        session.report(0, total);
        let batch_size = self.config().sync.batch_size.max(1);
        let mut done = 0;
        let mut batch = Vec::new();
        let mut batch_bytes = 0;
        for id in &ids {
            let data = self.database().load(id)?;
            if data.len() > MAX_BATCH_BYTES {
                for part in parts::split(id, &data) {
                    session.run(transport.send_object_part(part)).await?;
                }
                done += 1;
                session.report(done, total);
                continue;
            }

            if !batch.is_empty() && (batch.len() >= batch_size || batch_bytes + data.len() > MAX_BATCH_BYTES) {
                done += batch.len();
                session.run(transport.send_objects(std::mem::take(&mut batch))).await?;
                batch_bytes = 0;
                session.report(done, total);
            }
            batch_bytes += data.len();
            batch.push(WireObject {
                id: id.clone(),
                data: data.to_vec(),
            });
        }
        if !batch.is_empty() {
            done += batch.len();
            session.run(transport.send_objects(batch)).await?;
            session.report(done, total);
        }

        session.enter(SyncPhase::Integrating);
        session
            .run(transport.update_ref(remote_ref.to_string(), remote_tip.clone(), local.clone()))
            .await?;
        self.refs().update_ref(&tracking_ref, local)?;

        tracing::info!(branch = %branch, to = %local, objects = total, "pushed");
        Ok(PushOutcome::Pushed {
            branch: branch.clone(),
            old: remote_tip,
            new: local.clone(),
            objects: total,
        })
    }

    /// Whether `ancestor` (when present) is part of `tip`'s history.
    fn contains_commit(&self, tip: &ObjectId, ancestor: Option<&ObjectId>) -> Result<bool> {
        let Some(ancestor) = ancestor else {
            return Ok(true);
        };
        if !self.database().has(ancestor) {
            return Ok(false);
        }

        MergeBaseFinder::new(|oid: &ObjectId| Ok(self.database().parse_object_as_commit(oid)?.parents().to_vec()))
            .is_ancestor(ancestor, tip)
    }
}
