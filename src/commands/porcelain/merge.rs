//! Integration of the remote-tracking branch into the active branch
//!
//! With L the local tip and R the remote-tracking tip:
//!
//! - no R, L == R, or R an ancestor of L: nothing to do
//! - no L, or L an ancestor of R: fast-forward to R
//! - otherwise: three-way merge against the merge base, committed with
//!   parents (L, R)
//!
//! Conflicts and local changes in the way are detected before anything is
//! written, so a failed merge leaves references, objects and the working
//! directory as they were.

use crate::areas::repository::Repository;
use crate::artifacts::branch::branch_name::SymRefName;
use crate::artifacts::diff::tree_diff::{self, ChangeSet};
use crate::artifacts::merge::merge_base::MergeBaseFinder;
use crate::artifacts::merge::three_way::ThreeWayMerge;
use crate::artifacts::objects::commit::Commit;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::tree_builder::{ChangeMap, TreeBuilder};
use crate::artifacts::transport::session::{SyncOptions, SyncPhase, SyncSession};
use crate::errors::{Result, VcsError};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    UpToDate,
    FastForward(ObjectId),
    /// The new merge commit
    Merged(ObjectId),
}

impl Repository {
    pub async fn merge(&mut self) -> Result<MergeOutcome> {
        self.merge_with(SyncOptions::default()).await
    }

    /// Merge `refs/remotes/<remote>/<branch>` into the active branch.
    pub async fn merge_with(&mut self, options: SyncOptions) -> Result<MergeOutcome> {
        self.ensure_open()?;
        let mut session = SyncSession::new("merge", &options, self.config().sync.timeout());
        session.enter(SyncPhase::Integrating);

        match self.merge_tracking_branch() {
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

    fn merge_tracking_branch(&self) -> Result<MergeOutcome> {
        let branch_ref = self.refs().current_ref()?;
        let branch = self.refs().current_branch()?;
        let tracking_ref = branch.to_remote_ref(self.config().remote_name());

        let Some(remote) = self.refs().try_read_ref(&tracking_ref)? else {
            tracing::debug!(tracking = %tracking_ref, "nothing fetched to merge");
            return Ok(MergeOutcome::UpToDate);
        };
        let local = self.refs().try_read_ref(&branch_ref)?;

        let finder = MergeBaseFinder::new(|oid: &ObjectId| {
            Ok(self.database().parse_object_as_commit(oid)?.parents().to_vec())
        });

        let Some(local) = local else {
            return self.fast_forward(&branch_ref, None, &remote);
        };
        if local == remote || finder.is_ancestor(&remote, &local)? {
            return Ok(MergeOutcome::UpToDate);
        }
        if finder.is_ancestor(&local, &remote)? {
            return self.fast_forward(&branch_ref, Some(&local), &remote);
        }

        let base = finder.find_merge_base(&local, &remote)?;
        self.three_way_merge(&branch_ref, base.as_ref(), &local, &remote, &tracking_ref)
    }

    fn fast_forward(
        &self,
        branch_ref: &SymRefName,
        local: Option<&ObjectId>,
        remote: &ObjectId,
    ) -> Result<MergeOutcome> {
        let local_tree = self.commit_tree(local)?;
        let remote_tree = self.database().parse_object_as_commit(remote)?.tree_oid().clone();

        if let Ok(workspace) = self.workspace() {
            let incoming = Self::as_change_map(tree_diff::compare_flat(
                &tree_diff::flatten_tree(self.database(), local_tree.as_ref())?,
                &tree_diff::flatten_tree(self.database(), Some(&remote_tree))?,
            ));
            self.ensure_not_overwritten(local_tree.as_ref(), &incoming)?;
            workspace.checkout(self.database(), &remote_tree, local_tree.as_ref())?;
        }

        self.refs().compare_and_swap(branch_ref, local, remote)?;
        tracing::info!(branch = %branch_ref, to = %remote, "fast-forwarded");

        Ok(MergeOutcome::FastForward(remote.clone()))
    }

    fn three_way_merge(
        &self,
        branch_ref: &SymRefName,
        base: Option<&ObjectId>,
        local: &ObjectId,
        remote: &ObjectId,
        tracking_ref: &SymRefName,
    ) -> Result<MergeOutcome> {
        let base_tree = self.commit_tree(base)?;
        let local_tree = self.database().parse_object_as_commit(local)?.tree_oid().clone();
        let remote_tree = self.database().parse_object_as_commit(remote)?.tree_oid().clone();

        let base_files = tree_diff::flatten_tree(self.database(), base_tree.as_ref())?;
        let local_files = tree_diff::flatten_tree(self.database(), Some(&local_tree))?;
        let remote_files = tree_diff::flatten_tree(self.database(), Some(&remote_tree))?;

        let local_changes = tree_diff::compare_flat(&base_files, &local_files);
        let remote_changes = tree_diff::compare_flat(&base_files, &remote_files);
        let resolution = ThreeWayMerge::new(&local_changes, &remote_changes, &local_files).resolve();

        if !resolution.is_clean() {
            tracing::warn!(branch = %branch_ref, conflicts = resolution.conflicts.len(), "merge conflict");
            return Err(VcsError::MergeConflict {
                paths: resolution.conflicts,
            });
        }

        let author = self.config().author()?;
        self.ensure_not_overwritten(Some(&local_tree), &resolution.changes)?;

        let merged_tree = TreeBuilder::new(self.database()).apply(Some(&local_tree), &resolution.changes)?;
        if let Ok(workspace) = self.workspace() {
            workspace.checkout(self.database(), &merged_tree, Some(&local_tree))?;
        }

        let tracking_name = tracking_ref
            .as_ref_path()
            .strip_prefix("refs/remotes/")
            .unwrap_or(tracking_ref.as_ref_path());
        let commit = Commit::new(
            vec![local.clone(), remote.clone()],
            merged_tree,
            author,
            format!("Merge remote-tracking branch '{tracking_name}'"),
        );
        let commit_oid = self.database().store(&commit)?;
        self.refs().compare_and_swap(branch_ref, Some(local), &commit_oid)?;

        tracing::info!(
            branch = %branch_ref,
            base = ?base.map(ObjectId::to_short_oid),
            commit = %commit_oid,
            files = resolution.changes.len(),
            "merged"
        );
        Ok(MergeOutcome::Merged(commit_oid))
    }

    /// Refuse to overwrite local modifications on paths the merge rewrites.
    ///
    /// A modified file that already matches the incoming content is fine.
    fn ensure_not_overwritten(&self, current_tree: Option<&ObjectId>, incoming: &ChangeMap) -> Result<()> {
        let Ok(workspace) = self.workspace() else {
            return Ok(());
        };

        let blocked: Vec<PathBuf> = workspace
            .changes_against(self.database(), current_tree)?
            .into_iter()
            .filter(|(path, change)| {
                incoming
                    .get(path)
                    .is_some_and(|target| change.new_entry() != target.as_ref())
            })
            .map(|(path, _)| path)
            .collect();

        if blocked.is_empty() {
            Ok(())
        } else {
            Err(VcsError::UncommittedChanges { paths: blocked })
        }
    }

    fn as_change_map(changes: ChangeSet) -> ChangeMap {
        changes
            .into_iter()
            .map(|(path, change)| {
                let entry = change.new_entry().cloned();
                (path, entry)
            })
            .collect()
    }
}
