//! Merge base search
//!
//! Both tips are walked breadth-first in lockstep. Each commit carries the
//! set of sides it was reached from; the first commit whose set becomes
//! `BOTH` is the merge base. When several commits qualify in the same round,
//! the one discovered first wins.
//!
//! Ancestry checks (`is_ancestor`) are separate single-sided walks; the merge
//! driver uses them to detect up-to-date and fast-forward cases before any
//! base is searched.

use crate::artifacts::objects::object_id::ObjectId;
use crate::errors::Result;
use bitflags::bitflags;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

bitflags! {
    #[derive(Clone, Copy, PartialEq, Eq, Hash)]
    struct VisitState: u8 {
        const NONE = 0b00;
        const FROM_LOCAL = 0b01;
        const FROM_REMOTE = 0b10;
        const FROM_BOTH = Self::FROM_LOCAL.bits() | Self::FROM_REMOTE.bits();
    }
}

impl fmt::Debug for VisitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut flags = Vec::new();
        if self.contains(VisitState::FROM_LOCAL) {
            flags.push("LOCAL");
        }
        if self.contains(VisitState::FROM_REMOTE) {
            flags.push("REMOTE");
        }
        if flags.is_empty() {
            write!(f, "NONE")
        } else {
            write!(f, "{}", flags.join("|"))
        }
    }
}

/// Walks commit parents through a caller-supplied loader, so the search
/// works the same over the object store and over in-memory graphs.
pub struct MergeBaseFinder<ParentsLoaderFn>
where
    ParentsLoaderFn: Fn(&ObjectId) -> Result<Vec<ObjectId>>,
{
    parents_loader: ParentsLoaderFn,
}

impl<ParentsLoaderFn> MergeBaseFinder<ParentsLoaderFn>
where
    ParentsLoaderFn: Fn(&ObjectId) -> Result<Vec<ObjectId>>,
{
    pub fn new(parents_loader: ParentsLoaderFn) -> Self {
        Self { parents_loader }
    }

    /// First commit reachable from both tips, or `None` for unrelated histories.
    pub fn find_merge_base(&self, local: &ObjectId, remote: &ObjectId) -> Result<Option<ObjectId>> {
        if local == remote {
            return Ok(Some(local.clone()));
        }

        let mut states = HashMap::from([
            (local.clone(), VisitState::FROM_LOCAL),
            (remote.clone(), VisitState::FROM_REMOTE),
        ]);
        let mut queue = VecDeque::from([
            (local.clone(), VisitState::FROM_LOCAL),
            (remote.clone(), VisitState::FROM_REMOTE),
        ]);

        while let Some((commit_id, side)) = queue.pop_front() {
            tracing::trace!(commit = %commit_id, side = ?side, "visiting commit");

            for parent_id in (self.parents_loader)(&commit_id)? {
                let state = states.entry(parent_id.clone()).or_insert(VisitState::NONE);
                if state.contains(side) {
                    continue;
                }

                *state |= side;
                if state.contains(VisitState::FROM_BOTH) {
                    tracing::debug!(base = %parent_id, "merge base found");
                    return Ok(Some(parent_id));
                }

                queue.push_back((parent_id, side));
            }
        }

        Ok(None)
    }

    /// Whether `ancestor` is reachable from `descendant` (a commit is its own ancestor).
    pub fn is_ancestor(&self, ancestor: &ObjectId, descendant: &ObjectId) -> Result<bool> {
        let mut visited = HashSet::from([descendant.clone()]);
        let mut queue = VecDeque::from([descendant.clone()]);

        while let Some(commit_id) = queue.pop_front() {
            if &commit_id == ancestor {
                return Ok(true);
            }

            for parent_id in (self.parents_loader)(&commit_id)? {
                if visited.insert(parent_id.clone()) {
                    queue.push_back(parent_id);
                }
            }
        }

        Ok(false)
    }
}
