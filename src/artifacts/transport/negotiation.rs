//! Have/want negotiation
//!
//! Given the tips a peer wants and the tips it already has, compute the
//! objects to transfer: everything reachable from a want that is not
//! reachable from a have. Commits come first, newest first, followed by the
//! trees and blobs they introduce.

use crate::areas::database::Database;
use crate::artifacts::objects::object_id::ObjectId;
use crate::errors::{Result, VcsError};
use std::collections::{HashSet, VecDeque};

pub struct ObjectWalker<'d> {
    database: &'d Database,
}

impl<'d> ObjectWalker<'d> {
    pub fn new(database: &'d Database) -> Self {
        Self { database }
    }

    /// Objects reachable from `wants` but not from `haves`.
    ///
    /// Haves unknown to this store are ignored; a want it lacks is `NotFound`.
    pub fn missing_objects(&self, wants: &[ObjectId], haves: &[ObjectId]) -> Result<Vec<ObjectId>> {
        let known_haves: Vec<ObjectId> = haves.iter().filter(|oid| self.database.has(oid)).cloned().collect();

        let mut excluded = HashSet::new();
        let have_commits = self.walk_commits(&known_haves, &HashSet::new())?;
        for commit in &have_commits {
            excluded.insert(commit.clone());
        }
        for commit in &have_commits {
            self.walk_tree_of(commit, &mut excluded, &mut Vec::new())?;
        }

        for want in wants {
            if !self.database.has(want) {
                return Err(VcsError::NotFound(format!("object {want}")));
            }
        }

        let commits = self.walk_commits(wants, &excluded)?;
        let mut objects = commits.clone();
        let mut seen = excluded;
        seen.extend(commits.iter().cloned());
        for commit in &commits {
            self.walk_tree_of(commit, &mut seen, &mut objects)?;
        }

        tracing::debug!(
            wants = wants.len(),
            haves = known_haves.len(),
            commits = commits.len(),
            objects = objects.len(),
            "negotiated object set"
        );

        Ok(objects)
    }

    /// Commits reachable from `tips`, breadth-first, stopping at `stop`.
    fn walk_commits(&self, tips: &[ObjectId], stop: &HashSet<ObjectId>) -> Result<Vec<ObjectId>> {
        let mut visited = HashSet::new();
        let mut queue: VecDeque<ObjectId> = tips.iter().filter(|tip| !stop.contains(*tip)).cloned().collect();
        let mut commits = Vec::new();

        while let Some(oid) = queue.pop_front() {
            if !visited.insert(oid.clone()) {
                continue;
            }

            let commit = self.database.parse_object_as_commit(&oid)?;
            for parent in commit.parents() {
                if !stop.contains(parent) && !visited.contains(parent) {
                    queue.push_back(parent.clone());
                }
            }
            commits.push(oid);
        }

        Ok(commits)
    }

    fn walk_tree_of(&self, commit: &ObjectId, seen: &mut HashSet<ObjectId>, out: &mut Vec<ObjectId>) -> Result<()> {
        let tree = self.database.parse_object_as_commit(commit)?.tree_oid().clone();
        self.walk_tree(tree, seen, out)
    }

    // Subtrees already seen are skipped whole, which is what makes shared
    // history cheap to exclude.
    fn walk_tree(&self, tree: ObjectId, seen: &mut HashSet<ObjectId>, out: &mut Vec<ObjectId>) -> Result<()> {
        if !seen.insert(tree.clone()) {
            return Ok(());
        }
        out.push(tree.clone());

        for (_, entry) in self.database.parse_object_as_tree(&tree)?.into_entries() {
            if entry.is_tree() {
                self.walk_tree(entry.oid, seen, out)?;
            } else if seen.insert(entry.oid.clone()) {
                out.push(entry.oid);
            }
        }

        Ok(())
    }
}
