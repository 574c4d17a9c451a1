//! Per-path three-way resolution
//!
//! | base → local | base → remote | result           |
//! |--------------|---------------|------------------|
//! | unchanged    | any           | take remote      |
//! | any          | unchanged     | keep local       |
//! | X            | X             | keep (identical) |
//! | X            | Y             | conflict         |
//!
//! The result is expressed as a change set relative to the local tree, so the
//! merged tree is built with `TreeBuilder` and shares every subtree the
//! remote side did not touch.

use crate::artifacts::diff::tree_diff::{ChangeSet, FlatTree};
use crate::artifacts::objects::tree_builder::ChangeMap;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, PartialEq)]
pub struct MergeResolution {
    /// Remote-side changes to apply on top of the local tree
    pub changes: ChangeMap,
    /// Paths changed differently on both sides
    pub conflicts: Vec<PathBuf>,
}

impl MergeResolution {
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }
}

pub struct ThreeWayMerge<'m> {
    local_changes: &'m ChangeSet,
    remote_changes: &'m ChangeSet,
    local_files: &'m FlatTree,
}

impl<'m> ThreeWayMerge<'m> {
    /// `local_changes` and `remote_changes` are diffs from the merge base;
    /// `local_files` is the flattened local tree.
    pub fn new(local_changes: &'m ChangeSet, remote_changes: &'m ChangeSet, local_files: &'m FlatTree) -> Self {
        Self {
            local_changes,
            remote_changes,
            local_files,
        }
    }

    pub fn resolve(&self) -> MergeResolution {
        let mut resolution = MergeResolution::default();
        let mut conflicts = BTreeSet::new();

        for (path, remote_change) in self.remote_changes {
            let remote_entry = remote_change.new_entry();

            match self.local_changes.get(path) {
                // unchanged locally: take remote
                None => {
                    if self.collides_with_local_layout(path, remote_entry.is_some()) {
                        conflicts.insert(path.clone());
                    } else {
                        resolution.changes.insert(path.clone(), remote_entry.cloned());
                    }
                }
                Some(local_change) if local_change.new_entry() == remote_entry => {}
                Some(_) => {
                    conflicts.insert(path.clone());
                }
            }
        }

        resolution.conflicts = conflicts.into_iter().collect();
        resolution
    }

    // A remote file whose parent became a local file, or a remote file where
    // the local side now has a directory.
    fn collides_with_local_layout(&self, path: &Path, adds_file: bool) -> bool {
        if !adds_file {
            return false;
        }

        let parent_is_local_file = path
            .ancestors()
            .skip(1)
            .filter(|ancestor| !ancestor.as_os_str().is_empty())
            .any(|ancestor| self.local_files.contains_key(ancestor));
        let path_is_local_dir = self
            .local_files
            .range(path.to_path_buf()..)
            .next()
            .is_some_and(|(next, _)| next != path && next.starts_with(path));

        parent_is_local_file || path_is_local_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::database::database_entry::DatabaseEntry;
    use crate::artifacts::diff::tree_diff::compare_flat;
    use crate::artifacts::objects::entry_mode::{EntryMode, FileMode};
    use crate::artifacts::objects::object_id::ObjectId;
    use pretty_assertions::assert_eq;

    fn entry(c: char) -> DatabaseEntry {
        DatabaseEntry::new(
            ObjectId::try_parse(c.to_string().repeat(40)).unwrap(),
            EntryMode::File(FileMode::Regular),
        )
    }

    fn flat(files: &[(&str, char)]) -> FlatTree {
        files.iter().map(|(path, c)| (PathBuf::from(path), entry(*c))).collect()
    }

    fn resolve(base: &FlatTree, local: &FlatTree, remote: &FlatTree) -> MergeResolution {
        let local_changes = compare_flat(base, local);
        let remote_changes = compare_flat(base, remote);
        ThreeWayMerge::new(&local_changes, &remote_changes, local).resolve()
    }

    #[test]
    fn disjoint_edits_take_the_remote_side() {
        let base = flat(&[("a.txt", '1'), ("b.txt", '2'), ("c.txt", '3')]);
        let local = flat(&[("a.txt", '4'), ("b.txt", '2'), ("c.txt", '3')]);
        let remote = flat(&[("a.txt", '1'), ("b.txt", '5'), ("new.txt", '6')]);

        let resolution = resolve(&base, &local, &remote);

        assert!(resolution.is_clean());
        assert_eq!(
            resolution.changes,
            ChangeMap::from([
                (PathBuf::from("b.txt"), Some(entry('5'))),
                (PathBuf::from("c.txt"), None),
                (PathBuf::from("new.txt"), Some(entry('6'))),
            ])
        );
    }

    #[test]
    fn identical_changes_on_both_sides_are_kept() {
        let base = flat(&[("a.txt", '1')]);
        let both = flat(&[("a.txt", '2')]);

        let resolution = resolve(&base, &both, &both);

        assert!(resolution.is_clean());
        assert!(resolution.changes.is_empty());
    }

    #[test]
    fn divergent_edits_conflict() {
        let base = flat(&[("a.txt", '1'), ("b.txt", '2')]);
        let local = flat(&[("a.txt", '3')]);
        let remote = flat(&[("a.txt", '4'), ("b.txt", '5')]);

        let resolution = resolve(&base, &local, &remote);

        assert_eq!(resolution.conflicts, vec![PathBuf::from("a.txt"), PathBuf::from("b.txt")]);
    }

    #[test]
    fn remote_file_under_a_local_file_conflicts() {
        let base = flat(&[]);
        let local = flat(&[("docs", '1')]);
        let remote = flat(&[("docs/readme.md", '2')]);

        let resolution = resolve(&base, &local, &remote);

        assert_eq!(resolution.conflicts, vec![PathBuf::from("docs/readme.md")]);
    }
}
