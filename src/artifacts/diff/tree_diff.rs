use crate::areas::database::Database;
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::objects::object_id::ObjectId;
use crate::errors::Result;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Kind of change of a single file between two snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
}

impl ChangeKind {
    pub fn status_char(&self) -> char {
        match self {
            ChangeKind::Added => 'A',
            ChangeKind::Modified => 'M',
            ChangeKind::Deleted => 'D',
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TreeChangeType {
    Added(DatabaseEntry),
    Deleted(DatabaseEntry),
    Modified {
        old: DatabaseEntry,
        new: DatabaseEntry,
    },
}

impl TreeChangeType {
    pub fn from_entries(old: Option<DatabaseEntry>, new: Option<DatabaseEntry>) -> Option<Self> {
        match (old, new) {
            (None, Some(new)) => Some(TreeChangeType::Added(new)),
            (Some(old), None) => Some(TreeChangeType::Deleted(old)),
            (Some(old), Some(new)) if old != new => Some(TreeChangeType::Modified { old, new }),
            _ => None,
        }
    }

    pub fn kind(&self) -> ChangeKind {
        match self {
            TreeChangeType::Added(_) => ChangeKind::Added,
            TreeChangeType::Deleted(_) => ChangeKind::Deleted,
            TreeChangeType::Modified { .. } => ChangeKind::Modified,
        }
    }

    pub fn new_entry(&self) -> Option<&DatabaseEntry> {
        match self {
            TreeChangeType::Added(entry) => Some(entry),
            TreeChangeType::Modified { new, .. } => Some(new),
            TreeChangeType::Deleted(_) => None,
        }
    }
}

/// File-level changes keyed by path
pub type ChangeSet = BTreeMap<PathBuf, TreeChangeType>;
/// Every file of a snapshot keyed by its full path
pub type FlatTree = BTreeMap<PathBuf, DatabaseEntry>;
pub type TreeEntryMap = BTreeMap<String, DatabaseEntry>;

/// Recursively list the files (never directories) of `tree`.
///
/// `None` stands for the empty tree of an unborn branch.
pub fn flatten_tree(database: &Database, tree: Option<&ObjectId>) -> Result<FlatTree> {
    let mut files = BTreeMap::new();
    if let Some(tree) = tree {
        flatten_into(database, tree, Path::new(""), &mut files)?;
    }

    Ok(files)
}

fn flatten_into(database: &Database, tree: &ObjectId, prefix: &Path, files: &mut FlatTree) -> Result<()> {
    for (name, entry) in database.parse_object_as_tree(tree)?.into_entries() {
        let path = prefix.join(name);
        if entry.is_tree() {
            flatten_into(database, &entry.oid, &path, files)?;
        } else {
            files.insert(path, entry);
        }
    }

    Ok(())
}

/// Compare two flattened snapshots.
pub fn compare_flat(old: &FlatTree, new: &FlatTree) -> ChangeSet {
    let mut change_set = ChangeSet::new();

    for (path, entry) in old {
        if let Some(change) = TreeChangeType::from_entries(Some(entry.clone()), new.get(path).cloned()) {
            change_set.insert(path.clone(), change);
        }
    }
    for (path, entry) in new {
        if !old.contains_key(path) {
            change_set.insert(path.clone(), TreeChangeType::Added(entry.clone()));
        }
    }

    change_set
}

/// Tree-to-tree diff that skips identical subtrees without loading them.
#[derive(Debug)]
pub struct TreeDiff<'r> {
    database: &'r Database,
    change_set: ChangeSet,
}

impl<'r> TreeDiff<'r> {
    pub fn new(database: &'r Database) -> Self {
        TreeDiff {
            database,
            change_set: BTreeMap::new(),
        }
    }

    pub fn changes(&self) -> &ChangeSet {
        &self.change_set
    }

    pub fn into_changes(self) -> ChangeSet {
        self.change_set
    }

    pub fn compare_oids(&mut self, old: Option<&ObjectId>, new: Option<&ObjectId>, prefix: &Path) -> Result<()> {
        if old == new {
            return Ok(());
        }

        let old_tree_entries = self.inflate_oid_to_tree_entries(old)?;
        let new_tree_entries = self.inflate_oid_to_tree_entries(new)?;

        self.detect_deletions(&old_tree_entries, &new_tree_entries, prefix)?;
        self.detect_additions(&old_tree_entries, &new_tree_entries, prefix)?;

        Ok(())
    }

    fn inflate_oid_to_tree_entries(&self, oid: Option<&ObjectId>) -> Result<TreeEntryMap> {
        match oid {
            None => Ok(BTreeMap::new()),
            Some(oid) => Ok(self.database.parse_object_as_tree(oid)?.into_entries()),
        }
    }

    fn detect_deletions(&mut self, old: &TreeEntryMap, new: &TreeEntryMap, prefix: &Path) -> Result<()> {
        for (name, entry) in old {
            let path = prefix.join(name);
            let other = new.get(name);

            if other == Some(entry) {
                continue;
            }

            let tree_a_oid = entry.is_tree().then_some(&entry.oid);
            let tree_b_oid = other.filter(|other| other.is_tree()).map(|other| &other.oid);
            self.compare_oids(tree_a_oid, tree_b_oid, &path)?;

            let blob_a = (!entry.is_tree()).then(|| entry.clone());
            let blob_b = other.filter(|other| !other.is_tree()).cloned();

            if let Some(change_type) = TreeChangeType::from_entries(blob_a, blob_b) {
                self.change_set.insert(path, change_type);
            }
        }

        Ok(())
    }

    fn detect_additions(&mut self, old: &TreeEntryMap, new: &TreeEntryMap, prefix: &Path) -> Result<()> {
        for (name, entry) in new {
            if old.contains_key(name) {
                continue;
            }

            let path = prefix.join(name);
            if entry.is_tree() {
                self.compare_oids(None, Some(&entry.oid), &path)?;
            } else {
                self.change_set.insert(path, TreeChangeType::Added(entry.clone()));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::objects::blob::Blob;
    use crate::artifacts::objects::entry_mode::{EntryMode, FileMode};
    use crate::artifacts::objects::tree_builder::{ChangeMap, TreeBuilder};
    use assert_fs::TempDir;
    use bytes::Bytes;
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};

    #[fixture]
    fn database() -> (TempDir, Database) {
        let dir = TempDir::new().unwrap();
        let database = Database::new(dir.path().join("objects").into_boxed_path(), false);
        (dir, database)
    }

    fn file(database: &Database, content: &str) -> Option<DatabaseEntry> {
        let oid = database.store(&Blob::new(Bytes::from(content.to_string()))).unwrap();
        Some(DatabaseEntry::new(oid, EntryMode::File(FileMode::Regular)))
    }

    #[rstest]
    fn tree_diff_and_flat_diff_agree(database: (TempDir, Database)) {
        let (_dir, database) = database;
        let builder = TreeBuilder::new(&database);

        let old = builder
            .apply(
                None,
                &ChangeMap::from([
                    (PathBuf::from("keep.txt"), file(&database, "k")),
                    (PathBuf::from("dir/gone.txt"), file(&database, "g")),
                    (PathBuf::from("dir/edit.txt"), file(&database, "e1")),
                ]),
            )
            .unwrap();
        let new = builder
            .apply(
                Some(&old),
                &ChangeMap::from([
                    (PathBuf::from("dir/gone.txt"), None),
                    (PathBuf::from("dir/edit.txt"), file(&database, "e2")),
                    (PathBuf::from("new/added.txt"), file(&database, "a")),
                ]),
            )
            .unwrap();

        let mut tree_diff = TreeDiff::new(&database);
        tree_diff.compare_oids(Some(&old), Some(&new), Path::new("")).unwrap();
        let flat = compare_flat(
            &flatten_tree(&database, Some(&old)).unwrap(),
            &flatten_tree(&database, Some(&new)).unwrap(),
        );

        let kinds: Vec<(PathBuf, ChangeKind)> = tree_diff
            .changes()
            .iter()
            .map(|(path, change)| (path.clone(), change.kind()))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (PathBuf::from("dir/edit.txt"), ChangeKind::Modified),
                (PathBuf::from("dir/gone.txt"), ChangeKind::Deleted),
                (PathBuf::from("new/added.txt"), ChangeKind::Added),
            ]
        );
        assert_eq!(tree_diff.into_changes(), flat);
    }

    #[rstest]
    fn unborn_tree_flattens_to_nothing(database: (TempDir, Database)) {
        let (_dir, database) = database;

        assert!(flatten_tree(&database, None).unwrap().is_empty());
    }
}
