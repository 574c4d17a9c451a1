//! Checkout planning
//!
//! Moving the working directory from one snapshot to another is planned
//! up front from the tree diff:
//!
//! 1. files to delete, then directories left empty by those deletions
//! 2. directories to create for new files
//! 3. files to modify, then files to add
//!
//! The plan is applied by `Workspace::apply_migration` in that order so a
//! file can replace a directory (and the reverse) within one checkout.

use crate::areas::database::Database;
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::diff::tree_diff::{ChangeSet, TreeChangeType};
use crate::artifacts::objects::object_id::ObjectId;
use crate::errors::Result;
use bytes::Bytes;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

/// Type of file system action required for checkout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionType {
    Add,
    Delete,
    Modify,
}

/// Planned actions grouped by type; `None` only for deletions
pub type ActionsSet = HashMap<ActionType, Vec<(PathBuf, Option<DatabaseEntry>)>>;

pub struct Migration<'r> {
    database: &'r Database,
    actions: ActionsSet,
    /// Directories to create, parents before children
    mkdirs: BTreeSet<PathBuf>,
    /// Directories that may become empty, pruned children first
    rmdirs: BTreeSet<PathBuf>,
}

impl<'r> Migration<'r> {
    pub fn plan(database: &'r Database, changes: &ChangeSet) -> Self {
        let mut migration = Self {
            database,
            actions: HashMap::from([
                (ActionType::Add, Vec::new()),
                (ActionType::Delete, Vec::new()),
                (ActionType::Modify, Vec::new()),
            ]),
            mkdirs: BTreeSet::new(),
            rmdirs: BTreeSet::new(),
        };

        for (path, change) in changes {
            migration.record_change(path, change);
        }

        migration
    }

    pub fn actions(&self, action: ActionType) -> &[(PathBuf, Option<DatabaseEntry>)] {
        self.actions.get(&action).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn mkdirs(&self) -> &BTreeSet<PathBuf> {
        &self.mkdirs
    }

    pub fn rmdirs(&self) -> &BTreeSet<PathBuf> {
        &self.rmdirs
    }

    pub fn is_empty(&self) -> bool {
        self.actions.values().all(Vec::is_empty)
    }

    pub fn load_blob_data(&self, object_id: &ObjectId) -> Result<Bytes> {
        Ok(self.database.parse_object_as_blob(object_id)?.into_content())
    }

    fn parent_dirs(path: &Path) -> impl Iterator<Item = PathBuf> + '_ {
        path.parent()
            .into_iter()
            .flat_map(Path::ancestors)
            .filter(|ancestor| !ancestor.as_os_str().is_empty())
            .map(Path::to_path_buf)
    }

    fn record_change(&mut self, path: &Path, change: &TreeChangeType) {
        let (action, entry) = match change {
            TreeChangeType::Added(new_entry) => {
                self.mkdirs.extend(Self::parent_dirs(path));
                (ActionType::Add, Some(new_entry.clone()))
            }
            TreeChangeType::Deleted(_) => {
                self.rmdirs.extend(Self::parent_dirs(path));
                (ActionType::Delete, None)
            }
            TreeChangeType::Modified { new, .. } => {
                self.mkdirs.extend(Self::parent_dirs(path));
                (ActionType::Modify, Some(new.clone()))
            }
        };

        self.actions.entry(action).or_default().push((path.to_path_buf(), entry));
    }
}
