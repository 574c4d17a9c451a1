//! Incremental tree construction
//!
//! A new snapshot is derived from a base tree plus a set of per-file changes.
//! Only the trees on the changed paths are re-encoded; every other entry keeps
//! the hash it already had in the base, so sibling subtrees are never rehashed.

use crate::areas::database::Database;
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::objects::entry_mode::EntryMode;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::tree::Tree;
use crate::errors::{Result, VcsError};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

/// `Some(entry)` writes the file entry, `None` removes it.
pub type ChangeMap = BTreeMap<PathBuf, Option<DatabaseEntry>>;

type ComponentChanges = Vec<(Vec<String>, Option<DatabaseEntry>)>;

pub struct TreeBuilder<'d> {
    database: &'d Database,
}

impl<'d> TreeBuilder<'d> {
    pub fn new(database: &'d Database) -> Self {
        TreeBuilder { database }
    }

    /// Apply `changes` on top of `base` and return the new root tree id.
    ///
    /// An empty result is stored as the empty tree.
    pub fn apply(&self, base: Option<&ObjectId>, changes: &ChangeMap) -> Result<ObjectId> {
        let changes = changes
            .iter()
            .map(|(path, change)| Ok((Self::components(path)?, change.clone())))
            .collect::<Result<ComponentChanges>>()?;

        match self.rebuild(base, changes)? {
            Some(oid) => Ok(oid),
            None => self.database.store(&Tree::default()),
        }
    }

    fn components(path: &Path) -> Result<Vec<String>> {
        let components = path
            .components()
            .map(|component| match component {
                Component::Normal(name) => {
                    let name = name.to_string_lossy().to_string();
                    if Tree::is_valid_entry_name(&name) {
                        Ok(name)
                    } else {
                        Err(VcsError::InvalidArgument(format!(
                            "{name:?} cannot be stored as a tree entry in {}",
                            path.display()
                        )))
                    }
                }
                _ => Err(VcsError::InvalidArgument(format!(
                    "path must be relative and normalized: {}",
                    path.display()
                ))),
            })
            .collect::<Result<Vec<_>>>()?;

        if components.is_empty() {
            return Err(VcsError::InvalidArgument("empty path in tree change".into()));
        }

        Ok(components)
    }

    fn rebuild(&self, base: Option<&ObjectId>, changes: ComponentChanges) -> Result<Option<ObjectId>> {
        if changes.is_empty() {
            return Ok(base.cloned());
        }

        let mut entries = match base {
            Some(oid) => self.database.parse_object_as_tree(oid)?.into_entries(),
            None => BTreeMap::new(),
        };

        // direct children first, so a file replacing a directory (or the
        // reverse) sees the final slot when the nested changes are folded in
        let mut nested: BTreeMap<String, ComponentChanges> = BTreeMap::new();
        for (mut components, change) in changes {
            let head = components.remove(0);
            if components.is_empty() {
                match change {
                    Some(entry) => entries.insert(head, entry),
                    None => entries.remove(&head),
                };
            } else {
                nested.entry(head).or_default().push((components, change));
            }
        }

        for (dir, sub_changes) in nested {
            let current = entries.get(&dir).cloned();
            let sub_base = current.as_ref().filter(|entry| entry.is_tree()).map(|entry| &entry.oid);

            match self.rebuild(sub_base, sub_changes)? {
                Some(oid) => {
                    entries.insert(dir, DatabaseEntry::new(oid, EntryMode::Directory));
                }
                None if current.is_some_and(|entry| entry.is_tree()) => {
                    entries.remove(&dir);
                }
                None => {}
            }
        }

        if entries.is_empty() {
            return Ok(None);
        }

        let oid = self.database.store(&Tree::new(entries))?;
        Ok(Some(oid))
    }
}
