use crate::areas::repository::Repository;
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::objects::commit::{Author, Commit};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::tree_builder::{ChangeMap, TreeBuilder};
use crate::errors::{Result, VcsError};
use std::path::{Component, Path, PathBuf};

impl Repository {
    /// Commit the working-directory changes below `paths` (everything when
    /// empty) as the configured author.
    pub fn commit(&mut self, paths: &[&str], message: &str) -> Result<ObjectId> {
        self.ensure_open()?;
        let author = self.config().author()?;

        self.commit_as(paths, message, author)
    }

    pub fn commit_as(&mut self, paths: &[&str], message: &str, author: Author) -> Result<ObjectId> {
        self.ensure_open()?;
        let workspace = self.workspace()?;
        let message = message.trim();
        if message.is_empty() {
            return Err(VcsError::InvalidArgument("empty commit message".into()));
        }

        let filters = paths
            .iter()
            .map(|path| self.normalize_path(path))
            .collect::<Result<Vec<_>>>()?;

        let branch_ref = self.refs().current_ref()?;
        let parent = self.refs().try_read_ref(&branch_ref)?;
        let base_tree = self.commit_tree(parent.as_ref())?;

        let changes = workspace.changes_against(self.database(), base_tree.as_ref())?;
        let selected: Vec<_> = changes
            .into_iter()
            .filter(|(path, _)| filters.is_empty() || filters.iter().any(|filter| path.starts_with(filter)))
            .collect();
        if selected.is_empty() {
            return Err(VcsError::NothingToCommit);
        }

        // the blob actually stored wins over the snapshot hash, in case the
        // file changed in between
        let mut tree_changes = ChangeMap::new();
        for (path, change) in selected {
            let entry = match change.new_entry() {
                Some(entry) => {
                    let (blob, _) = workspace.parse_blob(&path)?;
                    Some(DatabaseEntry::new(self.database().store(&blob)?, entry.mode))
                }
                None => None,
            };
            tree_changes.insert(path, entry);
        }

        let tree = TreeBuilder::new(self.database()).apply(base_tree.as_ref(), &tree_changes)?;
        let commit = Commit::new(parent.iter().cloned().collect(), tree, author, message.to_string());
        let commit_oid = self.database().store(&commit)?;

        self.refs().compare_and_swap(&branch_ref, parent.as_ref(), &commit_oid)?;
        tracing::info!(
            commit = %commit_oid,
            branch = %branch_ref,
            files = tree_changes.len(),
            root = parent.is_none(),
            "created commit"
        );

        Ok(commit_oid)
    }

    /// Working-directory-relative form of a user-supplied path.
    fn normalize_path(&self, path: &str) -> Result<PathBuf> {
        let raw = Path::new(path);
        let relative = if raw.is_absolute() {
            raw.strip_prefix(self.path()).map_err(|_| {
                VcsError::InvalidArgument(format!("{path} is outside the repository"))
            })?
        } else {
            raw
        };

        let mut normalized = PathBuf::new();
        for component in relative.components() {
            match component {
                Component::Normal(name) => normalized.push(name),
                Component::CurDir => {}
                _ => return Err(VcsError::InvalidArgument(format!("unsupported path: {path}"))),
            }
        }

        Ok(normalized)
    }
}
