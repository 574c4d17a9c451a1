use crate::areas::repository::Repository;
use crate::artifacts::diff::tree_diff::ChangeKind;
use crate::errors::Result;
use std::path::PathBuf;

impl Repository {
    /// Working-directory changes against the tip of the active branch,
    /// sorted by path.
    pub fn status(&self) -> Result<Vec<(PathBuf, ChangeKind)>> {
        self.ensure_open()?;
        let head_tree = self.head_tree()?;

        self.workspace()?.diff(self.database(), head_tree.as_ref())
    }
}
