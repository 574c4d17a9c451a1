use crate::areas::database::Database;
use crate::artifacts::checkout::migration::{ActionType, Migration};
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::diff::tree_diff::{self, ChangeKind, ChangeSet, FlatTree, TreeDiff};
use crate::artifacts::objects::blob::Blob;
use crate::artifacts::objects::entry_mode::{EntryMode, FileMode};
use crate::artifacts::objects::object::Object;
use crate::artifacts::objects::object_id::ObjectId;
use crate::errors::{IoResultExt, Result, VcsError};
use bytes::Bytes;
use std::io::Write;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const IGNORED_PATHS: [&str; 1] = [".git"];

#[derive(Debug)]
pub struct Workspace {
    path: Box<Path>,
}

impl Workspace {
    pub fn new(path: Box<Path>) -> Self {
        Workspace { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every regular file below the root, relative and sorted.
    pub fn list_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();

        let walker = WalkDir::new(&self.path)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !Self::is_ignored(entry.file_name().to_string_lossy().as_ref()));

        for entry in walker {
            let entry = entry.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| self.path.to_path_buf());
                VcsError::io(path, e.into())
            })?;

            if entry.file_type().is_file()
                && let Ok(relative) = entry.path().strip_prefix(self.path.as_ref())
            {
                files.push(relative.to_path_buf());
            }
        }

        files.sort();
        Ok(files)
    }

    fn is_ignored(name: &str) -> bool {
        IGNORED_PATHS.contains(&name)
    }

    pub fn read_file(&self, file_path: &Path) -> Result<Bytes> {
        let full_path = self.path.join(file_path);
        let content = std::fs::read(&full_path).at(&full_path)?;

        Ok(content.into())
    }

    pub fn file_mode(&self, file_path: &Path) -> FileMode {
        if is_executable::is_executable(self.path.join(file_path)) {
            FileMode::Executable
        } else {
            FileMode::Regular
        }
    }

    pub fn parse_blob(&self, file_path: &Path) -> Result<(Blob, FileMode)> {
        Ok((Blob::new(self.read_file(file_path)?), self.file_mode(file_path)))
    }

    /// Hash every file as a blob without storing anything.
    pub fn snapshot(&self) -> Result<FlatTree> {
        let mut files = FlatTree::new();

        for path in self.list_files()? {
            let (blob, mode) = self.parse_blob(&path)?;
            let oid = ObjectId::from_canonical(&blob.serialize()?);
            files.insert(path, DatabaseEntry::new(oid, EntryMode::File(mode)));
        }

        Ok(files)
    }

    /// Changes from `tree` to the working directory, by content and mode.
    pub fn changes_against(&self, database: &Database, tree: Option<&ObjectId>) -> Result<ChangeSet> {
        let committed = tree_diff::flatten_tree(database, tree)?;
        let current = self.snapshot()?;

        Ok(tree_diff::compare_flat(&committed, &current))
    }

    pub fn diff(&self, database: &Database, tree: Option<&ObjectId>) -> Result<Vec<(PathBuf, ChangeKind)>> {
        Ok(self
            .changes_against(database, tree)?
            .into_iter()
            .map(|(path, change)| (path, change.kind()))
            .collect())
    }

    /// Materialize `tree`, removing files tracked in `previous` that it lacks.
    ///
    /// Untracked files are left alone unless they sit where `tree` puts a file.
    pub fn checkout(&self, database: &Database, tree: &ObjectId, previous: Option<&ObjectId>) -> Result<()> {
        let mut diff = TreeDiff::new(database);
        diff.compare_oids(previous, Some(tree), Path::new(""))?;

        let migration = Migration::plan(database, diff.changes());
        tracing::debug!(
            tree = %tree,
            previous = ?previous.map(ObjectId::to_short_oid),
            changes = diff.changes().len(),
            "checking out tree"
        );

        self.apply_migration(&migration)
    }

    // Deletions first, then emptied directories children first, then new
    // directories parents first, then file contents.
    pub fn apply_migration(&self, migration: &Migration) -> Result<()> {
        if migration.is_empty() {
            return Ok(());
        }

        self.apply_migration_action_set(migration, ActionType::Delete)?;
        for dir_path in migration.rmdirs().iter().rev() {
            self.prune_directory(dir_path)?;
        }

        for dir_path in migration.mkdirs() {
            self.make_directory(dir_path)?;
        }
        self.apply_migration_action_set(migration, ActionType::Modify)?;
        self.apply_migration_action_set(migration, ActionType::Add)?;

        Ok(())
    }

    fn apply_migration_action_set(&self, migration: &Migration, action: ActionType) -> Result<()> {
        for (file_path, entry) in migration.actions(action) {
            let path = self.path.join(file_path);
            self.clear_path(&path)?;

            match (action, entry) {
                (ActionType::Delete, _) => {}
                (ActionType::Add | ActionType::Modify, Some(entry)) => {
                    let data = migration.load_blob_data(&entry.oid)?;
                    self.write_file(&path, &data, entry.mode)?;
                }
                (_, None) => {
                    return Err(VcsError::InvalidState(format!(
                        "no entry planned for {}",
                        file_path.display()
                    )));
                }
            }
        }

        Ok(())
    }

    fn clear_path(&self, path: &Path) -> Result<()> {
        match std::fs::symlink_metadata(path) {
            Ok(metadata) if metadata.is_dir() => std::fs::remove_dir_all(path).at(path),
            Ok(_) => std::fs::remove_file(path).at(path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(VcsError::io(path, e)),
        }
    }

    fn write_file(&self, path: &Path, data: &[u8], mode: EntryMode) -> Result<()> {
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .at(path)?;
        file.write_all(data).at(path)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let permissions = std::fs::Permissions::from_mode(mode.as_u32() & 0o777);
            std::fs::set_permissions(path, permissions).at(path)?;
        }
        #[cfg(not(unix))]
        let _ = mode;

        Ok(())
    }

    /// Remove a directory only once nothing is left in it.
    fn prune_directory(&self, dir_path: &Path) -> Result<()> {
        let dir_path = self.path.join(dir_path);

        match std::fs::remove_dir(&dir_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(_) if dir_path.read_dir().is_ok_and(|mut entries| entries.next().is_some()) => Ok(()),
            Err(_) if !dir_path.is_dir() => Ok(()),
            Err(e) => Err(VcsError::io(dir_path, e)),
        }
    }

    fn make_directory(&self, dir_path: &Path) -> Result<()> {
        let dir_path = self.path.join(dir_path);

        match std::fs::symlink_metadata(&dir_path) {
            Ok(metadata) if metadata.is_dir() => return Ok(()),
            Ok(_) => std::fs::remove_file(&dir_path).at(&dir_path)?,
            Err(_) => {}
        }

        std::fs::create_dir(&dir_path).at(&dir_path)
    }
}
