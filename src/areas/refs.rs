//! References (branches, remote-tracking branches, HEAD)
//!
//! References are human-readable names pointing to commits:
//! - `refs/heads/<branch>`: local branch tips
//! - `refs/remotes/<remote>/<branch>`: last known tips of a remote's branches
//! - `HEAD`: always symbolic, `ref: refs/heads/<branch>`
//!
//! ## Atomicity
//!
//! Every write takes an exclusive lock on `<ref>.lock`, writes a temp file
//! next to the reference, syncs it and renames it over the old file. A reader
//! sees either the previous or the new value, never a torn one. The lock file
//! is gone again once the write is done.

use crate::artifacts::branch::HEADS_PREFIX;
use crate::artifacts::branch::branch_name::{BranchName, SymRefName};
use crate::artifacts::objects::object_id::ObjectId;
use crate::errors::{IoResultExt, Result, VcsError};
use derive_new::new;
use fake::rand;
use file_guard::Lock;
use std::ffi::OsString;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// Prefix of a symbolic reference's content
const SYMREF_PREFIX: &str = "ref: ";

/// Name of the HEAD reference
pub const HEAD_REF_NAME: &str = "HEAD";

/// References manager rooted at the repository directory (`.git` or a bare root)
#[derive(Debug, new)]
pub struct Refs {
    path: Box<Path>,
}

/// Raw content of a reference file
#[derive(Debug, Clone, PartialEq, Eq)]
enum SymRefOrOid {
    SymRef { sym_ref_name: SymRefName },
    Oid(ObjectId),
}

impl SymRefOrOid {
    fn read_symref_or_oid(path: &Path) -> Result<Option<SymRefOrOid>> {
        if !path.is_file() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path).at(path)?;
        let content = content.trim();

        if content.is_empty() {
            return Ok(None);
        }

        match content.strip_prefix(SYMREF_PREFIX) {
            Some(target) => Ok(Some(SymRefOrOid::SymRef {
                sym_ref_name: SymRefName::new(target.trim().to_string()),
            })),
            None => Ok(Some(SymRefOrOid::Oid(ObjectId::try_parse(content).map_err(|_| {
                VcsError::Corrupt(format!("reference {} holds {content:?}", path.display()))
            })?))),
        }
    }
}

impl Refs {
    pub fn head_path(&self) -> PathBuf {
        self.path.join(HEAD_REF_NAME)
    }

    pub fn refs_path(&self) -> PathBuf {
        self.path.join("refs")
    }

    pub fn heads_path(&self) -> PathBuf {
        self.refs_path().join("heads")
    }

    /// The branch HEAD points at, e.g. `refs/heads/master`.
    pub fn current_ref(&self) -> Result<SymRefName> {
        let head_path = self.head_path();

        match SymRefOrOid::read_symref_or_oid(&head_path)? {
            Some(SymRefOrOid::SymRef { sym_ref_name }) if sym_ref_name.is_branch() => Ok(sym_ref_name),
            Some(SymRefOrOid::SymRef { sym_ref_name }) => Err(VcsError::Corrupt(format!(
                "HEAD points outside refs/heads: {sym_ref_name}"
            ))),
            Some(SymRefOrOid::Oid(oid)) => Err(VcsError::InvalidState(format!(
                "HEAD is detached at {oid}, which is not supported"
            ))),
            None => Err(VcsError::NotFound(format!("{}", head_path.display()))),
        }
    }

    pub fn current_branch(&self) -> Result<BranchName> {
        BranchName::try_parse_sym_ref_name(&self.current_ref()?)
    }

    /// Point HEAD at `branch`; the branch itself need not exist yet.
    pub fn set_head(&self, branch: &BranchName) -> Result<()> {
        let head_path = self.head_path();
        let content = format!("{SYMREF_PREFIX}{}\n", branch.to_head_ref());

        self.with_ref_lock(&head_path, || Self::write_ref_file(&head_path, &content))
    }

    /// Tip of the active branch; `None` while the branch is unborn.
    pub fn read_head(&self) -> Result<Option<ObjectId>> {
        self.try_read_ref(&self.current_ref()?)
    }

    /// Advance the active branch.
    pub fn update_head(&self, oid: &ObjectId) -> Result<()> {
        self.update_ref(&self.current_ref()?, oid)
    }

    pub fn read_ref(&self, name: &SymRefName) -> Result<ObjectId> {
        self.try_read_ref(name)?
            .ok_or_else(|| VcsError::NotFound(format!("reference {name}")))
    }

    /// Follows symbolic references until an object id is found.
    pub fn try_read_ref(&self, name: &SymRefName) -> Result<Option<ObjectId>> {
        let mut path = self.ref_path(name)?;

        // HEAD -> branch is the only indirection in use; the bound guards
        // against cycles in hand-edited repositories
        for _ in 0..5 {
            match SymRefOrOid::read_symref_or_oid(&path)? {
                Some(SymRefOrOid::Oid(oid)) => return Ok(Some(oid)),
                Some(SymRefOrOid::SymRef { sym_ref_name }) => path = self.ref_path(&sym_ref_name)?,
                None => return Ok(None),
            }
        }

        Err(VcsError::Corrupt(format!("symbolic reference loop at {name}")))
    }

    pub fn update_ref(&self, name: &SymRefName, oid: &ObjectId) -> Result<()> {
        let path = self.ref_path(name)?;
        self.with_ref_lock(&path, || Self::write_ref_file(&path, &format!("{oid}\n")))?;
        tracing::info!(reference = %name, oid = %oid, "updated reference");

        Ok(())
    }

    /// Move `name` to `new` only if it currently holds `expected`
    /// (`None`: the reference must not exist yet).
    pub fn compare_and_swap(
        &self,
        name: &SymRefName,
        expected: Option<&ObjectId>,
        new: &ObjectId,
    ) -> Result<()> {
        let path = self.ref_path(name)?;

        self.with_ref_lock(&path, || {
            let current = match SymRefOrOid::read_symref_or_oid(&path)? {
                Some(SymRefOrOid::Oid(oid)) => Some(oid),
                Some(SymRefOrOid::SymRef { .. }) => {
                    return Err(VcsError::InvalidState(format!("{name} is a symbolic reference")));
                }
                None => None,
            };

            if current.as_ref() != expected {
                tracing::warn!(
                    reference = %name,
                    expected = ?expected.map(ObjectId::to_string),
                    current = ?current.as_ref().map(ObjectId::to_string),
                    "reference moved concurrently"
                );
                return Err(VcsError::NonFastForward {
                    branch: Self::display_branch(name),
                });
            }

            Self::write_ref_file(&path, &format!("{new}\n"))
        })?;
        tracing::info!(reference = %name, oid = %new, "updated reference");

        Ok(())
    }

    /// Every reference under `refs/`, sorted.
    pub fn list_refs(&self) -> Result<Vec<SymRefName>> {
        self.list_refs_under(&self.refs_path())
    }

    pub fn list_branches(&self) -> Result<Vec<SymRefName>> {
        self.list_refs_under(&self.heads_path())
    }

    /// All `(name, oid)` pairs under `refs/`.
    pub fn list_ref_targets(&self) -> Result<Vec<(SymRefName, ObjectId)>> {
        let mut targets = Vec::new();
        for name in self.list_refs()? {
            if let Some(oid) = self.try_read_ref(&name)? {
                targets.push((name, oid));
            }
        }

        Ok(targets)
    }

    fn list_refs_under(&self, path: &Path) -> Result<Vec<SymRefName>> {
        if !path.exists() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in WalkDir::new(path) {
            let entry = entry.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| path.to_path_buf());
                VcsError::io(path, e.into())
            })?;
            if !entry.file_type().is_file() || Self::is_scratch_file(entry.path()) {
                continue;
            }

            if let Ok(relative_path) = entry.path().strip_prefix(self.path.as_ref()) {
                let name = relative_path
                    .components()
                    .map(|component| component.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                names.push(SymRefName::new(name));
            }
        }

        names.sort();
        Ok(names)
    }

    fn is_scratch_file(path: &Path) -> bool {
        let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
        name.ends_with(".lock") || name.contains(".tmp-")
    }

    fn display_branch(name: &SymRefName) -> String {
        name.as_ref_path()
            .strip_prefix(HEADS_PREFIX)
            .unwrap_or(name.as_ref_path())
            .to_string()
    }

    /// Map a reference name onto the filesystem, refusing names that would
    /// leave the reference directories.
    fn ref_path(&self, name: &SymRefName) -> Result<PathBuf> {
        let raw = name.as_ref_path();
        let valid_root = raw == HEAD_REF_NAME || raw.starts_with("refs/");
        let normal = Path::new(raw)
            .components()
            .all(|component| matches!(component, Component::Normal(_)));

        if !valid_root || !normal || Self::is_scratch_file(Path::new(raw)) {
            return Err(VcsError::InvalidArgument(format!("invalid reference name: {raw}")));
        }

        Ok(self.path.join(raw))
    }

    /// Run `update` holding `<ref>.lock`, removed again before it is released.
    ///
    /// A waiter that locked a file already unlinked by the previous holder
    /// notices the path no longer names it and starts over.
    fn with_ref_lock<T>(&self, path: &Path, update: impl FnOnce() -> Result<T>) -> Result<T> {
        let parent = path
            .parent()
            .ok_or_else(|| VcsError::InvalidArgument(format!("invalid reference path {}", path.display())))?;
        std::fs::create_dir_all(parent).at(parent)?;

        let mut lock_path = OsString::from(path.as_os_str());
        lock_path.push(".lock");
        let lock_path = PathBuf::from(lock_path);

        loop {
            let mut lock_file = std::fs::OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&lock_path)
                .at(&lock_path)?;
            let lock = file_guard::lock(&mut lock_file, Lock::Exclusive, 0, 1).at(&lock_path)?;
            if !Self::still_linked(&lock, &lock_path) {
                continue;
            }

            let result = update();
            if let Err(e) = std::fs::remove_file(&lock_path) {
                tracing::warn!(path = %lock_path.display(), error = %e, "cannot remove reference lock");
            }
            drop(lock);

            return result;
        }
    }

    #[cfg(unix)]
    fn still_linked(file: &std::fs::File, path: &Path) -> bool {
        use std::os::unix::fs::MetadataExt;

        match (file.metadata(), std::fs::metadata(path)) {
            (Ok(held), Ok(current)) => held.dev() == current.dev() && held.ino() == current.ino(),
            _ => false,
        }
    }

    #[cfg(not(unix))]
    fn still_linked(_file: &std::fs::File, path: &Path) -> bool {
        path.exists()
    }

    fn write_ref_file(path: &Path, content: &str) -> Result<()> {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        let temp_path = path.with_file_name(format!("{file_name}.tmp-{}", rand::random::<u32>()));

        let result = (|| {
            let mut file = std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&temp_path)
                .at(&temp_path)?;
            file.write_all(content.as_bytes()).at(&temp_path)?;
            file.sync_all().at(&temp_path)?;
            drop(file);

            std::fs::rename(&temp_path, path).at(path)
        })();

        if result.is_err() {
            let _ = std::fs::remove_file(&temp_path);
        }

        result
    }
}
