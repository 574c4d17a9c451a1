//! Repository handle
//!
//! A `Repository` owns the object store, the references, the working directory
//! (absent when bare) and the configuration of one repository, plus the lock
//! file that makes it the only live handle on that repository.
//!
//! ## Layout
//!
//! Non-bare repositories keep everything under `<root>/.git`; bare ones keep
//! the same entries directly under `<root>`.

use crate::areas::config::{Config, RemoteConfig, UserConfig};
use crate::areas::database::Database;
use crate::areas::refs::{HEAD_REF_NAME, Refs};
use crate::areas::workspace::Workspace;
use crate::artifacts::branch::branch_name::BranchName;
use crate::artifacts::objects::commit::Commit;
use crate::artifacts::objects::object_id::ObjectId;
use crate::errors::{IoResultExt, Result, VcsError};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const GIT_DIR_NAME: &str = ".git";
pub const LOCK_FILE_NAME: &str = "gitdist.lock";

/// Exclusive ownership of a repository, released on drop
#[derive(Debug)]
pub(crate) struct RepositoryLock {
    path: PathBuf,
}

impl RepositoryLock {
    pub(crate) fn acquire(git_dir: &Path) -> Result<Self> {
        let path = git_dir.join(LOCK_FILE_NAME);

        let mut file = match std::fs::OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(VcsError::AlreadyLocked(path));
            }
            Err(e) => return Err(VcsError::io(path, e)),
        };

        let lock = RepositoryLock { path };
        write!(file, "{}", std::process::id()).at(&lock.path)?;

        Ok(lock)
    }
}

impl Drop for RepositoryLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to remove repository lock");
        }
    }
}

#[derive(Debug)]
pub struct Repository {
    path: Box<Path>,
    git_dir: Box<Path>,
    database: Database,
    refs: Refs,
    workspace: Option<Workspace>,
    config: Config,
    lock: Option<RepositoryLock>,
}

impl Repository {
    /// Open an existing repository, bare or not.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let path = std::fs::canonicalize(path).map_err(|_| {
            VcsError::NotFound(format!("no repository at {}", path.display()))
        })?;

        let git_dir = Self::find_git_dir(&path)
            .ok_or_else(|| VcsError::NotFound(format!("no repository at {}", path.display())))?;

        let repository = Self::load(path.into_boxed_path(), git_dir.into_boxed_path())?;
        tracing::debug!(path = %repository.path.display(), bare = repository.is_bare(), "opened repository");

        Ok(repository)
    }

    pub(crate) fn find_git_dir(path: &Path) -> Option<PathBuf> {
        let dot_git = path.join(GIT_DIR_NAME);
        if dot_git.join(HEAD_REF_NAME).is_file() {
            return Some(dot_git);
        }

        let is_bare = path.join(HEAD_REF_NAME).is_file() && path.join("objects").is_dir();
        is_bare.then(|| path.to_path_buf())
    }

    /// Build the handle over an existing layout and take the lock.
    pub(crate) fn load(path: Box<Path>, git_dir: Box<Path>) -> Result<Self> {
        let lock = RepositoryLock::acquire(&git_dir)?;
        let config = Config::load(&git_dir)?;

        let database = Database::new(git_dir.join("objects").into_boxed_path(), config.core.shared);
        let refs = Refs::new(git_dir.clone());
        let workspace = (!config.core.bare).then(|| Workspace::new(path.clone()));

        Ok(Repository {
            path,
            git_dir,
            database,
            refs,
            workspace,
            config,
            lock: Some(lock),
        })
    }

    /// Release the handle; later calls are no-ops.
    pub fn free(&mut self) {
        if let Some(lock) = self.lock.take() {
            drop(lock);
            tracing::debug!(path = %self.path.display(), "released repository");
        }
    }

    pub fn is_open(&self) -> bool {
        self.lock.is_some()
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(VcsError::InvalidState("repository handle has been freed".into()))
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    pub fn is_bare(&self) -> bool {
        self.workspace.is_none()
    }

    pub(crate) fn database(&self) -> &Database {
        &self.database
    }

    pub(crate) fn refs(&self) -> &Refs {
        &self.refs
    }

    pub(crate) fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn workspace(&self) -> Result<&Workspace> {
        self.workspace
            .as_ref()
            .ok_or_else(|| VcsError::InvalidState("bare repository has no working directory".into()))
    }

    /// Tip of the active branch, `None` while it is unborn.
    pub fn head(&self) -> Result<Option<ObjectId>> {
        self.ensure_open()?;
        self.refs.read_head()
    }

    pub fn current_branch(&self) -> Result<BranchName> {
        self.ensure_open()?;
        self.refs.current_branch()
    }

    pub fn lookup_commit(&self, oid: &ObjectId) -> Result<Commit> {
        self.ensure_open()?;
        self.database.parse_object_as_commit(oid)
    }

    /// Root tree of the active branch's tip.
    pub(crate) fn head_tree(&self) -> Result<Option<ObjectId>> {
        self.commit_tree(self.refs.read_head()?.as_ref())
    }

    pub(crate) fn commit_tree(&self, commit: Option<&ObjectId>) -> Result<Option<ObjectId>> {
        commit
            .map(|oid| Ok(self.database.parse_object_as_commit(oid)?.tree_oid().clone()))
            .transpose()
    }

    /// Remember `url` as the remote repository.
    pub fn set_remote(&mut self, url: impl Into<String>) -> Result<()> {
        self.ensure_open()?;

        let mut config = self.config.clone();
        config.remote = Some(RemoteConfig {
            name: config.remote_name().to_string(),
            url: url.into(),
        });
        config.save(&self.git_dir)?;
        self.config = config;

        Ok(())
    }

    /// Identity used for commits made by this repository, merges included.
    pub fn set_author(&mut self, name: impl Into<String>, email: impl Into<String>) -> Result<()> {
        self.ensure_open()?;

        let mut config = self.config.clone();
        config.user = Some(UserConfig {
            name: name.into(),
            email: email.into(),
        });
        config.save(&self.git_dir)?;
        self.config = config;

        Ok(())
    }

    /// Write every file of the active branch's tip into the working directory.
    ///
    /// Files absent from the tip are left in place.
    pub fn checkout_head(&self) -> Result<()> {
        self.ensure_open()?;

        if let Some(tree) = self.head_tree()? {
            self.workspace()?.checkout(&self.database, &tree, None)?;
        }

        Ok(())
    }
}
