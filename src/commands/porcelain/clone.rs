use crate::areas::config::SyncConfig;
use crate::areas::repository::Repository;
use crate::artifacts::branch::branch_name::BranchName;
use crate::artifacts::transport::session::{ProgressFn, SyncOptions, SyncSession};
use crate::artifacts::transport::{self, Credential, RemoteUrl, Transport};
use crate::commands::porcelain::init::InitOptions;
use crate::errors::{IoResultExt, Result, VcsError};
use std::path::Path;
use std::time::Duration;

#[derive(Clone, Default)]
pub struct CloneOptions {
    pub credential: Option<Credential>,
    pub progress: Option<ProgressFn>,
    pub timeout: Option<Duration>,
    /// Group-writable objects in the new repository
    pub shared: bool,
}

impl CloneOptions {
    fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            credential: self.credential.clone(),
            progress: self.progress.clone(),
            timeout: self.timeout,
        }
    }
}

impl Repository {
    /// Create a repository at `path` holding the remote's history, with the
    /// remote's default branch checked out.
    ///
    /// `path` must be missing or an empty directory. When the clone fails,
    /// whatever it created is removed again.
    pub async fn clone(url: &str, path: impl AsRef<Path>, options: CloneOptions) -> Result<Self> {
        let path = path.as_ref();
        let sync = options.sync_options();
        let mut session = SyncSession::new("clone", &sync, SyncConfig::default().timeout());

        let url = Self::absolute_url(url)?;
        let mut transport = session.run(transport::connect(&url, sync.credential.clone())).await?;

        let created = Self::prepare_destination(path)?;
        match Self::clone_into(path, &url, options.shared, transport.as_mut(), &mut session).await {
            Ok(repository) => {
                session.finish();
                Ok(repository)
            }
            Err(e) => {
                session.fail(&e);
                Self::discard_destination(path, created);
                Err(e)
            }
        }
    }

    async fn clone_into(
        path: &Path,
        url: &str,
        shared: bool,
        transport: &mut dyn Transport,
        session: &mut SyncSession,
    ) -> Result<Self> {
        let options = InitOptions {
            shared,
            ..InitOptions::default()
        };
        let mut repository = Repository::init(path, options)?;
        repository.set_remote(url)?;

        let fetched = repository.fetch_from(transport, session).await?;
        let branch = match fetched.remote_head {
            Some(branch) => branch,
            None => BranchName::try_parse(repository.config().core.default_branch.clone())?,
        };
        repository.refs().set_head(&branch)?;

        let tracking_ref = branch.to_remote_ref(repository.config().remote_name());
        match repository.refs().try_read_ref(&tracking_ref)? {
            Some(tip) => {
                repository.refs().compare_and_swap(&branch.to_head_ref(), None, &tip)?;
                repository.checkout_head()?;
                tracing::info!(url, branch = %branch, tip = %tip, "cloned");
            }
            None => tracing::info!(url, branch = %branch, "cloned an empty repository"),
        }

        Ok(repository)
    }

    /// Local remotes are remembered by absolute path, so the clone keeps
    /// working from any directory.
    fn absolute_url(url: &str) -> Result<String> {
        match RemoteUrl::parse(url)? {
            RemoteUrl::Local(path) => {
                let path = std::fs::canonicalize(&path)
                    .map_err(|_| VcsError::NotFound(format!("no repository at {}", path.display())))?;
                Ok(path.display().to_string())
            }
            RemoteUrl::Tcp { .. } => Ok(url.to_string()),
        }
    }

    /// Whether the destination directory is created by the clone.
    fn prepare_destination(path: &Path) -> Result<bool> {
        if !path.exists() {
            return Ok(true);
        }

        let is_empty_dir = path.is_dir() && std::fs::read_dir(path).at(path)?.next().is_none();
        if !is_empty_dir {
            return Err(VcsError::InvalidState(format!(
                "destination {} exists and is not an empty directory",
                path.display()
            )));
        }

        Ok(false)
    }

    fn discard_destination(path: &Path, created: bool) {
        let result = if created {
            std::fs::remove_dir_all(path)
        } else {
            std::fs::read_dir(path).and_then(|entries| {
                for entry in entries {
                    let entry_path = entry?.path();
                    if entry_path.is_dir() {
                        std::fs::remove_dir_all(&entry_path)?;
                    } else {
                        std::fs::remove_file(&entry_path)?;
                    }
                }
                Ok(())
            })
        };

        if let Err(e) = result {
            tracing::warn!(path = %path.display(), error = %e, "could not clean up failed clone");
        }
    }
}
