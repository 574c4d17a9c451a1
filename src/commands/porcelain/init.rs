use crate::areas::config::{Config, CoreConfig, DEFAULT_BRANCH};
use crate::areas::database::Database;
use crate::areas::refs::Refs;
use crate::areas::repository::{GIT_DIR_NAME, Repository};
use crate::artifacts::branch::branch_name::BranchName;
use crate::errors::{IoResultExt, Result, VcsError};
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    /// Group-writable objects
    pub shared: bool,
    /// No working directory
    pub bare: bool,
    /// Branch `HEAD` starts on (default: `master`)
    pub default_branch: Option<String>,
}

impl Repository {
    /// Create an empty repository at `path` and open it.
    ///
    /// `path` is created when missing. Initializing over an existing
    /// repository is an `InvalidState` error.
    pub fn init(path: impl AsRef<Path>, options: InitOptions) -> Result<Self> {
        let path = path.as_ref();
        let branch = BranchName::try_parse(options.default_branch.as_deref().unwrap_or(DEFAULT_BRANCH))?;

        std::fs::create_dir_all(path).at(path)?;
        let path = std::fs::canonicalize(path).at(path)?;
        if Self::find_git_dir(&path).is_some() {
            return Err(VcsError::InvalidState(format!(
                "{} is already a repository",
                path.display()
            )));
        }

        let git_dir = if options.bare {
            path.clone()
        } else {
            path.join(GIT_DIR_NAME)
        };
        std::fs::create_dir_all(&git_dir).at(&git_dir)?;

        let config = Config {
            core: CoreConfig {
                bare: options.bare,
                shared: options.shared,
                default_branch: branch.to_string(),
            },
            ..Config::default()
        };
        config.save(&git_dir)?;

        Database::new(git_dir.join("objects").into_boxed_path(), options.shared).init_storage()?;

        let refs = Refs::new(git_dir.clone().into_boxed_path());
        let heads_path = refs.heads_path();
        std::fs::create_dir_all(&heads_path).at(&heads_path)?;
        refs.set_head(&branch)?;

        tracing::info!(path = %path.display(), bare = options.bare, branch = %branch, "initialized repository");

        Self::load(path.into_boxed_path(), git_dir.into_boxed_path())
    }
}
