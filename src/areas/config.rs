//! Repository configuration
//!
//! Stored as TOML at `<git dir>/gitdist.toml`. Every section and key is
//! optional; missing values fall back to the defaults below.

use crate::artifacts::objects::commit::Author;
use crate::errors::{IoResultExt, Result, VcsError};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = "gitdist.toml";
pub const DEFAULT_BRANCH: &str = "master";
pub const DEFAULT_REMOTE: &str = "origin";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub core: CoreConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote: Option<RemoteConfig>,
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// No working directory; repository files live at the root
    pub bare: bool,
    /// Group-writable object files and directories
    pub shared: bool,
    pub default_branch: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            bare: false,
            shared: false,
            default_branch: DEFAULT_BRANCH.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserConfig {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "default_remote_name")]
    pub name: String,
    pub url: String,
}

fn default_remote_name() -> String {
    DEFAULT_REMOTE.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Upper bound for each network phase (default: 30)
    pub timeout_secs: u64,
    /// Objects requested per round trip (default: 64)
    pub batch_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            batch_size: 64,
        }
    }
}

impl SyncConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    /// Read the configuration, or the defaults when the file is absent.
    pub fn load(git_dir: &Path) -> Result<Self> {
        let path = git_dir.join(CONFIG_FILE_NAME);
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(&path).at(&path)?;
        toml::from_str(&content)
            .map_err(|e| VcsError::InvalidState(format!("invalid configuration {}: {e}", path.display())))
    }

    /// Write the configuration through a temp file and rename.
    pub fn save(&self, git_dir: &Path) -> Result<()> {
        let path = git_dir.join(CONFIG_FILE_NAME);
        let temp_path = git_dir.join(format!("{CONFIG_FILE_NAME}.tmp"));
        let content = toml::to_string_pretty(self)
            .map_err(|e| VcsError::InvalidState(format!("cannot encode configuration: {e}")))?;

        let mut file = std::fs::File::create(&temp_path).at(&temp_path)?;
        file.write_all(content.as_bytes()).at(&temp_path)?;
        file.sync_all().at(&temp_path)?;
        drop(file);

        std::fs::rename(&temp_path, &path).at(&path)
    }

    /// Identity from `[user]`, else from `GIT_AUTHOR_*`.
    pub fn author(&self) -> Result<Author> {
        if let Some(user) = &self.user {
            return Ok(Author::new(user.name.clone(), user.email.clone()));
        }

        Author::load_from_env().ok_or_else(|| {
            VcsError::InvalidState(
                "no author identity: set [user] in the configuration or GIT_AUTHOR_NAME/GIT_AUTHOR_EMAIL".into(),
            )
        })
    }

    pub fn remote_url(&self) -> Option<&str> {
        self.remote.as_ref().map(|remote| remote.url.as_str())
    }

    pub fn remote_name(&self) -> &str {
        self.remote
            .as_ref()
            .map(|remote| remote.name.as_str())
            .unwrap_or(DEFAULT_REMOTE)
    }
}
