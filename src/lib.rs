//! gitdist: a minimal distributed version-control engine
//!
//! A `Repository` owns an object store, references, a working directory
//! (absent for bare repositories) and its configuration. Commits snapshot the
//! working directory; fetch, merge, push, pull and clone synchronize with a
//! remote reached through a [`Transport`](artifacts::transport::Transport).
//!
//! ```no_run
//! # async fn demo() -> gitdist::Result<()> {
//! use gitdist::{InitOptions, Repository};
//!
//! let mut repository = Repository::init("project", InitOptions::default())?;
//! std::fs::write("project/a.txt", "x").expect("write");
//! let commit = repository.commit(&[], "first commit")?;
//!
//! repository.set_remote("gitdist://localhost:9418")?;
//! repository.push().await?;
//! repository.free();
//! # let _ = commit;
//! # Ok(())
//! # }
//! ```

pub mod areas;
pub mod artifacts;
pub mod commands;
pub mod errors;

pub use areas::config::Config;
pub use areas::repository::Repository;
pub use artifacts::diff::tree_diff::ChangeKind;
pub use artifacts::objects::commit::{Author, Commit};
pub use artifacts::objects::object_id::ObjectId;
pub use artifacts::transport::Credential;
pub use artifacts::transport::server::{Server, ServerConfig};
pub use artifacts::transport::session::{SyncOptions, SyncPhase, SyncProgress};
pub use commands::porcelain::clone::CloneOptions;
pub use commands::porcelain::fetch::FetchOutcome;
pub use commands::porcelain::init::InitOptions;
pub use commands::porcelain::merge::MergeOutcome;
pub use commands::porcelain::push::PushOutcome;
pub use errors::{Result, VcsError};
