use crate::areas::repository::Repository;
use crate::artifacts::transport::session::SyncOptions;
use crate::commands::porcelain::merge::MergeOutcome;
use crate::errors::Result;

impl Repository {
    pub async fn pull(&mut self) -> Result<MergeOutcome> {
        self.pull_with(SyncOptions::default()).await
    }

    /// `fetch` followed by `merge`.
    pub async fn pull_with(&mut self, options: SyncOptions) -> Result<MergeOutcome> {
        self.fetch_with(options.clone()).await?;
        self.merge_with(options).await
    }
}
