use crate::areas::repository::Repository;
use crate::artifacts::log::rev_list::RevList;
use crate::artifacts::objects::commit::Commit;
use crate::artifacts::objects::object_id::ObjectId;
use crate::errors::Result;

impl Repository {
    /// History of the active branch, newest first, following first parents.
    pub fn log(&self, limit: Option<usize>) -> Result<Vec<(ObjectId, Commit)>> {
        self.ensure_open()?;

        RevList::new(self.database(), self.refs().read_head()?)
            .take(limit.unwrap_or(usize::MAX))
            .collect()
    }
}
