use crate::areas::refs::HEAD_REF_NAME;
use crate::areas::repository::Repository;
use crate::artifacts::branch::branch_name::BranchName;
use crate::artifacts::objects::OBJECT_ID_LENGTH;
use crate::artifacts::objects::object::ObjectBox;
use crate::artifacts::objects::object_id::ObjectId;
use crate::errors::{Result, VcsError};

/// Shortest accepted abbreviation of an object id
const MIN_PREFIX_LENGTH: usize = 4;

impl Repository {
    /// Decode the object named by `revision`.
    pub fn cat_file(&self, revision: &str) -> Result<ObjectBox> {
        self.ensure_open()?;
        let object_id = self.resolve_revision(revision)?;

        self.database().parse_object(&object_id)
    }

    /// `HEAD`, a branch name, a full object id or an unambiguous prefix of one.
    pub fn resolve_revision(&self, revision: &str) -> Result<ObjectId> {
        self.ensure_open()?;

        if revision == HEAD_REF_NAME {
            return self
                .refs()
                .read_head()?
                .ok_or_else(|| VcsError::NotFound("HEAD has no commit yet".into()));
        }

        if let Ok(branch) = BranchName::try_parse(revision)
            && let Some(oid) = self.refs().try_read_ref(&branch.to_head_ref())?
        {
            return Ok(oid);
        }

        let is_hex = revision.chars().all(|c| c.is_ascii_hexdigit());
        if !is_hex || revision.len() < MIN_PREFIX_LENGTH || revision.len() > OBJECT_ID_LENGTH {
            return Err(VcsError::NotFound(format!("revision {revision}")));
        }

        let mut matches = self.database().find_objects_by_prefix(revision)?;
        match matches.len() {
            0 => Err(VcsError::NotFound(format!("object {revision}"))),
            1 => Ok(matches.remove(0)),
            count => Err(VcsError::InvalidArgument(format!(
                "short object id {revision} is ambiguous ({count} candidates)"
            ))),
        }
    }
}
