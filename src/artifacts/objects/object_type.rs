use crate::errors::{Result, VcsError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectType {
    Blob,
    Tree,
    Commit,
}

impl ObjectType {
    pub fn as_str(&self) -> &str {
        match self {
            ObjectType::Blob => "blob",
            ObjectType::Tree => "tree",
            ObjectType::Commit => "commit",
        }
    }

    /// Split a canonical encoding into its kind and payload.
    ///
    /// The declared size must match the payload length exactly.
    pub fn split_header(content: &[u8]) -> Result<(ObjectType, &[u8])> {
        let nul = content
            .iter()
            .position(|&b| b == b'\0')
            .ok_or_else(|| VcsError::Corrupt("missing object header terminator".into()))?;

        let header = std::str::from_utf8(&content[..nul])
            .map_err(|_| VcsError::Corrupt("object header is not UTF-8".into()))?;
        let (kind, size) = header
            .split_once(' ')
            .ok_or_else(|| VcsError::Corrupt(format!("malformed object header: {header}")))?;

        let object_type = ObjectType::try_from(kind)?;
        let size = size
            .parse::<usize>()
            .map_err(|_| VcsError::Corrupt(format!("invalid object size: {size}")))?;

        let payload = &content[nul + 1..];
        if payload.len() != size {
            return Err(VcsError::Corrupt(format!(
                "object size mismatch: header says {size}, payload has {}",
                payload.len()
            )));
        }

        Ok((object_type, payload))
    }
}

impl TryFrom<&str> for ObjectType {
    type Error = VcsError;

    fn try_from(value: &str) -> Result<Self> {
        match value {
            "blob" => Ok(ObjectType::Blob),
            "tree" => Ok(ObjectType::Tree),
            "commit" => Ok(ObjectType::Commit),
            _ => Err(VcsError::Corrupt(format!("invalid object type: {value}"))),
        }
    }
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
