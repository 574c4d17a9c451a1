use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::transport::{Advertisement, Credential, ObjectPart, WireObject};
use crate::errors::VcsError;
use serde::{Deserialize, Serialize};

pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;
/// Object bytes carried by one `Objects`/`SendObjects` frame
pub const MAX_BATCH_BYTES: usize = 16 * 1024 * 1024;
/// Slice of a larger object carried by one part frame
pub const PART_SIZE: usize = 8 * 1024 * 1024;

pub mod codes {
    pub const INVALID_ARGUMENT: u32 = 400;
    pub const AUTHENTICATION: u32 = 401;
    pub const NOT_FOUND: u32 = 404;
    pub const NON_FAST_FORWARD: u32 = 409;
    pub const INVALID_STATE: u32 = 412;
    pub const CORRUPT: u32 = 422;
    pub const INTERNAL: u32 = 500;
}

/// Every frame exchanged between a `TcpTransport` and a `Server`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Message {
    Hello { version: u32, credential: Option<Credential> },
    HelloAck { version: u32 },
    ListRefs,
    Refs(Advertisement),
    Negotiate { wants: Vec<ObjectId>, haves: Vec<ObjectId> },
    ObjectList { ids: Vec<ObjectId> },
    GetObjects { ids: Vec<ObjectId> },
    Objects { objects: Vec<WireObject> },
    SendObjects { objects: Vec<WireObject> },
    Stored { count: usize },
    GetObjectPart { id: ObjectId, offset: u64 },
    SendObjectPart(ObjectPart),
    Part(ObjectPart),
    UpdateRef { name: String, old: Option<ObjectId>, new: ObjectId },
    RefUpdated,
    Error { code: u32, message: String },
}

impl Message {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Hello { .. } => "Hello",
            Self::HelloAck { .. } => "HelloAck",
            Self::ListRefs => "ListRefs",
            Self::Refs(_) => "Refs",
            Self::Negotiate { .. } => "Negotiate",
            Self::ObjectList { .. } => "ObjectList",
            Self::GetObjects { .. } => "GetObjects",
            Self::Objects { .. } => "Objects",
            Self::SendObjects { .. } => "SendObjects",
            Self::Stored { .. } => "Stored",
            Self::GetObjectPart { .. } => "GetObjectPart",
            Self::SendObjectPart(_) => "SendObjectPart",
            Self::Part(_) => "Part",
            Self::UpdateRef { .. } => "UpdateRef",
            Self::RefUpdated => "RefUpdated",
            Self::Error { .. } => "Error",
        }
    }

    /// Error frame carrying the code that maps back to the same error kind.
    pub fn from_error(error: &VcsError) -> Self {
        let (code, message) = match error {
            VcsError::AuthenticationFailed(message) => (codes::AUTHENTICATION, message.clone()),
            VcsError::NotFound(message) => (codes::NOT_FOUND, message.clone()),
            VcsError::NonFastForward { branch } => (codes::NON_FAST_FORWARD, branch.clone()),
            VcsError::InvalidArgument(message) => (codes::INVALID_ARGUMENT, message.clone()),
            VcsError::InvalidState(message) => (codes::INVALID_STATE, message.clone()),
            VcsError::Corrupt(message) => (codes::CORRUPT, message.clone()),
            other => (codes::INTERNAL, other.to_string()),
        };

        Self::Error { code, message }
    }

    /// Inverse of `from_error` on the receiving side.
    pub fn into_error(code: u32, message: String) -> VcsError {
        match code {
            codes::AUTHENTICATION => VcsError::AuthenticationFailed(message),
            codes::NOT_FOUND => VcsError::NotFound(message),
            codes::NON_FAST_FORWARD => VcsError::NonFastForward { branch: message },
            codes::INVALID_ARGUMENT => VcsError::InvalidArgument(message),
            codes::INVALID_STATE => VcsError::InvalidState(message),
            codes::CORRUPT => VcsError::Corrupt(message),
            _ => VcsError::Network(format!("remote error {code}: {message}")),
        }
    }
}
