//! Remote access
//!
//! Every synchronization talks to the remote through the `Transport` trait:
//!
//! - `local`: a repository on the local filesystem (`/path`, `file:///path`)
//! - `tcp`: a `Server` reached over `gitdist://host:port`
//!
//! Both end up in `RemoteRepository`, which implements the serving side of
//! the protocol (advertisement, negotiation, object transfer, ref updates).

pub mod codec;
pub mod local;
pub mod message;
pub mod negotiation;
pub mod parts;
pub mod remote_repository;
pub mod server;
pub mod session;
pub mod tcp;
pub mod url;

use crate::artifacts::objects::object_id::ObjectId;
use crate::errors::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use self::url::RemoteUrl;

/// Authentication material presented to a remote; never persisted
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Credential {
    Token(String),
    UserPassword { username: String, password: String },
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::Token(_) => write!(f, "Token(***)"),
            Credential::UserPassword { username, .. } => {
                write!(f, "UserPassword {{ username: {username:?}, password: *** }}")
            }
        }
    }
}

/// A remote's branches as it announces them
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Advertisement {
    /// Branch named by the remote's `HEAD`
    pub head: Option<String>,
    /// `refs/heads/<branch>` → tip
    pub refs: BTreeMap<String, ObjectId>,
}

impl Advertisement {
    pub fn tip(&self, ref_name: &str) -> Option<&ObjectId> {
        self.refs.get(ref_name)
    }
}

/// An object in its canonical encoding, as sent over the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireObject {
    pub id: ObjectId,
    pub data: Vec<u8>,
}

/// A slice of an object too large for one `WireObject` frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectPart {
    pub id: ObjectId,
    pub offset: u64,
    /// Length of the whole canonical encoding
    pub total: u64,
    pub data: Vec<u8>,
}

#[async_trait]
pub trait Transport: Send {
    async fn advertise(&mut self) -> Result<Advertisement>;

    /// Ids of every object reachable from `wants` and not from `haves`,
    /// commits first.
    async fn negotiate(&mut self, wants: Vec<ObjectId>, haves: Vec<ObjectId>) -> Result<Vec<ObjectId>>;

    /// A prefix of `ids`, as many objects as fit in `MAX_BATCH_BYTES`.
    ///
    /// Empty when the first requested object alone is over the budget; that
    /// one has to be read with `fetch_object_part`.
    async fn fetch_objects(&mut self, ids: Vec<ObjectId>) -> Result<Vec<WireObject>>;

    /// Up to `PART_SIZE` bytes of one object, starting at `offset`.
    async fn fetch_object_part(&mut self, id: ObjectId, offset: u64) -> Result<ObjectPart>;

    /// Returns how many objects the remote stored.
    async fn send_objects(&mut self, objects: Vec<WireObject>) -> Result<usize>;

    /// Parts of one object must arrive in order; the remote stores the
    /// object once the last part is in.
    async fn send_object_part(&mut self, part: ObjectPart) -> Result<()>;

    /// Compare-and-swap of a remote branch; the remote re-checks fast-forward.
    async fn update_ref(&mut self, name: String, old: Option<ObjectId>, new: ObjectId) -> Result<()>;
}

/// Open a transport for `url`.
pub async fn connect(url: &str, credential: Option<Credential>) -> Result<Box<dyn Transport>> {
    match RemoteUrl::parse(url)? {
        RemoteUrl::Local(path) => Ok(Box::new(local::LocalTransport::open(&path)?)),
        RemoteUrl::Tcp { host, port } => Ok(Box::new(tcp::TcpTransport::connect(&host, port, credential).await?)),
    }
}
