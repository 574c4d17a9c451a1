use crate::artifacts::objects::blob::Blob;
use crate::artifacts::objects::commit::Commit;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::tree::Tree;
use crate::errors::Result;
use bytes::Bytes;

pub trait Packable {
    /// Encode the payload only; the header is added by `Object::serialize`.
    fn pack_payload(&self) -> Result<Vec<u8>>;
}

pub trait Unpackable {
    /// Decode a payload whose header has already been stripped.
    fn deserialize(payload: &[u8]) -> Result<Self>
    where
        Self: Sized;
}

pub trait Object: Packable {
    fn object_type(&self) -> ObjectType;

    fn display(&self) -> String;

    /// Canonical encoding: `<kind> <size>\0<payload>`
    fn serialize(&self) -> Result<Bytes> {
        let payload = self.pack_payload()?;
        let header = format!("{} {}\0", self.object_type().as_str(), payload.len());

        let mut content = Vec::with_capacity(header.len() + payload.len());
        content.extend_from_slice(header.as_bytes());
        content.extend_from_slice(&payload);

        Ok(Bytes::from(content))
    }

    fn object_id(&self) -> Result<ObjectId> {
        Ok(ObjectId::from_canonical(&self.serialize()?))
    }
}

/// Any decoded object, tagged by kind
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectBox {
    Blob(Box<Blob>),
    Tree(Box<Tree>),
    Commit(Box<Commit>),
}

impl ObjectBox {
    pub fn parse(content: &[u8]) -> Result<Self> {
        let (object_type, payload) = ObjectType::split_header(content)?;

        match object_type {
            ObjectType::Blob => Ok(ObjectBox::Blob(Box::new(Blob::deserialize(payload)?))),
            ObjectType::Tree => Ok(ObjectBox::Tree(Box::new(Tree::deserialize(payload)?))),
            ObjectType::Commit => Ok(ObjectBox::Commit(Box::new(Commit::deserialize(payload)?))),
        }
    }

    pub fn object_type(&self) -> ObjectType {
        match self {
            ObjectBox::Blob(_) => ObjectType::Blob,
            ObjectBox::Tree(_) => ObjectType::Tree,
            ObjectBox::Commit(_) => ObjectType::Commit,
        }
    }

    pub fn display(&self) -> String {
        match self {
            ObjectBox::Blob(blob) => blob.display(),
            ObjectBox::Tree(tree) => tree.display(),
            ObjectBox::Commit(commit) => commit.display(),
        }
    }
}
