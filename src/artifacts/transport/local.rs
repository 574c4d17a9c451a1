use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::transport::parts::LargeObjects;
use crate::artifacts::transport::remote_repository::RemoteRepository;
use crate::artifacts::transport::{Advertisement, ObjectPart, Transport, WireObject};
use crate::errors::Result;
use async_trait::async_trait;
use std::path::Path;

/// A remote that is a repository on this filesystem
#[derive(Debug)]
pub struct LocalTransport {
    remote: RemoteRepository,
    large_objects: LargeObjects,
}

impl LocalTransport {
    pub fn open(path: &Path) -> Result<Self> {
        let remote = RemoteRepository::open(path)?;
        tracing::debug!(path = %path.display(), "opened local transport");

        Ok(LocalTransport {
            remote,
            large_objects: LargeObjects::default(),
        })
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn advertise(&mut self) -> Result<Advertisement> {
        self.remote.advertise()
    }

    async fn negotiate(&mut self, wants: Vec<ObjectId>, haves: Vec<ObjectId>) -> Result<Vec<ObjectId>> {
        self.remote.negotiate(&wants, &haves)
    }

    async fn fetch_objects(&mut self, ids: Vec<ObjectId>) -> Result<Vec<WireObject>> {
        self.remote.get_objects(&ids)
    }

    async fn fetch_object_part(&mut self, id: ObjectId, offset: u64) -> Result<ObjectPart> {
        self.large_objects.read_part(self.remote.database(), &id, offset)
    }

    async fn send_objects(&mut self, objects: Vec<WireObject>) -> Result<usize> {
        self.remote.store_objects(&objects)
    }

    async fn send_object_part(&mut self, part: ObjectPart) -> Result<()> {
        self.large_objects.write_part(self.remote.database(), part)?;
        Ok(())
    }

    async fn update_ref(&mut self, name: String, old: Option<ObjectId>, new: ObjectId) -> Result<()> {
        self.remote.update_ref(&name, old.as_ref(), &new)
    }
}
