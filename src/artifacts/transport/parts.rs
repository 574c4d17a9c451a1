//! Objects larger than one frame
//!
//! An object whose canonical encoding is over `MAX_BATCH_BYTES` travels as a
//! run of `ObjectPart`s of at most `PART_SIZE` bytes each, in offset order.
//! `LargeObjects` keeps the per-endpoint state for both directions: the last
//! object it served, so consecutive parts do not inflate it again, and the
//! object it is currently receiving.

use crate::areas::database::Database;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::transport::ObjectPart;
use crate::artifacts::transport::message::PART_SIZE;
use crate::errors::{Result, VcsError};
use bytes::Bytes;

#[derive(Debug, Default)]
pub struct LargeObjects {
    serving: Option<(ObjectId, Bytes)>,
    receiving: Option<Incoming>,
}

#[derive(Debug)]
struct Incoming {
    id: ObjectId,
    total: u64,
    data: Vec<u8>,
}

impl LargeObjects {
    /// Up to `PART_SIZE` bytes of `id` starting at `offset`.
    pub fn read_part(&mut self, database: &Database, id: &ObjectId, offset: u64) -> Result<ObjectPart> {
        let data = match &self.serving {
            Some((serving, data)) if serving == id => data.clone(),
            _ => {
                let data = database.load(id)?;
                self.serving = Some((id.clone(), data.clone()));
                data
            }
        };

        slice(id, &data, offset)
    }

    /// Append one part of an incoming object; stores it, checked against its
    /// id, once the last part is in and returns whether it did.
    ///
    /// A part at offset 0 starts a new object and drops any unfinished one.
    pub fn write_part(&mut self, database: &Database, part: ObjectPart) -> Result<bool> {
        let mut incoming = match self.receiving.take() {
            Some(incoming)
                if incoming.id == part.id
                    && incoming.total == part.total
                    && incoming.data.len() as u64 == part.offset =>
            {
                incoming
            }
            _ if part.offset == 0 => Incoming {
                id: part.id.clone(),
                total: part.total,
                data: Vec::new(),
            },
            _ => {
                return Err(VcsError::InvalidArgument(format!(
                    "part at offset {} of object {} arrived out of order",
                    part.offset, part.id
                )));
            }
        };

        if part.data.is_empty() && incoming.total > 0 {
            return Err(VcsError::InvalidArgument(format!("empty part for object {}", part.id)));
        }
        incoming.data.extend_from_slice(&part.data);
        if incoming.data.len() as u64 > incoming.total {
            return Err(VcsError::Corrupt(format!(
                "object {} is longer than the announced {} bytes",
                incoming.id, incoming.total
            )));
        }

        if incoming.data.len() as u64 == incoming.total {
            database.put_verified(&incoming.id, &incoming.data)?;
            tracing::debug!(oid = %incoming.id, size = incoming.total, "stored object sent in parts");
            return Ok(true);
        }

        self.receiving = Some(incoming);
        Ok(false)
    }
}

/// The parts `data` is sent as, in order.
pub fn split(id: &ObjectId, data: &[u8]) -> Vec<ObjectPart> {
    data.chunks(PART_SIZE)
        .enumerate()
        .map(|(index, chunk)| ObjectPart {
            id: id.clone(),
            offset: (index * PART_SIZE) as u64,
            total: data.len() as u64,
            data: chunk.to_vec(),
        })
        .collect()
}

fn slice(id: &ObjectId, data: &[u8], offset: u64) -> Result<ObjectPart> {
    let start = usize::try_from(offset)
        .ok()
        .filter(|start| *start < data.len())
        .ok_or_else(|| VcsError::InvalidArgument(format!("offset {offset} is past the end of object {id}")))?;
    let end = data.len().min(start + PART_SIZE);

    Ok(ObjectPart {
        id: id.clone(),
        offset,
        total: data.len() as u64,
        data: data[start..end].to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::objects::blob::Blob;
    use crate::artifacts::objects::object::Object;
    use assert_fs::TempDir;
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};

    #[fixture]
    fn database() -> (TempDir, Database) {
        let dir = TempDir::new().unwrap();
        let database = Database::new(dir.path().join("objects").into_boxed_path(), false);
        (dir, database)
    }

    fn large_blob() -> Vec<u8> {
        let payload: Vec<u8> = (0..PART_SIZE * 2 + 17).map(|i| (i % 251) as u8).collect();
        Blob::new(Bytes::from(payload)).serialize().unwrap().to_vec()
    }

    #[rstest]
    fn parts_read_from_one_store_rebuild_the_object_in_another(database: (TempDir, Database)) {
        let (_dir, source) = database;
        let target_dir = TempDir::new().unwrap();
        let target = Database::new(target_dir.path().join("objects").into_boxed_path(), false);

        let content = large_blob();
        let id = source.put_raw(&content).unwrap();

        let mut serving = LargeObjects::default();
        let mut receiving = LargeObjects::default();
        let mut offset = 0;
        let mut parts = 0;
        loop {
            let part = serving.read_part(&source, &id, offset).unwrap();
            assert!(part.data.len() <= PART_SIZE);
            assert_eq!(part.total, content.len() as u64);
            offset += part.data.len() as u64;
            parts += 1;
            if receiving.write_part(&target, part).unwrap() {
                break;
            }
        }

        assert_eq!(parts, 3);
        assert_eq!(target.load(&id).unwrap().to_vec(), content);
    }

    #[rstest]
    fn split_parts_cover_the_object_in_order(database: (TempDir, Database)) {
        let (_dir, database) = database;
        let content = large_blob();
        let id = ObjectId::from_canonical(&content);

        let parts = split(&id, &content);
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[1].offset, PART_SIZE as u64);

        let mut receiving = LargeObjects::default();
        let stored: Vec<bool> = parts
            .into_iter()
            .map(|part| receiving.write_part(&database, part).unwrap())
            .collect();
        assert_eq!(stored, vec![false, false, true]);
        assert!(database.has(&id));
    }

    #[rstest]
    fn a_skipped_part_is_rejected(database: (TempDir, Database)) {
        let (_dir, database) = database;
        let content = large_blob();
        let id = ObjectId::from_canonical(&content);
        let parts = split(&id, &content);

        let mut receiving = LargeObjects::default();
        receiving.write_part(&database, parts[0].clone()).unwrap();
        let skipped = receiving.write_part(&database, parts[2].clone());

        assert!(matches!(skipped, Err(VcsError::InvalidArgument(_))));
        assert!(!database.has(&id));
    }

    #[rstest]
    fn parts_that_do_not_hash_to_their_id_are_not_stored(database: (TempDir, Database)) {
        let (_dir, database) = database;
        let content = large_blob();
        let id = ObjectId::from_canonical(&content);
        let mut parts = split(&id, &content);
        parts[1].data[0] ^= 0xff;

        let mut receiving = LargeObjects::default();
        let mut result = Ok(false);
        for part in parts {
            result = receiving.write_part(&database, part);
        }

        assert!(matches!(result, Err(VcsError::Corrupt(_))));
        assert!(!database.has(&id));
    }

    #[rstest]
    fn reading_past_the_end_is_an_invalid_argument(database: (TempDir, Database)) {
        let (_dir, database) = database;
        let id = database.store(&Blob::new(Bytes::from_static(b"small\n"))).unwrap();

        let result = LargeObjects::default().read_part(&database, &id, 1 << 20);
        assert!(matches!(result, Err(VcsError::InvalidArgument(_))));
    }
}
