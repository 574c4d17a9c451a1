//! Content-addressed object store
//!
//! Objects live under `objects/<2 hex>/<38 hex>`, zlib-compressed. A write
//! lands in a temp file inside the shard directory, is synced to disk and then
//! renamed into place, so `put_raw` is durable on return and readers never see
//! a half-written object.

use crate::artifacts::objects::blob::Blob;
use crate::artifacts::objects::commit::Commit;
use crate::artifacts::objects::object::{Object, ObjectBox};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::tree::Tree;
use crate::errors::{IoResultExt, Result, VcsError};
use bytes::Bytes;
use fake::rand;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct Database {
    path: Box<Path>,
    shared: bool,
}

impl Database {
    pub fn new(path: Box<Path>, shared: bool) -> Self {
        Database { path, shared }
    }

    pub fn objects_path(&self) -> &Path {
        &self.path
    }

    /// Create the objects directory with the repository's permissions.
    pub fn init_storage(&self) -> Result<()> {
        std::fs::create_dir_all(&self.path).at(&self.path)?;
        self.apply_permissions(&self.path, true)
    }

    pub fn has(&self, object_id: &ObjectId) -> bool {
        self.path.join(object_id.to_path()).is_file()
    }

    /// Canonical encoding of an object, or `NotFound`.
    pub fn load(&self, object_id: &ObjectId) -> Result<Bytes> {
        let object_path = self.path.join(object_id.to_path());
        if !object_path.is_file() {
            return Err(VcsError::NotFound(format!("object {object_id}")));
        }

        self.read_object(&object_path)
    }

    pub fn store(&self, object: &impl Object) -> Result<ObjectId> {
        self.put_raw(&object.serialize()?)
    }

    /// Store a canonical encoding and return its id.
    ///
    /// Idempotent: content already present is not written again.
    pub fn put_raw(&self, content: &[u8]) -> Result<ObjectId> {
        ObjectType::split_header(content)?;

        let object_id = ObjectId::from_canonical(content);
        let object_path = self.path.join(object_id.to_path());

        if object_path.exists() {
            tracing::trace!(oid = %object_id, "object already stored");
            return Ok(object_id);
        }

        let object_dir = object_path
            .parent()
            .ok_or_else(|| VcsError::InvalidState(format!("invalid object path {}", object_path.display())))?;
        if !object_dir.exists() {
            std::fs::create_dir_all(object_dir).at(object_dir)?;
            self.apply_permissions(object_dir, true)?;
        }

        self.write_object(&object_path, content)?;
        tracing::debug!(oid = %object_id, size = content.len(), "stored object");

        Ok(object_id)
    }

    /// Store data received from elsewhere, refusing it if it does not hash to
    /// the id it was announced under.
    pub fn put_verified(&self, expected: &ObjectId, content: &[u8]) -> Result<ObjectId> {
        let actual = ObjectId::from_canonical(content);
        if &actual != expected {
            return Err(VcsError::Corrupt(format!(
                "object announced as {expected} hashes to {actual}"
            )));
        }

        self.put_raw(content)
    }

    pub fn parse_object(&self, object_id: &ObjectId) -> Result<ObjectBox> {
        ObjectBox::parse(&self.load(object_id)?)
    }

    pub fn parse_object_as_blob(&self, object_id: &ObjectId) -> Result<Blob> {
        match self.parse_object(object_id)? {
            ObjectBox::Blob(blob) => Ok(*blob),
            other => Err(Self::kind_mismatch(object_id, ObjectType::Blob, other.object_type())),
        }
    }

    pub fn parse_object_as_tree(&self, object_id: &ObjectId) -> Result<Tree> {
        match self.parse_object(object_id)? {
            ObjectBox::Tree(tree) => Ok(*tree),
            other => Err(Self::kind_mismatch(object_id, ObjectType::Tree, other.object_type())),
        }
    }

    pub fn parse_object_as_commit(&self, object_id: &ObjectId) -> Result<Commit> {
        match self.parse_object(object_id)? {
            ObjectBox::Commit(commit) => Ok(*commit),
            other => Err(Self::kind_mismatch(object_id, ObjectType::Commit, other.object_type())),
        }
    }

    pub fn get_object_type(&self, object_id: &ObjectId) -> Result<ObjectType> {
        let content = self.load(object_id)?;
        let (object_type, _) = ObjectType::split_header(&content)?;
        Ok(object_type)
    }

    fn kind_mismatch(object_id: &ObjectId, expected: ObjectType, actual: ObjectType) -> VcsError {
        VcsError::Corrupt(format!("object {object_id} is a {actual}, expected a {expected}"))
    }

    fn read_object(&self, object_path: &Path) -> Result<Bytes> {
        let compressed = std::fs::read(object_path).at(object_path)?;

        Self::decompress(&compressed)
            .map_err(|e| VcsError::Corrupt(format!("{}: {e}", object_path.display())))
    }

    fn write_object(&self, object_path: &Path, content: &[u8]) -> Result<()> {
        let object_dir = object_path
            .parent()
            .ok_or_else(|| VcsError::InvalidState(format!("invalid object path {}", object_path.display())))?;
        let temp_object_path = object_dir.join(Self::generate_temp_name());

        let compressed = Self::compress(content).at(&temp_object_path)?;

        let result = (|| {
            let mut file = std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&temp_object_path)
                .at(&temp_object_path)?;
            file.write_all(&compressed).at(&temp_object_path)?;
            file.sync_all().at(&temp_object_path)?;
            drop(file);

            self.apply_permissions(&temp_object_path, false)?;

            // rename the temp file to the object file to make it atomic
            std::fs::rename(&temp_object_path, object_path).at(object_path)
        })();

        if result.is_err() {
            let _ = std::fs::remove_file(&temp_object_path);
        }

        result
    }

    #[cfg(unix)]
    fn apply_permissions(&self, path: &Path, is_dir: bool) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let mode = match (self.shared, is_dir) {
            (true, true) => 0o2775,
            (true, false) => 0o664,
            (false, true) => 0o755,
            (false, false) => 0o644,
        };
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).at(path)
    }

    #[cfg(not(unix))]
    fn apply_permissions(&self, _path: &Path, _is_dir: bool) -> Result<()> {
        Ok(())
    }

    fn compress(data: &[u8]) -> std::io::Result<Vec<u8>> {
        let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(data)?;
        encoder.finish()
    }

    fn decompress(data: &[u8]) -> std::io::Result<Bytes> {
        let mut decoder = flate2::read::ZlibDecoder::new(data);
        let mut decompressed_content = Vec::new();
        decoder.read_to_end(&mut decompressed_content)?;

        Ok(decompressed_content.into())
    }

    fn generate_temp_name() -> String {
        format!("tmp-obj-{}", rand::random::<u32>())
    }

    /// Find all objects whose id starts with the given hex prefix.
    ///
    /// Used to resolve abbreviated ids. Several matches mean the prefix is
    /// ambiguous; the caller decides what to do with them.
    pub fn find_objects_by_prefix(&self, prefix: &str) -> Result<Vec<ObjectId>> {
        let mut matches = Vec::new();
        let prefix = prefix.to_ascii_lowercase();

        let dirs: Vec<PathBuf> = if prefix.len() >= 2 {
            vec![self.path.join(&prefix[..2])]
        } else {
            (0..=255u8).map(|i| self.path.join(format!("{i:02x}"))).collect()
        };

        for dir_path in dirs {
            if !dir_path.is_dir() {
                continue;
            }
            let dir_name = dir_path
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_default();

            for entry in std::fs::read_dir(&dir_path).at(&dir_path)? {
                let entry = entry.at(&dir_path)?;
                let full_oid = format!("{}{}", dir_name, entry.file_name().to_string_lossy());

                if full_oid.starts_with(&prefix)
                    && let Ok(oid) = ObjectId::try_parse(full_oid)
                {
                    matches.push(oid);
                }
            }
        }

        matches.sort();
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::objects::object::Object;
    use assert_fs::TempDir;
    use rstest::{fixture, rstest};
    use walkdir::WalkDir;

    #[fixture]
    fn database() -> (TempDir, Database) {
        let dir = TempDir::new().unwrap();
        let database = Database::new(dir.path().join("objects").into_boxed_path(), false);
        (dir, database)
    }

    fn count_object_files(database: &Database) -> usize {
        WalkDir::new(database.objects_path())
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .count()
    }

    #[rstest]
    fn storing_the_same_content_twice_keeps_one_copy(database: (TempDir, Database)) {
        let (_dir, database) = database;
        let blob = Blob::new(Bytes::from_static(b"same content"));

        let first = database.store(&blob).unwrap();
        let second = database.store(&blob.clone()).unwrap();

        assert_eq!(first, second);
        assert_eq!(count_object_files(&database), 1);
        assert!(database.has(&first));
    }

    #[rstest]
    fn load_returns_the_canonical_encoding(database: (TempDir, Database)) {
        let (_dir, database) = database;
        let blob = Blob::new(Bytes::from_static(b"hello\n"));
        let oid = database.store(&blob).unwrap();

        assert_eq!(database.load(&oid).unwrap(), blob.serialize().unwrap());
        assert_eq!(database.parse_object_as_blob(&oid).unwrap(), blob);
    }

    #[rstest]
    fn missing_objects_are_not_found(database: (TempDir, Database)) {
        let (_dir, database) = database;
        let oid = ObjectId::try_parse("0".repeat(40)).unwrap();

        assert!(!database.has(&oid));
        assert!(matches!(database.load(&oid), Err(VcsError::NotFound(_))));
    }

    #[rstest]
    fn kind_mismatch_is_reported(database: (TempDir, Database)) {
        let (_dir, database) = database;
        let oid = database.store(&Blob::new(Bytes::from_static(b"x"))).unwrap();

        assert!(matches!(database.parse_object_as_tree(&oid), Err(VcsError::Corrupt(_))));
    }

    #[rstest]
    fn verified_put_rejects_mislabeled_content(database: (TempDir, Database)) {
        let (_dir, database) = database;
        let wrong = ObjectId::try_parse("1".repeat(40)).unwrap();

        let result = database.put_verified(&wrong, b"blob 1\0x");
        assert!(matches!(result, Err(VcsError::Corrupt(_))));
        assert_eq!(count_object_files(&database), 0);
    }

    #[rstest]
    fn prefix_lookup_finds_stored_objects(database: (TempDir, Database)) {
        let (_dir, database) = database;
        let oid = database.store(&Blob::new(Bytes::from_static(b"prefix"))).unwrap();

        let found = database.find_objects_by_prefix(&oid.to_short_oid()).unwrap();
        assert_eq!(found, vec![oid]);
    }
}
