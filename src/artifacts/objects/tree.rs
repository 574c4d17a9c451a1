//! Tree object
//!
//! Trees are directory snapshots: an ordered list of named entries, each
//! pointing at a blob (file) or another tree (subdirectory).
//!
//! ## Format
//!
//! On disk: `tree <size>\0<entries>`
//! Each entry: `<mode> <name>\0<20-byte-sha1>`, sorted by name.

use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::objects::entry_mode::EntryMode;
use crate::artifacts::objects::object::{Object, Packable, Unpackable};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::errors::{Result, VcsError};
use std::collections::BTreeMap;
use std::io::{BufRead, Cursor, Write};

/// Directory snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tree {
    entries: BTreeMap<String, DatabaseEntry>,
}

impl Tree {
    pub fn new(entries: BTreeMap<String, DatabaseEntry>) -> Self {
        Tree { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&DatabaseEntry> {
        self.entries.get(name)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &DatabaseEntry)> {
        self.entries.iter()
    }

    pub fn into_entries(self) -> BTreeMap<String, DatabaseEntry> {
        self.entries
    }

    /// Entry names are single path components; anything else could escape
    /// the working tree on checkout. `\\` only separates paths on Windows.
    ///
    /// Checked both when trees are built and when they are decoded.
    pub(crate) fn is_valid_entry_name(name: &str) -> bool {
        let reserved = name.is_empty() || name == "." || name == ".." || name == ".git";
        let separator = name.contains(['/', '\0']) || (cfg!(windows) && name.contains('\\'));

        !reserved && !separator
    }
}

impl Packable for Tree {
    fn pack_payload(&self) -> Result<Vec<u8>> {
        let mut payload = Vec::new();

        for (name, entry) in &self.entries {
            let header = format!("{} {}", entry.mode.as_str(), name);
            payload.extend_from_slice(header.as_bytes());
            payload.push(0);
            entry
                .oid
                .write_h40_to(&mut payload)
                .map_err(|e| VcsError::Corrupt(format!("unable to encode tree entry {name}: {e}")))?;
        }

        Ok(payload)
    }
}

impl Unpackable for Tree {
    fn deserialize(payload: &[u8]) -> Result<Self> {
        let mut entries = BTreeMap::new();
        let mut reader = Cursor::new(payload);

        // Reuse scratch buffers to reduce allocs
        let mut mode_bytes = Vec::new();
        let mut name_bytes = Vec::new();

        loop {
            mode_bytes.clear();
            let n = reader
                .read_until(b' ', &mut mode_bytes)
                .map_err(|e| VcsError::Corrupt(e.to_string()))?;
            if n == 0 {
                break;
            }
            if mode_bytes.pop() != Some(b' ') {
                return Err(VcsError::Corrupt("unexpected EOF in tree entry mode".into()));
            }

            let mode_str = std::str::from_utf8(&mode_bytes)
                .map_err(|_| VcsError::Corrupt("tree entry mode is not UTF-8".into()))?;
            let mode = EntryMode::from_octal_str(mode_str)?;

            name_bytes.clear();
            reader
                .read_until(b'\0', &mut name_bytes)
                .map_err(|e| VcsError::Corrupt(e.to_string()))?;
            if name_bytes.pop() != Some(b'\0') {
                return Err(VcsError::Corrupt("unexpected EOF in tree entry name".into()));
            }
            let name = std::str::from_utf8(&name_bytes)
                .map_err(|_| VcsError::Corrupt("tree entry name is not UTF-8".into()))?
                .to_owned();
            if !Self::is_valid_entry_name(&name) {
                return Err(VcsError::Corrupt(format!("invalid tree entry name: {name:?}")));
            }

            let oid = ObjectId::read_h40_from(&mut reader)?;

            entries.insert(name, DatabaseEntry::new(oid, mode));
        }

        Ok(Tree { entries })
    }
}

impl Object for Tree {
    fn object_type(&self) -> ObjectType {
        ObjectType::Tree
    }

    fn display(&self) -> String {
        let mut out = Vec::new();
        for (name, entry) in &self.entries {
            let kind = if entry.is_tree() {
                ObjectType::Tree
            } else {
                ObjectType::Blob
            };
            // writing into a Vec cannot fail
            let _ = writeln!(
                out,
                "{:0>6} {} {}\t{}",
                entry.mode.as_str(),
                kind,
                entry.oid,
                name
            );
        }

        String::from_utf8_lossy(&out).trim_end().to_string()
    }
}
