//! The on-disk manifest: an insertion-ordered JSON object.
//!
//! Pagination addresses entries by position, so the order entries were
//! inserted in must survive every persist/load cycle.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::Path;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::entry::ManifestEntry;
use crate::error::{ManifestError, ManifestResult};

/// Ordered `key -> ManifestEntry` mapping.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ManifestMap {
    order: Vec<String>,
    entries: HashMap<String, ManifestEntry>,
}

impl ManifestMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&ManifestEntry> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert or replace. A replaced key keeps its position.
    pub fn insert(&mut self, key: String, entry: ManifestEntry) {
        if self.entries.insert(key.clone(), entry).is_none() {
            self.order.push(key);
        }
    }

    pub fn remove_many<'a>(&mut self, keys: impl IntoIterator<Item = &'a String>) -> usize {
        let doomed: HashSet<&String> = keys.into_iter().collect();
        let before = self.order.len();
        for key in &doomed {
            self.entries.remove(key.as_str());
        }
        self.order.retain(|k| !doomed.contains(k));
        before - self.order.len()
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &ManifestEntry)> {
        self.order
            .iter()
            .filter_map(|k| self.entries.get(k).map(|e| (k, e)))
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.order.iter()
    }

    /// Keys at or below the directory key `prefix`.
    pub fn keys_under(&self, prefix: &str) -> Vec<String> {
        self.order
            .iter()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect()
    }

    pub fn total_bytes(&self) -> u64 {
        self.entries.values().map(|e| e.size_bytes).sum()
    }

    /// Read a manifest file. A missing file is an empty manifest.
    pub fn load(path: &Path) -> ManifestResult<Self> {
        match fs::read(path) {
            Ok(data) => Ok(serde_json::from_slice(&data)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(ManifestError::io(path, e)),
        }
    }

    /// Write atomically: temp file in the same directory, then rename.
    pub fn save(&self, path: &Path) -> ManifestResult<()> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).map_err(|e| ManifestError::io(dir, e))?;
        let mut tmp =
            tempfile::NamedTempFile::new_in(dir).map_err(|e| ManifestError::io(dir, e))?;
        serde_json::to_writer(&mut tmp, self)?;
        tmp.flush().map_err(|e| ManifestError::io(path, e))?;
        tmp.persist(path)?;
        Ok(())
    }
}

impl Serialize for ManifestMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (key, entry) in self.iter() {
            map.serialize_entry(key, entry)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ManifestMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OrderedVisitor;

        impl<'de> Visitor<'de> for OrderedVisitor {
            type Value = ManifestMap;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of dataset keys to manifest entries")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<ManifestMap, A::Error> {
                let mut map = ManifestMap::new();
                while let Some((key, entry)) = access.next_entry::<String, ManifestEntry>()? {
                    map.insert(key, entry);
                }
                Ok(map)
            }
        }

        deserializer.deserialize_map(OrderedVisitor)
    }
}
