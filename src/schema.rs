//! Schema entries: the shape history recorded under one logical name

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::codec::Fingerprint;
use crate::error::{Result, SchemaError};
use crate::types::TypeKey;
use crate::version::Version;

/// The live type bound to a name in this process. Never persisted.
#[derive(Debug, Clone)]
pub struct LiveType {
    pub typ: TypeKey,
    /// The live type's current shape
    pub fingerprint: Fingerprint,
}

/// Outcome of registering a live type under a name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    /// Version of the registered shape
    pub version: Version,
    /// Whether this registration introduced a new shape
    pub is_new: bool,
    /// Whether a different live type was bound before
    pub rebound: bool,
}

/// Versioned shape history of one logical name.
///
/// Versions are the dense set `1..=N` in first-seen order and never change
/// once assigned.
#[derive(Debug, Clone, Default)]
pub struct SchemaEntry {
    versions: HashMap<Fingerprint, Version>,
    live: Option<LiveType>,
}

impl SchemaEntry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `fingerprint` and binds `typ` as the current live type.
    ///
    /// Binding always happens; a version is only assigned when the shape has
    /// not been seen before, so versions key on shape and not on type.
    pub fn register(&mut self, typ: TypeKey, fingerprint: Fingerprint) -> Registration {
        let rebound = self.live.as_ref().is_some_and(|live| live.typ != typ);
        let next = Version::after(self.versions.len());
        let mut is_new = false;
        let version = *self.versions.entry(fingerprint.clone()).or_insert_with(|| {
            is_new = true;
            next
        });
        self.live = Some(LiveType { typ, fingerprint });
        Registration {
            version,
            is_new,
            rebound,
        }
    }

    pub fn version_of(&self, fingerprint: &Fingerprint) -> Option<Version> {
        self.versions.get(fingerprint).copied()
    }

    /// Most recently assigned version
    pub fn latest_version(&self) -> Option<Version> {
        Version::new(self.versions.len() as u64)
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    pub fn live(&self) -> Option<&LiveType> {
        self.live.as_ref()
    }

    /// All recorded shapes, oldest first
    pub fn history(&self) -> Vec<(Version, &Fingerprint)> {
        let mut history: Vec<_> = self.versions.iter().map(|(fp, v)| (*v, fp)).collect();
        history.sort_by_key(|(v, _)| *v);
        history
    }

    pub(crate) fn to_document(&self) -> EntryDocument {
        EntryDocument {
            versions: self
                .history()
                .into_iter()
                .map(|(version, fingerprint)| VersionRecord {
                    version,
                    fingerprint: fingerprint.clone(),
                })
                .collect(),
        }
    }

    /// Rebuilds an entry from its persisted form, rejecting anything that
    /// breaks the dense, unique version invariant.
    pub(crate) fn from_document(name: &str, mut doc: EntryDocument) -> Result<Self> {
        let corrupt = |reason: String| SchemaError::CorruptRegistry {
            name: name.to_string(),
            reason,
        };
        doc.versions.sort_by_key(|r| r.version);
        let mut versions = HashMap::with_capacity(doc.versions.len());
        for (index, record) in doc.versions.into_iter().enumerate() {
            let expected = Version::after(index);
            if record.version != expected {
                return Err(corrupt(format!(
                    "expected version {} but found {}",
                    expected, record.version
                )));
            }
            if let Some(previous) = versions.insert(record.fingerprint, record.version) {
                return Err(corrupt(format!(
                    "versions {} and {} share one shape",
                    previous, record.version
                )));
            }
        }
        if versions.is_empty() {
            return Err(corrupt("entry has no versions".to_string()));
        }
        Ok(Self {
            versions,
            live: None,
        })
    }
}

/// Persisted registry: name to shape history
#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct RegistryDocument {
    pub schemas: BTreeMap<String, EntryDocument>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct EntryDocument {
    pub versions: Vec<VersionRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct VersionRecord {
    pub version: Version,
    pub fingerprint: Fingerprint,
}

#[cfg(test)]
mod tests {
    use super::*;

    struct A;
    struct B;

    fn fp(bytes: &[u8]) -> Fingerprint {
        Fingerprint::from_bytes(bytes.to_vec())
    }

    #[test]
    fn test_first_registration() {
        let mut entry = SchemaEntry::new();
        let reg = entry.register(TypeKey::of::<A>(), fp(b"a"));
        assert_eq!(reg.version, Version::FIRST);
        assert!(reg.is_new);
        assert!(!reg.rebound);
        assert_eq!(entry.latest_version(), Some(Version::FIRST));
    }

    #[test]
    fn test_versions_follow_first_seen_order() {
        let mut entry = SchemaEntry::new();
        for shape in [b"z", b"a", b"z", b"m", b"a"] {
            entry.register(TypeKey::of::<A>(), fp(shape));
        }
        let history: Vec<_> = entry
            .history()
            .into_iter()
            .map(|(v, f)| (v.get(), f.as_bytes().to_vec()))
            .collect();
        assert_eq!(
            history,
            vec![(1, b"z".to_vec()), (2, b"a".to_vec()), (3, b"m".to_vec())]
        );
        assert_eq!(entry.latest_version().map(Version::get), Some(3));
    }

    #[test]
    fn test_same_shape_new_type_rebinds_without_new_version() {
        let mut entry = SchemaEntry::new();
        entry.register(TypeKey::of::<A>(), fp(b"s"));
        let reg = entry.register(TypeKey::of::<B>(), fp(b"s"));
        assert!(!reg.is_new);
        assert!(reg.rebound);
        assert_eq!(entry.len(), 1);
        assert_eq!(entry.live().unwrap().typ, TypeKey::of::<B>());
    }

    #[test]
    fn test_older_shape_keeps_its_version() {
        let mut entry = SchemaEntry::new();
        entry.register(TypeKey::of::<A>(), fp(b"1"));
        entry.register(TypeKey::of::<A>(), fp(b"2"));
        let reg = entry.register(TypeKey::of::<A>(), fp(b"1"));
        assert_eq!(reg.version, Version::FIRST);
        assert_eq!(entry.latest_version().map(Version::get), Some(2));
    }

    #[test]
    fn test_document_roundtrip_drops_live_type() {
        let mut entry = SchemaEntry::new();
        entry.register(TypeKey::of::<A>(), fp(b"1"));
        entry.register(TypeKey::of::<A>(), fp(b"2"));
        let restored = SchemaEntry::from_document("s", entry.to_document()).unwrap();
        assert_eq!(restored.history(), entry.history());
        assert!(restored.live().is_none());
    }

    #[test]
    fn test_document_with_gap_is_rejected() {
        let doc = EntryDocument {
            versions: vec![
                VersionRecord {
                    version: Version::FIRST,
                    fingerprint: fp(b"1"),
                },
                VersionRecord {
                    version: Version::new(3).unwrap(),
                    fingerprint: fp(b"3"),
                },
            ],
        };
        let err = SchemaEntry::from_document("s", doc).unwrap_err();
        assert!(matches!(err, SchemaError::CorruptRegistry { .. }));
    }

    #[test]
    fn test_document_with_duplicate_shape_is_rejected() {
        let doc = EntryDocument {
            versions: vec![
                VersionRecord {
                    version: Version::FIRST,
                    fingerprint: fp(b"1"),
                },
                VersionRecord {
                    version: Version::new(2).unwrap(),
                    fingerprint: fp(b"1"),
                },
            ],
        };
        assert!(SchemaEntry::from_document("s", doc).is_err());
    }
}
