//! Schema Store
//!
//! Owns the name to shape-history registry, loads it from and saves it to a
//! single file, and builds marshalers from it.
//!
//! File layout:
//!
//! ```text
//! "SMRG" | format (1 byte) | registry document | SHA256 of document (64 hex bytes)
//! ```
//!
//! Saves go to a `.tmp` sibling which is then renamed over the target, so
//! the file always holds either the old or the new complete registry.

use std::collections::{BTreeMap, HashMap};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use crate::checksum::{Checksum, CHECKSUM_HEX_LEN};
use crate::codec::{BinaryCodec, StructuralCodec};
use crate::config::MarshalConfig;
use crate::encoder::{Decoder, Encoder};
use crate::error::{Result, SchemaError};
use crate::marshal::{Marshaler, TypeMarshaler, TypeUnmarshaler, Unmarshaler};
use crate::schema::{LiveType, RegistryDocument, SchemaEntry};
use crate::types::TypeKey;
use crate::version::Version;

/// Leading bytes of every registry file.
pub const MAGIC: &[u8; 4] = b"SMRG";
/// Registry file format understood by this crate.
pub const FORMAT_VERSION: u8 = 1;

/// The schema store
#[derive(Debug)]
pub struct SchemaStore<C: StructuralCodec = BinaryCodec> {
    /// Path of the registry file
    path: PathBuf,
    codec: C,
    schemas: BTreeMap<String, SchemaEntry>,
    /// fsync the temp file before renaming it into place
    sync_on_save: bool,
}

impl SchemaStore<BinaryCodec> {
    /// Open the registry at `path`, or start empty if it does not exist
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_codec(path, BinaryCodec::new())
    }

    /// Open the registry named by a loaded configuration
    pub fn from_config(config: &MarshalConfig) -> Result<Self> {
        let codec = BinaryCodec::with_limits(config.codec.limits());
        let mut store = Self::open_with_codec(&config.store.path, codec)?;
        store.sync_on_save = config.store.sync_on_save;
        Ok(store)
    }
}

impl<C: StructuralCodec> SchemaStore<C> {
    /// Open the registry at `path` using a specific structural codec
    pub fn open_with_codec(path: impl AsRef<Path>, codec: C) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let schemas = match fs::read(&path) {
            Ok(bytes) => load_registry(&path, &codec, &bytes)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(SchemaError::Persistence {
                    path,
                    reason: e.to_string(),
                })
            }
        };
        info!(path = %path.display(), schemas = schemas.len(), "opened schema store");
        Ok(Self {
            path,
            codec,
            schemas,
            sync_on_save: true,
        })
    }

    /// Get the path of the registry file
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Registered names, sorted
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }

    pub fn entry(&self, name: &str) -> Option<&SchemaEntry> {
        self.schemas.get(name)
    }

    pub fn latest_version(&self, name: &str) -> Option<Version> {
        self.schemas.get(name).and_then(SchemaEntry::latest_version)
    }

    /// Register `T` as the live type for `name`.
    ///
    /// Records `T`'s current shape under a new version if it has never been
    /// seen for `name`; otherwise the existing version is reused.
    pub fn register<T: Serialize + Default + 'static>(&mut self, name: &str) -> Result<Version> {
        let typ = TypeKey::of::<T>();
        let fingerprint = self.codec.fingerprint::<T>()?;
        let checksum = fingerprint.checksum();
        let entry = self.schemas.entry(name.to_string()).or_default();
        let reg = entry.register(typ, fingerprint);
        if reg.rebound {
            debug!(name, typ = %typ, "rebound schema to a different live type");
        }
        if reg.is_new {
            debug!(name, version = %reg.version, shape = checksum.short(), "registered new shape");
        } else {
            debug!(name, version = %reg.version, "shape already registered");
        }
        Ok(reg.version)
    }

    /// Register the type of `sample` for `name`; the value itself is not used.
    pub fn register_name<T: Serialize + Default + 'static>(
        &mut self,
        name: &str,
        _sample: &T,
    ) -> Result<Version> {
        self.register::<T>(name)
    }

    /// Persist the registry, replacing the file atomically
    pub fn save(&self) -> Result<()> {
        let doc = RegistryDocument {
            schemas: self
                .schemas
                .iter()
                .map(|(name, entry)| (name.clone(), entry.to_document()))
                .collect(),
        };
        let mut body = Vec::new();
        self.codec.write_document(&mut body, &doc)?;
        let checksum = Checksum::from_bytes(&body);

        let tmp = tmp_path(&self.path);
        let persist = |e: io::Error| SchemaError::Persistence {
            path: self.path.clone(),
            reason: e.to_string(),
        };
        let mut file = File::create(&tmp).map_err(persist)?;
        file.write_all(MAGIC).map_err(persist)?;
        file.write_all(&[FORMAT_VERSION]).map_err(persist)?;
        file.write_all(&body).map_err(persist)?;
        file.write_all(checksum.as_str().as_bytes()).map_err(persist)?;
        if self.sync_on_save {
            file.sync_all().map_err(persist)?;
        }
        drop(file);
        fs::rename(&tmp, &self.path).map_err(persist)?;

        info!(
            path = %self.path.display(),
            schemas = self.schemas.len(),
            checksum = checksum.short(),
            "saved schema store"
        );
        Ok(())
    }

    fn bound_entry(&self, name: &str) -> Result<(&SchemaEntry, &LiveType)> {
        let entry = self
            .schemas
            .get(name)
            .ok_or_else(|| SchemaError::NotRegistered {
                name: name.to_string(),
            })?;
        let live = entry.live().ok_or_else(|| SchemaError::TypeNotBound {
            name: name.to_string(),
        })?;
        Ok((entry, live))
    }

    /// Build a marshaler that writes `name`'s live type under its current shape
    pub fn new_type_marshaler(&self, name: &str) -> Result<TypeMarshaler<C>> {
        let (entry, live) = self.bound_entry(name)?;
        let typ = live.typ;
        let version = entry
            .version_of(&live.fingerprint)
            .ok_or_else(|| SchemaError::CorruptRegistry {
                name: name.to_string(),
                reason: "live shape has no version".to_string(),
            })?;
        let encoder = Encoder::new(&self.codec, typ, &live.fingerprint)?;
        debug!(name, typ = %typ, version = %version, "built marshaler");
        Ok(TypeMarshaler::new(version, encoder))
    }

    /// Build an unmarshaler with one decoder per historical shape of `name`
    pub fn new_type_unmarshaler(&self, name: &str) -> Result<TypeUnmarshaler<C>> {
        let (entry, live) = self.bound_entry(name)?;
        let typ = live.typ;
        let mut decoders = HashMap::with_capacity(entry.len());
        for (version, fingerprint) in entry.history() {
            decoders.insert(version, Decoder::new(&self.codec, typ, fingerprint)?);
        }
        debug!(name, typ = %typ, versions = decoders.len(), "built unmarshaler");
        Ok(TypeUnmarshaler::new(typ, decoders))
    }

    /// Build a type-keyed marshaler over every registered name
    pub fn new_marshaler(&self) -> Result<Marshaler<C>> {
        let mut marshalers = HashMap::with_capacity(self.schemas.len());
        let mut owners: HashMap<TypeKey, &str> = HashMap::new();
        for name in self.schemas.keys() {
            let marshaler = self.new_type_marshaler(name)?;
            let typ = marshaler.type_key();
            claim(&mut owners, typ, name)?;
            marshalers.insert(typ, marshaler);
        }
        Ok(Marshaler::new(marshalers))
    }

    /// Build a type-keyed unmarshaler over every registered name
    pub fn new_unmarshaler(&self) -> Result<Unmarshaler<C>> {
        let mut unmarshalers = HashMap::with_capacity(self.schemas.len());
        let mut owners: HashMap<TypeKey, &str> = HashMap::new();
        for name in self.schemas.keys() {
            let unmarshaler = self.new_type_unmarshaler(name)?;
            let typ = unmarshaler.type_key();
            claim(&mut owners, typ, name)?;
            unmarshalers.insert(typ, unmarshaler);
        }
        Ok(Unmarshaler::new(unmarshalers))
    }
}

fn claim<'a>(owners: &mut HashMap<TypeKey, &'a str>, typ: TypeKey, name: &'a str) -> Result<()> {
    if let Some(first) = owners.insert(typ, name) {
        return Err(SchemaError::DuplicateType {
            type_name: typ.name(),
            first: first.to_string(),
            second: name.to_string(),
        });
    }
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

fn load_registry<C: StructuralCodec>(
    path: &Path,
    codec: &C,
    bytes: &[u8],
) -> Result<BTreeMap<String, SchemaEntry>> {
    let invalid = |reason: &str| SchemaError::Persistence {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };
    let header = MAGIC.len() + 1;
    if bytes.len() < header + CHECKSUM_HEX_LEN {
        return Err(invalid("file is too short"));
    }
    if &bytes[..MAGIC.len()] != MAGIC {
        return Err(invalid("not a schema registry file"));
    }
    if bytes[MAGIC.len()] != FORMAT_VERSION {
        return Err(invalid("unsupported registry format"));
    }
    let (body, trailer) = bytes[header..].split_at(bytes.len() - header - CHECKSUM_HEX_LEN);
    let actual = Checksum::from_bytes(body);
    if actual.as_str().as_bytes() != trailer {
        return Err(SchemaError::ChecksumMismatch {
            path: path.to_path_buf(),
            expected: String::from_utf8_lossy(trailer).into_owned(),
            actual: actual.to_string(),
        });
    }

    let mut input = body;
    let doc: RegistryDocument = codec
        .read_document(&mut input)
        .map_err(|e| invalid(&format!("undecodable registry document: {}", e)))?;
    if !input.is_empty() {
        return Err(invalid("trailing bytes after registry document"));
    }
    doc.schemas
        .into_iter()
        .map(|(name, entry)| {
            let entry = SchemaEntry::from_document(&name, entry)?;
            Ok((name, entry))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::tempdir;

    #[derive(Serialize, Deserialize, Default)]
    struct One {
        a: String,
    }

    #[derive(Serialize, Deserialize, Default)]
    struct Two {
        a: String,
        b: u32,
    }

    #[test]
    fn test_open_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let store = SchemaStore::open(dir.path().join("schemas.bin")).unwrap();
        assert_eq!(store.names().count(), 0);
    }

    #[test]
    fn test_register_assigns_versions() {
        let dir = tempdir().unwrap();
        let mut store = SchemaStore::open(dir.path().join("schemas.bin")).unwrap();
        assert_eq!(store.register::<One>("s").unwrap().get(), 1);
        assert_eq!(store.register::<One>("s").unwrap().get(), 1);
        assert_eq!(store.register::<Two>("s").unwrap().get(), 2);
        assert_eq!(store.register::<One>("s").unwrap().get(), 1);
        assert_eq!(store.latest_version("s").map(Version::get), Some(2));
    }

    #[test]
    fn test_save_and_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("schemas.bin");
        let mut store = SchemaStore::open(&path).unwrap();
        store.register::<One>("one").unwrap();
        store.register::<One>("two").unwrap();
        store.register::<Two>("two").unwrap();
        store.save().unwrap();
        assert!(!tmp_path(&path).exists());

        let reopened = SchemaStore::open(&path).unwrap();
        assert_eq!(reopened.names().collect::<Vec<_>>(), vec!["one", "two"]);
        for name in ["one", "two"] {
            assert_eq!(
                reopened.entry(name).unwrap().history(),
                store.entry(name).unwrap().history()
            );
            assert!(reopened.entry(name).unwrap().live().is_none());
        }
    }

    #[test]
    fn test_reopened_names_need_a_live_type() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("schemas.bin");
        let mut store = SchemaStore::open(&path).unwrap();
        store.register::<One>("one").unwrap();
        store.save().unwrap();

        let reopened = SchemaStore::open(&path).unwrap();
        assert!(matches!(
            reopened.new_type_marshaler("one"),
            Err(SchemaError::TypeNotBound { .. })
        ));
        assert!(matches!(
            reopened.new_type_unmarshaler("missing"),
            Err(SchemaError::NotRegistered { .. })
        ));
    }

    #[test]
    fn test_corrupted_file_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("schemas.bin");
        let mut store = SchemaStore::open(&path).unwrap();
        store.register::<One>("one").unwrap();
        store.save().unwrap();

        let mut bytes = fs::read(&path).unwrap();
        bytes[MAGIC.len() + 2] ^= 0xFF;
        fs::write(&path, &bytes).unwrap();
        assert!(matches!(
            SchemaStore::open(&path),
            Err(SchemaError::ChecksumMismatch { .. })
        ));

        fs::write(&path, b"garbage that is not a registry at all, not even close to one....").unwrap();
        assert!(matches!(
            SchemaStore::open(&path),
            Err(SchemaError::Persistence { .. })
        ));
    }

    #[test]
    fn test_unreadable_path_is_a_persistence_error() {
        let dir = tempdir().unwrap();
        let err = SchemaStore::open(dir.path()).unwrap_err();
        assert!(matches!(err, SchemaError::Persistence { ref path, .. } if path == dir.path()));
    }

    #[test]
    fn test_undecodable_document_is_a_persistence_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("schemas.bin");
        let body = [0x7Fu8];
        let mut bytes = MAGIC.to_vec();
        bytes.push(FORMAT_VERSION);
        bytes.extend_from_slice(&body);
        bytes.extend_from_slice(Checksum::from_bytes(&body).as_str().as_bytes());
        fs::write(&path, &bytes).unwrap();

        let err = SchemaStore::open(&path).unwrap_err();
        assert!(matches!(
            err,
            SchemaError::Persistence { ref reason, .. } if reason.contains("undecodable")
        ));
    }

    #[test]
    fn test_orphan_tmp_file_is_ignored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("schemas.bin");
        let mut store = SchemaStore::open(&path).unwrap();
        store.register::<One>("one").unwrap();
        store.save().unwrap();
        fs::write(tmp_path(&path), b"partial").unwrap();

        let reopened = SchemaStore::open(&path).unwrap();
        assert_eq!(reopened.latest_version("one").map(Version::get), Some(1));
    }

    #[test]
    fn test_facade_rejects_shared_live_type() {
        let dir = tempdir().unwrap();
        let mut store = SchemaStore::open(dir.path().join("schemas.bin")).unwrap();
        store.register::<One>("a").unwrap();
        store.register::<One>("b").unwrap();
        assert!(matches!(
            store.new_marshaler(),
            Err(SchemaError::DuplicateType { .. })
        ));
        assert!(store.new_type_marshaler("a").is_ok());
    }
}
