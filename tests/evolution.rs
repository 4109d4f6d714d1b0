//! Schema Evolution Tests
//!
//! Payloads written under one layout of a type, read back after the type
//! changed and the store was reopened.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::thread;

use schema_marshal::{SchemaError, SchemaStore, Version};
use serde::{Deserialize, Serialize};
use tempfile::tempdir;

mod v1 {
    use super::*;

    #[derive(Serialize, Deserialize, Default, Debug, PartialEq, Clone)]
    #[serde(default)]
    pub struct S {
        pub v: String,
    }
}

mod v2 {
    use super::*;

    #[derive(Serialize, Deserialize, Default, Debug, PartialEq, Clone)]
    #[serde(default)]
    pub struct S {
        pub v: String,
        pub v1: String,
    }

    #[derive(Serialize, Deserialize, Default, Debug, PartialEq, Clone)]
    #[serde(default)]
    pub struct T {
        pub v: String,
    }
}

/// Registers `T` under "S" in a fresh store at `path`, marshals `value`, saves.
fn write_payload<T>(path: &Path, value: &T) -> Vec<u8>
where
    T: Serialize + Default + 'static,
{
    let mut store = SchemaStore::open(path).unwrap();
    store.register::<T>("S").unwrap();
    let m = store.new_type_marshaler("S").unwrap();
    let data = m.marshal(value).unwrap();
    store.save().unwrap();
    data
}

/// Reopens the store at `path`, registers `T` under "S" and unmarshals `data`.
fn read_payload<T>(path: &Path, data: &[u8]) -> T
where
    T: Serialize + for<'de> Deserialize<'de> + Default + 'static,
{
    let mut store = SchemaStore::open(path).unwrap();
    store.register::<T>("S").unwrap();
    let u = store.new_type_unmarshaler("S").unwrap();
    let mut out = T::default();
    u.unmarshal(data, &mut out).unwrap();
    out
}

#[test]
fn test_add_field() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test1.schema");

    let data = write_payload(&path, &v1::S { v: "a".into() });
    let s: v2::S = read_payload(&path, &data);
    assert_eq!(
        s,
        v2::S {
            v: "a".into(),
            v1: String::new()
        }
    );
}

#[test]
fn test_remove_field() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test2.schema");

    let data = write_payload(
        &path,
        &v2::S {
            v: "a".into(),
            v1: "b".into(),
        },
    );
    let s: v1::S = read_payload(&path, &data);
    assert_eq!(s, v1::S { v: "a".into() });
}

#[test]
fn test_rename_type() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test3.schema");

    let data = write_payload(&path, &v1::S { v: "a".into() });
    let t: v2::T = read_payload(&path, &data);
    assert_eq!(t, v2::T { v: "a".into() });

    // Same shape, different declared type: no new version.
    let store = SchemaStore::open(&path).unwrap();
    assert_eq!(store.latest_version("S"), Some(Version::FIRST));
}

#[test]
fn test_type_mismatch_error() {
    #[derive(Serialize, Deserialize, Default, Debug, PartialEq)]
    struct T1 {}
    #[derive(Serialize, Deserialize, Default, Debug, PartialEq)]
    struct T2 {}

    let dir = tempdir().unwrap();
    let mut store = SchemaStore::open(dir.path().join("test4.schema")).unwrap();
    store.register::<T1>("T1").unwrap();
    store.register::<T2>("T2").unwrap();

    let m = store.new_type_marshaler("T1").unwrap();
    assert!(matches!(
        m.marshal(&T2 {}),
        Err(SchemaError::TypeMismatch { .. })
    ));

    let u = store.new_type_unmarshaler("T1").unwrap();
    assert!(matches!(
        u.unmarshal(&[], &mut T2 {}),
        Err(SchemaError::TypeMismatch { .. })
    ));
}

#[test]
fn test_every_version_stays_decodable() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("history.schema");

    let old = write_payload(&path, &v1::S { v: "old".into() });
    let new = write_payload(
        &path,
        &v2::S {
            v: "new".into(),
            v1: "extra".into(),
        },
    );
    assert_eq!(old[0], 1);
    assert_eq!(new[0], 2);

    let mut store = SchemaStore::open(&path).unwrap();
    store.register::<v2::S>("S").unwrap();
    let u = store.new_type_unmarshaler("S").unwrap();
    assert_eq!(
        u.versions(),
        vec![Version::FIRST, Version::new(2).unwrap()]
    );

    let mut s = v2::S::default();
    u.unmarshal(&old, &mut s).unwrap();
    assert_eq!(s.v, "old");
    assert_eq!(s.v1, "");
    u.unmarshal(&new, &mut s).unwrap();
    assert_eq!(s.v, "new");
    assert_eq!(s.v1, "extra");
}

#[test]
fn test_version_monotonicity() {
    #[derive(Serialize, Default)]
    struct A {
        a: u8,
    }
    #[derive(Serialize, Default)]
    struct B {
        b: u8,
    }
    #[derive(Serialize, Default)]
    struct C {
        c: u8,
    }

    let dir = tempdir().unwrap();
    let mut store = SchemaStore::open(dir.path().join("mono.schema")).unwrap();
    let mut seen = Vec::new();
    seen.push(store.register::<A>("x").unwrap().get());
    seen.push(store.register::<A>("x").unwrap().get());
    seen.push(store.register::<B>("x").unwrap().get());
    seen.push(store.register::<A>("x").unwrap().get());
    seen.push(store.register::<C>("x").unwrap().get());
    seen.push(store.register::<B>("x").unwrap().get());
    assert_eq!(seen, vec![1, 1, 2, 1, 3, 2]);
    assert_eq!(store.entry("x").unwrap().len(), 3);
}

#[test]
fn test_reregistering_older_shape_tags_with_its_version() {
    let dir = tempdir().unwrap();
    let mut store = SchemaStore::open(dir.path().join("back.schema")).unwrap();
    store.register::<v1::S>("S").unwrap();
    store.register::<v2::S>("S").unwrap();
    store.register::<v1::S>("S").unwrap();

    let m = store.new_type_marshaler("S").unwrap();
    assert_eq!(m.version(), Version::FIRST);
    let data = m.marshal(&v1::S { v: "back".into() }).unwrap();

    let u = store.new_type_unmarshaler("S").unwrap();
    let mut s = v1::S::default();
    u.unmarshal(&data, &mut s).unwrap();
    assert_eq!(s.v, "back");
}

#[test]
fn test_persistence_idempotence() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("idem.schema");
    let mut store = SchemaStore::open(&path).unwrap();
    store.register::<v1::S>("a").unwrap();
    store.register::<v2::S>("a").unwrap();
    store.register::<v2::T>("b").unwrap();
    store.save().unwrap();

    let reopened = SchemaStore::open(&path).unwrap();
    for name in ["a", "b"] {
        assert_eq!(
            reopened.entry(name).unwrap().history(),
            store.entry(name).unwrap().history()
        );
    }

    // Saving again without changes reproduces the same file.
    let first = std::fs::read(&path).unwrap();
    reopened.save().unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), first);
}

#[test]
fn test_decoder_not_found_for_unknown_version() {
    let dir = tempdir().unwrap();

    let mut writer = SchemaStore::open(dir.path().join("writer.schema")).unwrap();
    writer.register::<v1::S>("S").unwrap();
    writer.register::<v2::S>("S").unwrap();
    let data = writer
        .new_type_marshaler("S")
        .unwrap()
        .marshal(&v2::S::default())
        .unwrap();

    let mut reader = SchemaStore::open(dir.path().join("reader.schema")).unwrap();
    reader.register::<v2::S>("S").unwrap();
    let u = reader.new_type_unmarshaler("S").unwrap();
    let mut s = v2::S::default();
    assert!(matches!(
        u.unmarshal(&data, &mut s),
        Err(SchemaError::VersionNotFound { version: 2, .. })
    ));
}

#[test]
fn test_marshalers_are_snapshots() {
    let dir = tempdir().unwrap();
    let mut store = SchemaStore::open(dir.path().join("snap.schema")).unwrap();
    store.register::<v1::S>("S").unwrap();
    let m = store.new_type_marshaler("S").unwrap();
    let u = store.new_type_unmarshaler("S").unwrap();

    store.register::<v2::S>("S").unwrap();
    assert_eq!(m.version(), Version::FIRST);
    assert_eq!(u.versions(), vec![Version::FIRST]);

    let data = store
        .new_type_marshaler("S")
        .unwrap()
        .marshal(&v2::S::default())
        .unwrap();
    let mut s = v1::S::default();
    // The old unmarshaler is bound to v1::S and has no decoder for version 2.
    assert!(matches!(
        u.unmarshal(&data, &mut s),
        Err(SchemaError::VersionNotFound { version: 2, .. })
    ));
}

#[test]
fn test_concurrent_marshal_unmarshal() {
    #[derive(Serialize, Deserialize, Default, Debug, PartialEq)]
    #[serde(default)]
    struct Event {
        id: u64,
        label: String,
        tags: Vec<String>,
    }

    let dir = tempdir().unwrap();
    let mut store = SchemaStore::open(dir.path().join("conc.schema")).unwrap();
    store.register::<Event>("event").unwrap();
    let m = Arc::new(store.new_type_marshaler("event").unwrap());
    let u = Arc::new(store.new_type_unmarshaler("event").unwrap());

    let handles: Vec<_> = (0..8u64)
        .map(|t| {
            let m = Arc::clone(&m);
            let u = Arc::clone(&u);
            thread::spawn(move || {
                for i in 0..100u64 {
                    let event = Event {
                        id: t * 1000 + i,
                        label: format!("t{}-{}", t, i),
                        tags: vec!["x".to_string(); (i % 4) as usize],
                    };
                    let data = m.marshal(&event).unwrap();
                    let mut out = Event::default();
                    u.unmarshal(&data, &mut out).unwrap();
                    assert_eq!(out, event);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn test_edge_values_survive_a_reopened_store() {
    #[derive(Serialize, Deserialize, Default, Debug)]
    #[serde(default)]
    struct Sample {
        reading: f64,
        bounds: (f32, f64),
        cleared: Option<Option<String>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        note: Option<String>,
        cells: HashMap<(u8, u8), u32>,
    }

    let dir = tempdir().unwrap();
    let path = dir.path().join("edges.schema");
    let value = Sample {
        reading: f64::NAN,
        bounds: (f32::NEG_INFINITY, f64::INFINITY),
        cleared: Some(None),
        note: None,
        cells: HashMap::from([((1, 2), 3), ((4, 5), 6)]),
    };
    let data = write_payload(&path, &value);
    let out: Sample = read_payload(&path, &data);

    assert!(out.reading.is_nan());
    assert_eq!(out.bounds, (f32::NEG_INFINITY, f64::INFINITY));
    assert_eq!(out.cleared, Some(None));
    assert_eq!(out.note, None);
    assert_eq!(out.cells, value.cells);

    let with_note = Sample {
        note: Some("kept".into()),
        ..Sample::default()
    };
    let data = write_payload(&path, &with_note);
    let out: Sample = read_payload(&path, &data);
    assert_eq!(out.note.as_deref(), Some("kept"));
}

#[test]
fn test_skipped_field_added_in_new_version() {
    #[derive(Serialize, Deserialize, Default, Debug, PartialEq)]
    #[serde(default)]
    struct Old {
        v: String,
    }
    #[derive(Serialize, Deserialize, Default, Debug, PartialEq)]
    #[serde(default)]
    struct New {
        v: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        extra: Option<u32>,
    }

    let dir = tempdir().unwrap();
    let path = dir.path().join("skip.schema");
    let old = write_payload(&path, &Old { v: "a".into() });
    let new = write_payload(
        &path,
        &New {
            v: "b".into(),
            extra: Some(4),
        },
    );
    assert_eq!(old[0], 1);
    assert_eq!(new[0], 2);

    let s: New = read_payload(&path, &old);
    assert_eq!(
        s,
        New {
            v: "a".into(),
            extra: None
        }
    );
    let s: New = read_payload(&path, &new);
    assert_eq!(
        s,
        New {
            v: "b".into(),
            extra: Some(4)
        }
    );
}
