use super::helpers::test_options;
use crate::{Engine, IteratorOptions};
use anyhow::Result;
use tempfile::tempdir;

fn seeded_engine(dir: &std::path::Path) -> Result<Engine> {
    let engine = Engine::open(test_options(dir))?;
    engine.put(b"app:1", b"alpha")?;
    engine.put(b"app:2", b"beta")?;
    engine.put(b"web:1", b"gamma")?;
    engine.put(b"web:2", b"delta")?;
    engine.put(b"zed", b"omega")?;
    Ok(engine)
}

// --------------------- Forward / reverse ---------------------

#[test]
fn forward_iteration_in_key_order() -> Result<()> {
    let dir = tempdir()?;
    let engine = seeded_engine(dir.path())?;

    let mut it = engine.iterator(IteratorOptions::default())?;
    let mut pairs = Vec::new();
    while it.valid() {
        pairs.push((it.key().to_vec(), it.value()?));
        it.next();
    }
    assert_eq!(
        pairs,
        vec![
            (b"app:1".to_vec(), b"alpha".to_vec()),
            (b"app:2".to_vec(), b"beta".to_vec()),
            (b"web:1".to_vec(), b"gamma".to_vec()),
            (b"web:2".to_vec(), b"delta".to_vec()),
            (b"zed".to_vec(), b"omega".to_vec()),
        ]
    );
    Ok(())
}

#[test]
fn reverse_iteration_in_descending_order() -> Result<()> {
    let dir = tempdir()?;
    let engine = seeded_engine(dir.path())?;

    let mut it = engine.iterator(IteratorOptions {
        prefix: Vec::new(),
        reverse: true,
    })?;
    let mut keys = Vec::new();
    while it.valid() {
        keys.push(it.key().to_vec());
        it.next();
    }
    assert_eq!(
        keys,
        vec![
            b"zed".to_vec(),
            b"web:2".to_vec(),
            b"web:1".to_vec(),
            b"app:2".to_vec(),
            b"app:1".to_vec(),
        ]
    );
    Ok(())
}

// --------------------- Prefix filtering ---------------------

#[test]
fn prefix_filters_both_directions() -> Result<()> {
    let dir = tempdir()?;
    let engine = seeded_engine(dir.path())?;

    let mut it = engine.iterator(IteratorOptions {
        prefix: b"web:".to_vec(),
        reverse: false,
    })?;
    let mut keys = Vec::new();
    while it.valid() {
        keys.push(it.key().to_vec());
        it.next();
    }
    assert_eq!(keys, vec![b"web:1".to_vec(), b"web:2".to_vec()]);

    let mut it = engine.iterator(IteratorOptions {
        prefix: b"app:".to_vec(),
        reverse: true,
    })?;
    let mut keys = Vec::new();
    while it.valid() {
        keys.push(it.key().to_vec());
        it.next();
    }
    assert_eq!(keys, vec![b"app:2".to_vec(), b"app:1".to_vec()]);
    Ok(())
}

#[test]
fn prefix_with_no_matches_is_immediately_invalid() -> Result<()> {
    let dir = tempdir()?;
    let engine = seeded_engine(dir.path())?;

    let it = engine.iterator(IteratorOptions {
        prefix: b"missing:".to_vec(),
        reverse: false,
    })?;
    assert!(!it.valid());
    Ok(())
}

// --------------------- Seek and rewind ---------------------

#[test]
fn seek_positions_at_boundary() -> Result<()> {
    let dir = tempdir()?;
    let engine = seeded_engine(dir.path())?;

    let mut it = engine.iterator(IteratorOptions::default())?;
    it.seek(b"web");
    assert!(it.valid());
    assert_eq!(it.key(), b"web:1");

    let mut it = engine.iterator(IteratorOptions {
        prefix: Vec::new(),
        reverse: true,
    })?;
    it.seek(b"web");
    assert!(it.valid());
    assert_eq!(it.key(), b"app:2");
    Ok(())
}

#[test]
fn rewind_restarts_with_prefix_applied() -> Result<()> {
    let dir = tempdir()?;
    let engine = seeded_engine(dir.path())?;

    let mut it = engine.iterator(IteratorOptions {
        prefix: b"web:".to_vec(),
        reverse: false,
    })?;
    it.next();
    assert_eq!(it.key(), b"web:2");
    it.rewind();
    assert_eq!(it.key(), b"web:1");
    Ok(())
}

// --------------------- Snapshot semantics ---------------------

#[test]
fn iterator_does_not_see_later_writes() -> Result<()> {
    let dir = tempdir()?;
    let engine = seeded_engine(dir.path())?;

    let mut it = engine.iterator(IteratorOptions::default())?;
    engine.put(b"aaa-first", b"late")?;
    engine.delete(b"zed")?;

    let mut keys = Vec::new();
    while it.valid() {
        keys.push(it.key().to_vec());
        it.next();
    }
    // the snapshot still starts at app:1 and still contains zed
    assert_eq!(keys.first().map(Vec::as_slice), Some(&b"app:1"[..]));
    assert!(keys.contains(&b"zed".to_vec()));
    Ok(())
}

#[test]
fn iterator_value_reads_from_disk() -> Result<()> {
    let dir = tempdir()?;
    let engine = Engine::open(test_options(dir.path()))?;
    engine.put(b"k", b"v")?;

    let it = engine.iterator(IteratorOptions::default())?;
    assert!(it.valid());
    assert_eq!(it.value()?, b"v");
    Ok(())
}

// --------------------- Empty engine ---------------------

#[test]
fn iterator_over_empty_engine() -> Result<()> {
    let dir = tempdir()?;
    let engine = Engine::open(test_options(dir.path()))?;
    let it = engine.iterator(IteratorOptions::default())?;
    assert!(!it.valid());
    Ok(())
}
