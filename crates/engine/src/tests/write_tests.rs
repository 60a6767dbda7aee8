use super::helpers::{count_data_files, test_options};
use crate::write::wrap_key;
use crate::{Engine, KvError};
use anyhow::Result;
use logfile::record::encode_record;
use logfile::{LogRecord, RecordType};
use tempfile::tempdir;

// --------------------- Basic put / get / delete ---------------------

#[test]
fn put_and_get() -> Result<()> {
    let dir = tempdir()?;
    let engine = Engine::open(test_options(dir.path()))?;

    engine.put(b"name", b"bitcask")?;
    assert_eq!(engine.get(b"name")?, b"bitcask");
    Ok(())
}

#[test]
fn get_missing_key() -> Result<()> {
    let dir = tempdir()?;
    let engine = Engine::open(test_options(dir.path()))?;

    assert!(matches!(engine.get(b"nope"), Err(KvError::KeyNotFound)));
    Ok(())
}

#[test]
fn overwrite_key_last_write_wins() -> Result<()> {
    let dir = tempdir()?;
    let engine = Engine::open(test_options(dir.path()))?;

    engine.put(b"k", b"v1")?;
    engine.put(b"k", b"v2")?;
    engine.put(b"k", b"v3")?;
    assert_eq!(engine.get(b"k")?, b"v3");
    Ok(())
}

#[test]
fn delete_then_get_is_not_found() -> Result<()> {
    let dir = tempdir()?;
    let engine = Engine::open(test_options(dir.path()))?;

    engine.put(b"k", b"v")?;
    engine.delete(b"k")?;
    assert!(matches!(engine.get(b"k"), Err(KvError::KeyNotFound)));

    // a later put resurrects the key
    engine.put(b"k", b"v2")?;
    assert_eq!(engine.get(b"k")?, b"v2");
    Ok(())
}

#[test]
fn delete_missing_key_is_noop() -> Result<()> {
    let dir = tempdir()?;
    let engine = Engine::open(test_options(dir.path()))?;

    engine.delete(b"never-written")?;
    assert_eq!(engine.seq_no(), 0, "no-op delete must not burn a seq");
    Ok(())
}

// --------------------- Key / value validation ---------------------

#[test]
fn empty_key_rejected() -> Result<()> {
    let dir = tempdir()?;
    let engine = Engine::open(test_options(dir.path()))?;

    assert!(matches!(engine.put(b"", b"v"), Err(KvError::KeyIsEmpty)));
    assert!(matches!(engine.delete(b""), Err(KvError::KeyIsEmpty)));
    assert!(matches!(engine.get(b""), Err(KvError::KeyIsEmpty)));
    Ok(())
}

#[test]
fn empty_value_accepted() -> Result<()> {
    let dir = tempdir()?;
    let engine = Engine::open(test_options(dir.path()))?;

    engine.put(b"empty", b"")?;
    assert_eq!(engine.get(b"empty")?, b"");
    Ok(())
}

// --------------------- Sequence numbers ---------------------

#[test]
fn seq_increments_per_operation() -> Result<()> {
    let dir = tempdir()?;
    let engine = Engine::open(test_options(dir.path()))?;

    assert_eq!(engine.seq_no(), 0);
    engine.put(b"a", b"1")?;
    assert_eq!(engine.seq_no(), 1);
    engine.put(b"b", b"2")?;
    assert_eq!(engine.seq_no(), 2);
    engine.delete(b"a")?;
    assert_eq!(engine.seq_no(), 3);
    Ok(())
}

// --------------------- Reclaim accounting ---------------------

#[test]
fn reclaim_counts_overwrites_and_tombstones() -> Result<()> {
    let dir = tempdir()?;
    let engine = Engine::open(test_options(dir.path()))?;

    engine.put(b"k", b"v1")?;
    engine.put(b"k", b"v2")?;
    engine.delete(b"k")?;

    // The first two records and the tombstone are all dead now.
    let rec = |seq: u64, value: &[u8], rec_type| {
        let (_, size) = encode_record(&LogRecord {
            key: wrap_key(b"k", seq),
            value: value.to_vec(),
            rec_type,
        });
        size as u64
    };
    let expected = rec(1, b"v1", RecordType::TxnFinished)
        + rec(2, b"v2", RecordType::TxnFinished)
        + rec(3, b"", RecordType::Deleted);
    assert!(
        engine.reclaim_size() >= expected,
        "reclaim {} below expected {}",
        engine.reclaim_size(),
        expected
    );
    Ok(())
}

#[test]
fn reclaim_never_decreases_outside_merge() -> Result<()> {
    let dir = tempdir()?;
    let engine = Engine::open(test_options(dir.path()))?;

    let mut last = 0;
    for i in 0..50u32 {
        engine.put(b"hot", format!("value-{}", i).as_bytes())?;
        let now = engine.reclaim_size();
        assert!(now >= last);
        last = now;
    }
    Ok(())
}

// --------------------- Rotation ---------------------

#[test]
fn rotation_seals_files_and_keys_stay_readable() -> Result<()> {
    let dir = tempdir()?;
    let mut options = test_options(dir.path());
    options.data_file_size = 4 * 1024;
    let engine = Engine::open(options)?;

    let value = vec![b'x'; 128];
    for i in 0..400u32 {
        engine.put(format!("key-{:04}", i).as_bytes(), &value)?;
    }

    assert!(
        count_data_files(dir.path()) >= 10,
        "expected many sealed segments, got {}",
        count_data_files(dir.path())
    );
    for i in 0..400u32 {
        assert_eq!(engine.get(format!("key-{:04}", i).as_bytes())?, value);
    }
    Ok(())
}

#[test]
fn record_never_splits_across_files() -> Result<()> {
    let dir = tempdir()?;
    let mut options = test_options(dir.path());
    options.data_file_size = 1024;
    options.slots = 1;
    let engine = Engine::open(options)?;

    // Values sized so several appends straddle the rotation boundary.
    for i in 0..40u32 {
        engine.put(format!("k{}", i).as_bytes(), &vec![b'y'; 300])?;
    }
    for i in 0..40u32 {
        assert_eq!(engine.get(format!("k{}", i).as_bytes())?, vec![b'y'; 300]);
    }
    Ok(())
}

// --------------------- Durability knobs ---------------------

#[test]
fn sync_writes_roundtrip() -> Result<()> {
    let dir = tempdir()?;
    let mut options = test_options(dir.path());
    options.sync_writes = true;
    let engine = Engine::open(options)?;

    engine.put(b"durable", b"yes")?;
    assert_eq!(engine.get(b"durable")?, b"yes");
    Ok(())
}

#[test]
fn bytes_per_sync_roundtrip() -> Result<()> {
    let dir = tempdir()?;
    let mut options = test_options(dir.path());
    options.bytes_per_sync = 512;
    let engine = Engine::open(options)?;

    for i in 0..100u32 {
        engine.put(format!("k{}", i).as_bytes(), &vec![b'z'; 64])?;
    }
    assert_eq!(engine.get(b"k99")?, vec![b'z'; 64]);
    Ok(())
}

// --------------------- Concurrency ---------------------

#[test]
fn concurrent_puts_across_shards() -> Result<()> {
    let dir = tempdir()?;
    let engine = Engine::open(test_options(dir.path()))?;

    std::thread::scope(|scope| {
        for worker in 0..4u32 {
            let engine = &engine;
            scope.spawn(move || {
                for i in 0..200u32 {
                    let key = format!("w{}-k{}", worker, i);
                    engine.put(key.as_bytes(), key.as_bytes()).unwrap();
                }
            });
        }
    });

    for worker in 0..4u32 {
        for i in 0..200u32 {
            let key = format!("w{}-k{}", worker, i);
            assert_eq!(engine.get(key.as_bytes())?, key.as_bytes());
        }
    }
    assert_eq!(engine.seq_no(), 800);
    Ok(())
}

#[test]
fn concurrent_readers_and_writers() -> Result<()> {
    let dir = tempdir()?;
    let engine = Engine::open(test_options(dir.path()))?;
    for i in 0..100u32 {
        engine.put(format!("base{}", i).as_bytes(), b"seed")?;
    }

    std::thread::scope(|scope| {
        let writer = &engine;
        scope.spawn(move || {
            for i in 0..100u32 {
                writer
                    .put(format!("new{}", i).as_bytes(), b"fresh")
                    .unwrap();
            }
        });
        for _ in 0..2 {
            let reader = &engine;
            scope.spawn(move || {
                for i in 0..100u32 {
                    let value = reader.get(format!("base{}", i).as_bytes()).unwrap();
                    assert_eq!(value, b"seed");
                }
            });
        }
    });
    Ok(())
}
