use super::*;
use std::fs;
use tempfile::tempdir;

// -------------------- Helpers --------------------

fn normal(key: &[u8], value: &[u8]) -> LogRecord {
    LogRecord {
        key: key.to_vec(),
        value: value.to_vec(),
        rec_type: RecordType::Normal,
    }
}

fn read_all(file: &DataFile) -> Vec<LogRecord> {
    let mut records = Vec::new();
    let mut offset = 0u32;
    while let Some((rec, size)) = file.read_record(offset).unwrap() {
        records.push(rec);
        offset += size;
    }
    records
}

// -------------------- Varint --------------------

#[test]
fn varint_u64_roundtrip() {
    for v in [0u64, 1, 127, 128, 300, 1 << 20, u64::MAX] {
        let mut buf = Vec::new();
        varint::encode_u64(&mut buf, v);
        let mut rest = buf.as_slice();
        assert_eq!(varint::decode_u64(&mut rest), Some(v));
        assert!(rest.is_empty());
    }
}

#[test]
fn varint_i64_roundtrip() {
    for v in [0i64, 1, -1, 63, 64, -64, -65, 1_000_000, -1_000_000, i64::MAX, i64::MIN] {
        let mut buf = Vec::new();
        varint::encode_i64(&mut buf, v);
        let mut rest = buf.as_slice();
        assert_eq!(varint::decode_i64(&mut rest), Some(v));
    }
}

#[test]
fn varint_small_values_are_one_byte() {
    let mut buf = Vec::new();
    varint::encode_i64(&mut buf, 63);
    assert_eq!(buf.len(), 1);

    buf.clear();
    varint::encode_i64(&mut buf, 64);
    assert_eq!(buf.len(), 2);
}

#[test]
fn varint_truncated_is_none() {
    // Continuation bit set but no following byte.
    let mut rest: &[u8] = &[0x80];
    assert_eq!(varint::decode_u64(&mut rest), None);

    let mut rest: &[u8] = &[];
    assert_eq!(varint::decode_u64(&mut rest), None);
}

// -------------------- Record codec --------------------

#[test]
fn encode_decode_roundtrip() {
    let dir = tempdir().unwrap();
    let mut file = DataFile::open(dir.path(), 1, IoType::Standard).unwrap();

    let rec = normal(b"name", b"lodekv");
    let (bytes, size) = record::encode_record(&rec);
    assert_eq!(bytes.len(), size);
    file.write(&bytes).unwrap();

    let (decoded, on_disk) = file.read_record(0).unwrap().unwrap();
    assert_eq!(decoded, rec);
    assert_eq!(on_disk as usize, size);
}

#[test]
fn empty_value_roundtrip() {
    let dir = tempdir().unwrap();
    let mut file = DataFile::open(dir.path(), 1, IoType::Standard).unwrap();

    let rec = LogRecord {
        key: b"gone".to_vec(),
        value: Vec::new(),
        rec_type: RecordType::Deleted,
    };
    let (bytes, _) = record::encode_record(&rec);
    file.write(&bytes).unwrap();

    let (decoded, _) = file.read_record(0).unwrap().unwrap();
    assert_eq!(decoded.rec_type, RecordType::Deleted);
    assert!(decoded.value.is_empty());
}

#[test]
fn binary_key_and_value() {
    let dir = tempdir().unwrap();
    let mut file = DataFile::open(dir.path(), 1, IoType::Standard).unwrap();

    let rec = normal(&[0x00, 0xFF, 0x80], &[0xDE, 0xAD, 0xBE, 0xEF]);
    let (bytes, _) = record::encode_record(&rec);
    file.write(&bytes).unwrap();

    let (decoded, _) = file.read_record(0).unwrap().unwrap();
    assert_eq!(decoded, rec);
}

#[test]
fn sequential_records_chain_by_size() {
    let dir = tempdir().unwrap();
    let mut file = DataFile::open(dir.path(), 1, IoType::Standard).unwrap();

    for i in 0..100u32 {
        let rec = normal(format!("key{}", i).as_bytes(), format!("val{}", i).as_bytes());
        let (bytes, _) = record::encode_record(&rec);
        file.write(&bytes).unwrap();
    }

    let records = read_all(&file);
    assert_eq!(records.len(), 100);
    assert_eq!(records[42].key, b"key42");
    assert_eq!(records[42].value, b"val42");
}

#[test]
fn record_pos_roundtrip() {
    let pos = RecordPos {
        file_id: 7,
        offset: 123_456,
        size: 89,
    };
    let decoded = RecordPos::decode(&pos.encode()).unwrap();
    assert_eq!(decoded, pos);
}

#[test]
fn record_pos_truncated_is_corrupt() {
    let pos = RecordPos {
        file_id: 1,
        offset: 1 << 20,
        size: 55,
    };
    let encoded = pos.encode();
    let result = RecordPos::decode(&encoded[..encoded.len() - 1]);
    assert!(matches!(result, Err(RecordError::Corrupt)));
}

// -------------------- End-of-file shapes --------------------

#[test]
fn empty_file_has_no_records() {
    let dir = tempdir().unwrap();
    let file = DataFile::open(dir.path(), 1, IoType::Standard).unwrap();
    assert!(file.read_record(0).unwrap().is_none());
}

#[test]
fn single_byte_file_has_no_records() {
    let dir = tempdir().unwrap();
    fs::write(data_file_path(dir.path(), 1), [0x7F]).unwrap();
    let file = DataFile::open(dir.path(), 1, IoType::Standard).unwrap();
    assert!(file.read_record(0).unwrap().is_none());
}

#[test]
fn zero_padding_reads_as_eof() {
    // A zero CRC together with a zero key size is the end-of-file shape left
    // by zero padding at the tail of a mapped file.
    let dir = tempdir().unwrap();
    fs::write(data_file_path(dir.path(), 1), [0u8; 64]).unwrap();
    let file = DataFile::open(dir.path(), 1, IoType::Standard).unwrap();
    assert!(file.read_record(0).unwrap().is_none());
}

#[test]
fn torn_tail_reads_as_eof() {
    let dir = tempdir().unwrap();
    let mut file = DataFile::open(dir.path(), 1, IoType::Standard).unwrap();

    let (bytes, size) = record::encode_record(&normal(b"k", b"v"));
    file.write(&bytes).unwrap();

    // Append the first half of another record: a valid header whose body
    // never made it to disk.
    let (partial, _) = record::encode_record(&normal(b"torn", b"abcdefgh"));
    file.write(&partial[..partial.len() / 2]).unwrap();

    let reopened = DataFile::open(dir.path(), 1, IoType::Standard).unwrap();
    let (first, _) = reopened.read_record(0).unwrap().unwrap();
    assert_eq!(first.key, b"k");
    assert!(reopened.read_record(size as u32).unwrap().is_none());
}

#[test]
fn header_past_eof_reads_as_eof() {
    let dir = tempdir().unwrap();
    // Four bytes of CRC and nothing else: shorter than the minimum header.
    fs::write(data_file_path(dir.path(), 1), [0xAB, 0xCD, 0xEF, 0x01]).unwrap();
    let file = DataFile::open(dir.path(), 1, IoType::Standard).unwrap();
    assert!(file.read_record(0).unwrap().is_none());
}

// -------------------- Corruption --------------------

#[test]
fn flipped_value_byte_fails_crc() {
    let dir = tempdir().unwrap();
    let path = data_file_path(dir.path(), 1);
    {
        let mut file = DataFile::open(dir.path(), 1, IoType::Standard).unwrap();
        let (bytes, _) = record::encode_record(&normal(b"k", b"value"));
        file.write(&bytes).unwrap();
    }

    let mut data = fs::read(&path).unwrap();
    let last = data.len() - 1;
    data[last] ^= 0xFF;
    fs::write(&path, &data).unwrap();

    let file = DataFile::open(dir.path(), 1, IoType::Standard).unwrap();
    assert!(matches!(
        file.read_record(0),
        Err(RecordError::InvalidCrc)
    ));
}

#[test]
fn bad_type_byte_is_corrupt() {
    let dir = tempdir().unwrap();
    let path = data_file_path(dir.path(), 1);
    {
        let mut file = DataFile::open(dir.path(), 1, IoType::Standard).unwrap();
        let (bytes, _) = record::encode_record(&normal(b"k", b"v"));
        file.write(&bytes).unwrap();
    }

    let mut data = fs::read(&path).unwrap();
    data[4] = 0x9A; // not a valid RecordType
    fs::write(&path, &data).unwrap();

    let file = DataFile::open(dir.path(), 1, IoType::Standard).unwrap();
    assert!(matches!(file.read_record(0), Err(RecordError::Corrupt)));
}

// -------------------- Write offset --------------------

#[test]
fn write_offset_advances_and_survives_reopen() {
    let dir = tempdir().unwrap();
    let mut file = DataFile::open(dir.path(), 3, IoType::Standard).unwrap();
    assert_eq!(file.write_off(), 0);

    let (bytes, size) = record::encode_record(&normal(b"k", b"v"));
    file.write(&bytes).unwrap();
    assert_eq!(file.write_off() as usize, size);
    file.sync().unwrap();

    let reopened = DataFile::open(dir.path(), 3, IoType::Standard).unwrap();
    assert_eq!(reopened.write_off() as usize, size);
}

// -------------------- Hint records --------------------

#[test]
fn hint_record_roundtrip() {
    let dir = tempdir().unwrap();
    let mut hint = DataFile::open_hint_file(dir.path()).unwrap();

    let pos = RecordPos {
        file_id: 4,
        offset: 4096,
        size: 57,
    };
    hint.write_hint_record(b"user-key", &pos).unwrap();

    let (rec, _) = hint.read_record(0).unwrap().unwrap();
    assert_eq!(rec.key, b"user-key");
    assert_eq!(RecordPos::decode(&rec.value).unwrap(), pos);
}

// -------------------- Mmap backend --------------------

#[test]
fn mmap_reads_match_standard_reads() {
    let dir = tempdir().unwrap();
    {
        let mut file = DataFile::open(dir.path(), 9, IoType::Standard).unwrap();
        for i in 0..20u32 {
            let rec = normal(format!("k{}", i).as_bytes(), format!("v{}", i).as_bytes());
            let (bytes, _) = record::encode_record(&rec);
            file.write(&bytes).unwrap();
        }
        file.sync().unwrap();
    }

    let standard = DataFile::open(dir.path(), 9, IoType::Standard).unwrap();
    let mapped = DataFile::open(dir.path(), 9, IoType::Mmap).unwrap();
    assert_eq!(read_all(&standard), read_all(&mapped));
}

#[test]
fn mmap_of_empty_file_has_no_records() {
    let dir = tempdir().unwrap();
    let file = DataFile::open(dir.path(), 2, IoType::Mmap).unwrap();
    assert!(file.read_record(0).unwrap().is_none());
}

#[test]
fn mmap_rejects_writes() {
    let dir = tempdir().unwrap();
    let mut file = DataFile::open(dir.path(), 2, IoType::Mmap).unwrap();
    assert!(file.write(b"nope").is_err());
}
