//! End-to-end lifecycle tests through the public Rust API.
//!
//! Unit tests in `crates/storage` cover framing, replay and compaction in
//! isolation. These tests cover the guarantees an embedder actually relies
//! on: open → write → close → reopen cycles, durability barriers, crash
//! recovery at the directory level and isolation between instances.
//!
//! Every test opens its own temporary directory, so they are safe to run
//! in parallel against the shared process-wide registry.

use satchel::registry;
use satchel::{DurabilityMode, Error, StoreOptions, TypeTag, Value};
use satchel_storage::format::FILE_HEADER_SIZE;
use satchel_storage::DATA_FILE_NAME;
use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::tempdir;

/// Small pages and a low compaction floor so file-level behaviors
/// trigger within a handful of writes.
fn small_options() -> StoreOptions {
    StoreOptions::for_testing()
}

fn data_file(dir: &Path) -> PathBuf {
    dir.join(DATA_FILE_NAME)
}

fn file_size(path: &Path) -> u64 {
    std::fs::metadata(path).unwrap().len()
}

fn truncate_file(path: &Path, len: u64) {
    let file = OpenOptions::new().write(true).open(path).unwrap();
    file.set_len(len).unwrap();
}

fn overwrite_at(path: &Path, offset: u64, bytes: &[u8]) {
    let mut file = OpenOptions::new().write(true).open(path).unwrap();
    file.seek(SeekFrom::Start(offset)).unwrap();
    file.write_all(bytes).unwrap();
}

#[test]
fn every_value_shape_survives_reopen() {
    let dir = tempdir().unwrap();

    let written = [
        ("i32", Value::Int32(-7)),
        ("i64", Value::Int64(i64::MIN)),
        ("f32", Value::Float32(1.25)),
        ("f64", Value::Float64(-0.0)),
        ("bool", Value::Bool(true)),
        ("str", Value::String("schlüssel → 値".to_string())),
        ("bytes", Value::ByteArray(vec![0, 255, 0, 1])),
        ("i32s", Value::Int32Array(vec![i32::MIN, 0, i32::MAX])),
        ("i64s", Value::Int64Array(vec![1, -1])),
        ("f32s", Value::Float32Array(vec![f32::NAN, 0.5])),
        ("f64s", Value::Float64Array(vec![f64::INFINITY, -2.5])),
    ];

    let handle = registry::open(dir.path(), small_options()).unwrap();
    let store = registry::resolve(handle).unwrap();
    for (key, value) in &written {
        store.put(key, value.clone()).unwrap();
    }
    registry::close(handle).unwrap();
    drop(store);

    let handle = registry::open(dir.path(), small_options()).unwrap();
    let store = registry::resolve(handle).unwrap();
    assert_eq!(store.len(), written.len());
    for (key, value) in &written {
        // Bit-exact equality, so the NaN and -0.0 entries count too
        assert_eq!(store.get(key, value.type_tag()).unwrap(), *value);
    }
    registry::close(handle).unwrap();
}

#[test]
fn replay_keeps_last_write_and_drops_deletes() {
    let dir = tempdir().unwrap();

    let handle = registry::open(dir.path(), small_options()).unwrap();
    let store = registry::resolve(handle).unwrap();
    store.put("kept", Value::Int32(1)).unwrap();
    store.put("kept", Value::Int32(2)).unwrap();
    store.put("kept", Value::String("final".to_string())).unwrap();
    store.put("dropped", Value::Bool(true)).unwrap();
    store.delete("dropped").unwrap();
    registry::close(handle).unwrap();
    drop(store);

    let handle = registry::open(dir.path(), small_options()).unwrap();
    let store = registry::resolve(handle).unwrap();
    assert_eq!(store.len(), 1);
    assert_eq!(
        store.get("kept", TypeTag::String).unwrap(),
        Value::String("final".to_string())
    );
    assert!(matches!(
        store.get_any("dropped"),
        Err(Error::NotFound(_))
    ));
    registry::close(handle).unwrap();
}

#[test]
fn on_close_durability_flushes_at_the_close_barrier() {
    let dir = tempdir().unwrap();
    let options = small_options().with_durability(DurabilityMode::OnClose);

    let handle = registry::open(dir.path(), options.clone()).unwrap();
    let store = registry::resolve(handle).unwrap();
    for i in 0..20 {
        store.put(&format!("k{i}"), Value::Int64(i)).unwrap();
    }
    registry::close(handle).unwrap();
    drop(store);

    let handle = registry::open(dir.path(), options).unwrap();
    let store = registry::resolve(handle).unwrap();
    assert_eq!(store.len(), 20);
    assert_eq!(store.get("k19", TypeTag::Int64).unwrap(), Value::Int64(19));
    registry::close(handle).unwrap();
}

#[test]
fn overwrite_churn_keeps_the_log_bounded() {
    let dir = tempdir().unwrap();
    let handle = registry::open(dir.path(), small_options()).unwrap();
    let store = registry::resolve(handle).unwrap();

    // One live record, overwritten far past the compaction floor. Without
    // compaction the log would hold all 200 copies.
    let payload = vec![0xABu8; 128];
    for _ in 0..200 {
        store.put("blob", Value::ByteArray(payload.clone())).unwrap();
    }

    let record_overhead = 200;
    assert!(
        store.log_bytes() < 4 * (payload.len() as u64 + record_overhead),
        "log did not compact: {} bytes for one live record",
        store.log_bytes()
    );
    assert_eq!(
        store.get("blob", TypeTag::ByteArray).unwrap(),
        Value::ByteArray(payload.clone())
    );
    registry::close(handle).unwrap();
    drop(store);

    // The compacted file replays to the same state
    let handle = registry::open(dir.path(), small_options()).unwrap();
    let store = registry::resolve(handle).unwrap();
    assert_eq!(store.len(), 1);
    assert_eq!(
        store.get("blob", TypeTag::ByteArray).unwrap(),
        Value::ByteArray(payload)
    );
    registry::close(handle).unwrap();
}

#[test]
fn truncated_tail_recovers_a_prefix_and_stays_usable() {
    let dir = tempdir().unwrap();

    let handle = registry::open(dir.path(), small_options()).unwrap();
    let store = registry::resolve(handle).unwrap();
    for i in 0..30 {
        store.put(&format!("k{i:02}"), Value::Int32(i)).unwrap();
    }
    let record_bytes = store.log_bytes();
    registry::close(handle).unwrap();
    drop(store);

    // Chop into the record area, not just the zero padding, to simulate a
    // crash mid-append.
    let keep = FILE_HEADER_SIZE as u64 + record_bytes * 3 / 4;
    truncate_file(&data_file(dir.path()), keep);

    let handle = registry::open(dir.path(), small_options()).unwrap();
    let store = registry::resolve(handle).unwrap();
    let recovered = (0..30)
        .filter(|i| store.contains(&format!("k{i:02}")).unwrap())
        .count();
    assert!(recovered > 0, "no prefix survived truncation");
    assert!(recovered < 30, "truncation removed nothing");

    // The dropped tail must not block new writes
    store.put("after", Value::Bool(true)).unwrap();
    registry::close(handle).unwrap();
    drop(store);

    let handle = registry::open(dir.path(), small_options()).unwrap();
    let store = registry::resolve(handle).unwrap();
    assert_eq!(store.get("after", TypeTag::Bool).unwrap(), Value::Bool(true));
    registry::close(handle).unwrap();
}

#[test]
fn garbage_tail_recovers_a_prefix_and_stays_usable() {
    let dir = tempdir().unwrap();

    let handle = registry::open(dir.path(), small_options()).unwrap();
    let store = registry::resolve(handle).unwrap();
    for i in 0..30 {
        store.put(&format!("k{i:02}"), Value::Int64(i)).unwrap();
    }
    let record_bytes = store.log_bytes();
    registry::close(handle).unwrap();
    drop(store);

    // Smash the second half of the record area with garbage; the CRC
    // rejects the first damaged record and recovery truncates there.
    let offset = FILE_HEADER_SIZE as u64 + record_bytes / 2;
    overwrite_at(&data_file(dir.path()), offset, &[0xFF; 64]);

    let handle = registry::open(dir.path(), small_options()).unwrap();
    let store = registry::resolve(handle).unwrap();
    let recovered = (0..30)
        .filter(|i| store.contains(&format!("k{i:02}")).unwrap())
        .count();
    assert!(recovered > 0, "no prefix survived corruption");
    assert!(recovered < 30, "corruption removed nothing");

    store.put("after", Value::Int32(1)).unwrap();
    assert_eq!(store.get("after", TypeTag::Int32).unwrap(), Value::Int32(1));
    registry::close(handle).unwrap();
}

#[test]
fn instances_in_different_directories_are_isolated() {
    let dir_a = tempdir().unwrap();
    let dir_b = tempdir().unwrap();

    let handle_a = registry::open(dir_a.path(), small_options()).unwrap();
    let handle_b = registry::open(dir_b.path(), small_options()).unwrap();
    let store_a = registry::resolve(handle_a).unwrap();
    let store_b = registry::resolve(handle_b).unwrap();

    store_a.put("shared", Value::Int32(1)).unwrap();
    store_b.put("shared", Value::Int32(2)).unwrap();
    store_a.put("only_a", Value::Bool(true)).unwrap();

    assert_eq!(store_a.get("shared", TypeTag::Int32).unwrap(), Value::Int32(1));
    assert_eq!(store_b.get("shared", TypeTag::Int32).unwrap(), Value::Int32(2));
    assert!(!store_b.contains("only_a").unwrap());

    registry::close(handle_a).unwrap();
    registry::close(handle_b).unwrap();
    drop(store_a);
    drop(store_b);

    let handle_b = registry::open(dir_b.path(), small_options()).unwrap();
    let store_b = registry::resolve(handle_b).unwrap();
    assert_eq!(store_b.len(), 1);
    assert_eq!(store_b.get("shared", TypeTag::Int32).unwrap(), Value::Int32(2));
    registry::close(handle_b).unwrap();
}

#[test]
fn clear_persists_across_reopen() {
    let dir = tempdir().unwrap();

    let handle = registry::open(dir.path(), small_options()).unwrap();
    let store = registry::resolve(handle).unwrap();
    store.put("before", Value::Int32(1)).unwrap();
    registry::clear(handle).unwrap();
    store.put("after", Value::Int32(2)).unwrap();
    registry::close(handle).unwrap();
    drop(store);

    let handle = registry::open(dir.path(), small_options()).unwrap();
    let store = registry::resolve(handle).unwrap();
    assert_eq!(store.len(), 1);
    assert!(!store.contains("before").unwrap());
    assert_eq!(store.get("after", TypeTag::Int32).unwrap(), Value::Int32(2));
    registry::close(handle).unwrap();
}

#[test]
fn large_values_cross_page_boundaries() {
    let dir = tempdir().unwrap();
    let blob = (0..64 * 1024).map(|i| (i % 251) as u8).collect::<Vec<_>>();
    let samples = (0..10_000).map(|i| i as f64 * 0.5).collect::<Vec<_>>();
    let text = "ŧ".repeat(5_000);

    let handle = registry::open(dir.path(), small_options()).unwrap();
    let store = registry::resolve(handle).unwrap();
    store.put("blob", Value::ByteArray(blob.clone())).unwrap();
    store.put("samples", Value::Float64Array(samples.clone())).unwrap();
    store.put("text", Value::String(text.clone())).unwrap();
    registry::close(handle).unwrap();
    drop(store);

    // The 512-byte test page size forces many growth steps
    assert!(file_size(&data_file(dir.path())) > 64 * 1024);

    let handle = registry::open(dir.path(), small_options()).unwrap();
    let store = registry::resolve(handle).unwrap();
    assert_eq!(store.get("blob", TypeTag::ByteArray).unwrap(), Value::ByteArray(blob));
    assert_eq!(
        store.get("samples", TypeTag::Float64Array).unwrap(),
        Value::Float64Array(samples)
    );
    assert_eq!(store.get("text", TypeTag::String).unwrap(), Value::String(text));
    registry::close(handle).unwrap();
}

#[test]
fn default_options_round_trip_without_test_tuning() {
    let dir = tempdir().unwrap();

    let handle = registry::open(dir.path(), StoreOptions::default()).unwrap();
    let store = registry::resolve(handle).unwrap();
    store.put("k", Value::String("v".to_string())).unwrap();
    registry::close(handle).unwrap();
    drop(store);

    let handle = registry::open(dir.path(), StoreOptions::default()).unwrap();
    let store = registry::resolve(handle).unwrap();
    assert_eq!(
        store.get("k", TypeTag::String).unwrap(),
        Value::String("v".to_string())
    );
    registry::close(handle).unwrap();
}
