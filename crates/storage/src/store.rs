//! The persistent map: an in-memory index over an append-only log file.
//!
//! # Design
//!
//! ```text
//!            put/delete                    get
//!                │                          │
//!                ▼                          ▼
//!        ┌──────────────┐          ┌──────────────┐
//!        │ write lock   │          │ read lock    │
//!        └──────┬───────┘          └──────┬───────┘
//!               │ encode → append         │ index lookup → clone
//!               ▼                         ▼
//!        ┌──────────────────────────────────────┐
//!        │ Inner { index, log, live_bytes }     │
//!        └──────────────────────────────────────┘
//! ```
//!
//! Every mutation appends one framed record and then updates the index, so
//! the file is always a valid prefix plus at most one torn record. Reads
//! never touch the disk. Opening a store replays the record region into
//! the index, truncating a torn or corrupt tail down to the last good
//! record.
//!
//! # Concurrency
//!
//! All operations run on the caller's thread. Reads share the lock;
//! mutations are exclusive and therefore linearized. A closed store keeps
//! rejecting every operation with `InstanceClosed` instead of touching a
//! dead file handle (the handle is gone: closing drops it).
//!
//! # Compaction
//!
//! Overwrites and deletes leave dead records behind. Once the log grows
//! past both `min_compaction_bytes` and `compaction_ratio` times the live
//! data size, the live index is rewritten to a fresh file which is renamed
//! over the old one. A failed compaction is logged and retried on a later
//! write; the triggering mutation has already been appended durably.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use satchel_core::{Error, Result, TypeTag, Value};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::format::{self, LogRecord, RecordError, FILE_HEADER_SIZE};
use crate::log::LogFile;
use crate::options::StoreOptions;

/// Name of the data file kept inside a store's directory.
pub const DATA_FILE_NAME: &str = "satchel.db";

/// A durable, typed, string-keyed map rooted at a directory.
///
/// Safe to share across threads; all methods take `&self`.
pub struct Store {
    /// Directory this store is rooted at
    dir: PathBuf,

    /// Path of the data file inside `dir`
    file_path: PathBuf,

    options: StoreOptions,

    inner: RwLock<Inner>,
}

struct Inner {
    /// Live entries; the single source of truth for reads
    index: FxHashMap<String, IndexEntry>,

    /// Open data file, `None` once the store is closed or destroyed
    log: Option<LogFile>,

    /// Total framed size of the records backing `index`
    live_bytes: u64,
}

struct IndexEntry {
    value: Value,
    /// Framed size of the record that wrote this entry, for the
    /// compaction trigger
    record_len: u64,
}

impl Store {
    /// Open the store rooted at `dir`, creating directory and data file if
    /// absent, and replay the log into memory.
    pub fn open(dir: impl AsRef<Path>, options: StoreOptions) -> Result<Store> {
        options
            .validate()
            .map_err(|e| Error::InvalidArgument(e.to_string()))?;

        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        let file_path = dir.join(DATA_FILE_NAME);

        // A crash between a compaction rewrite and its rename leaves the
        // temp file behind; it is never valid data.
        let stale = dir.join(format!("{DATA_FILE_NAME}.compact"));
        match std::fs::remove_file(&stale) {
            Ok(()) => info!(
                target: "satchel::compaction",
                path = %stale.display(),
                "removed stale compaction file"
            ),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => warn!(
                target: "satchel::compaction",
                path = %stale.display(),
                error = %err,
                "failed to remove stale compaction file"
            ),
        }

        let (mut log, body) = if file_path.exists() {
            LogFile::open(&file_path, options.page_size)?
        } else {
            (LogFile::create(&file_path, options.page_size)?, Vec::new())
        };

        let outcome = replay_records(&body);
        let end = FILE_HEADER_SIZE as u64 + outcome.consumed as u64;
        match &outcome.stop {
            ReplayStop::EndOfData | ReplayStop::ZeroFill => log.set_end(end)?,
            ReplayStop::TornTail => {
                warn!(
                    target: "satchel::recovery",
                    path = %file_path.display(),
                    offset = end,
                    "torn record tail, truncating"
                );
                log.truncate_tail(end)?;
            }
            ReplayStop::Corrupt(err) => {
                warn!(
                    target: "satchel::recovery",
                    path = %file_path.display(),
                    offset = end,
                    error = %err,
                    "invalid record, truncating tail"
                );
                log.truncate_tail(end)?;
            }
        }

        let live_bytes: u64 = outcome.index.values().map(|entry| entry.record_len).sum();

        debug!(
            target: "satchel::recovery",
            records = outcome.records,
            entries = outcome.index.len(),
            "replay complete"
        );
        info!(
            target: "satchel::store",
            path = %dir.display(),
            entries = outcome.index.len(),
            bytes = log.bytes_used(),
            "store opened"
        );

        Ok(Store {
            dir,
            file_path,
            options,
            inner: RwLock::new(Inner {
                index: outcome.index,
                log: Some(log),
                live_bytes,
            }),
        })
    }

    /// Write or replace the entry for `key`.
    ///
    /// Durable per the configured [`crate::DurabilityMode`] before this
    /// returns.
    pub fn put(&self, key: &str, value: Value) -> Result<()> {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        let log = inner.log.as_mut().ok_or(Error::InstanceClosed)?;
        validate_key(key)?;

        let bytes =
            format::encode_put(key, &value).map_err(|e| Error::Encoding(e.to_string()))?;
        log.append(&bytes)?;
        if self.options.durability.requires_immediate_fsync() {
            log.sync()?;
        }

        trace!(
            target: "satchel::store",
            key = %key,
            tag = value.type_name(),
            bytes = bytes.len(),
            "put"
        );

        let record_len = bytes.len() as u64;
        let previous = inner
            .index
            .insert(key.to_string(), IndexEntry { value, record_len });
        inner.live_bytes += record_len;
        if let Some(previous) = previous {
            inner.live_bytes -= previous.record_len;
        }

        self.maybe_compact(inner);
        Ok(())
    }

    /// Read the entry for `key`, requiring the stored tag to be
    /// `requested`.
    pub fn get(&self, key: &str, requested: TypeTag) -> Result<Value> {
        let value = self.get_any(key)?;
        let stored = value.type_tag();
        if stored != requested {
            return Err(Error::TypeMismatch { stored, requested });
        }
        Ok(value)
    }

    /// Read the entry for `key` whatever its stored tag.
    pub fn get_any(&self, key: &str) -> Result<Value> {
        let inner = self.inner.read();
        if inner.log.is_none() {
            return Err(Error::InstanceClosed);
        }
        let entry = inner
            .index
            .get(key)
            .ok_or_else(|| Error::NotFound(key.to_string()))?;
        trace!(target: "satchel::store", key = %key, tag = entry.value.type_name(), "get");
        Ok(entry.value.clone())
    }

    /// Whether `key` currently has an entry.
    pub fn contains(&self, key: &str) -> Result<bool> {
        let inner = self.inner.read();
        if inner.log.is_none() {
            return Err(Error::InstanceClosed);
        }
        Ok(inner.index.contains_key(key))
    }

    /// Remove the entry for `key`. A missing key is not an error and
    /// writes nothing.
    pub fn delete(&self, key: &str) -> Result<()> {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        let log = inner.log.as_mut().ok_or(Error::InstanceClosed)?;
        validate_key(key)?;

        if !inner.index.contains_key(key) {
            trace!(target: "satchel::store", key = %key, "delete of absent key");
            return Ok(());
        }

        let bytes = format::encode_delete(key).map_err(|e| Error::Encoding(e.to_string()))?;
        log.append(&bytes)?;
        if self.options.durability.requires_immediate_fsync() {
            log.sync()?;
        }

        if let Some(previous) = inner.index.remove(key) {
            inner.live_bytes -= previous.record_len;
        }
        trace!(target: "satchel::store", key = %key, "delete");

        self.maybe_compact(inner);
        Ok(())
    }

    /// Remove every entry, leaving the store as freshly created.
    pub fn clear(&self) -> Result<()> {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        let log = inner.log.as_mut().ok_or(Error::InstanceClosed)?;

        log.reset()?;
        log.sync()?;
        inner.index.clear();
        inner.live_bytes = 0;

        info!(target: "satchel::store", path = %self.dir.display(), "store cleared");
        Ok(())
    }

    /// Flush pending writes and invalidate the store.
    ///
    /// Every later operation, including a second close, fails with
    /// `InstanceClosed`.
    pub fn close(&self) -> Result<()> {
        let mut inner = self.inner.write();
        let log = inner.log.as_mut().ok_or(Error::InstanceClosed)?;
        log.sync()?;
        inner.log = None;

        info!(target: "satchel::store", path = %self.dir.display(), "store closed");
        Ok(())
    }

    /// Remove the store's data from disk and invalidate the store.
    ///
    /// Entries, data file and instance all go away; the directory itself
    /// is left in place. Reopening the directory starts from scratch.
    pub fn destroy(&self) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.log.is_none() {
            return Err(Error::InstanceClosed);
        }

        // Drop the handle before unlinking; some platforms refuse to
        // remove a file that is still open.
        inner.log = None;
        inner.index.clear();
        inner.live_bytes = 0;
        std::fs::remove_file(&self.file_path)?;

        info!(target: "satchel::store", path = %self.dir.display(), "store destroyed");
        Ok(())
    }

    /// Whether `close` or `destroy` has already run.
    pub fn is_closed(&self) -> bool {
        self.inner.read().log.is_none()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.inner.read().index.len()
    }

    /// True when no entries are live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes of record data currently in the log (dead records included).
    pub fn log_bytes(&self) -> u64 {
        self.inner
            .read()
            .log
            .as_ref()
            .map(|log| log.bytes_used())
            .unwrap_or(0)
    }

    /// Directory this store is rooted at.
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Configuration this store was opened with.
    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// Rewrite the live index into a fresh log when the dead-record
    /// overhead crosses the configured threshold.
    fn maybe_compact(&self, inner: &mut Inner) {
        let Some(log) = inner.log.as_ref() else {
            return;
        };
        let used = log.bytes_used();
        if used <= self.options.min_compaction_bytes {
            return;
        }
        if used <= inner
            .live_bytes
            .saturating_mul(self.options.compaction_ratio as u64)
        {
            return;
        }

        if let Err(err) = self.compact(inner) {
            // The triggering mutation is already durable in the old log; a
            // failed rewrite only postpones space reclamation.
            warn!(target: "satchel::compaction", error = %err, "compaction failed");
        }
    }

    fn compact(&self, inner: &mut Inner) -> Result<()> {
        let start_time = Instant::now();
        let old_used = inner
            .log
            .as_ref()
            .map(|log| log.bytes_used())
            .unwrap_or(0);

        let tmp_path = self.dir.join(format!("{DATA_FILE_NAME}.compact"));
        let mut new_log = LogFile::create(&tmp_path, self.options.page_size)?;
        let mut live_bytes = 0u64;
        for (key, entry) in &inner.index {
            let bytes = format::encode_put(key, &entry.value)
                .map_err(|e| Error::Encoding(e.to_string()))?;
            new_log.append(&bytes)?;
            live_bytes += bytes.len() as u64;
        }
        new_log.sync()?;

        std::fs::rename(&tmp_path, &self.file_path)?;
        new_log.set_path(self.file_path.clone());

        let reclaimed = old_used.saturating_sub(new_log.bytes_used());
        inner.log = Some(new_log);
        inner.live_bytes = live_bytes;

        info!(
            target: "satchel::compaction",
            path = %self.file_path.display(),
            entries = inner.index.len(),
            reclaimed_bytes = reclaimed,
            elapsed_us = start_time.elapsed().as_micros() as u64,
            "compaction finished"
        );
        Ok(())
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        // Best-effort sync for stores dropped without close()
        if let Some(log) = self.inner.get_mut().log.as_ref() {
            let _ = log.sync();
        }
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::InvalidArgument("key must not be empty".to_string()));
    }
    Ok(())
}

/// Why replay stopped consuming the record region.
enum ReplayStop {
    /// Ran out of bytes exactly at a record boundary
    EndOfData,
    /// Hit the zero padding that follows the last record
    ZeroFill,
    /// Final record cut short mid-append
    TornTail,
    /// A record failed validation
    Corrupt(RecordError),
}

struct ReplayOutcome {
    index: FxHashMap<String, IndexEntry>,
    /// Bytes of valid records consumed from the region
    consumed: usize,
    stop: ReplayStop,
    records: u64,
}

/// Apply the record region to a fresh index, last record per key wins.
///
/// Stops at the first sign of damage; everything before it is trusted
/// (each record carried its own CRC), nothing after it can be, because a
/// bad record no longer frames its successors.
fn replay_records(body: &[u8]) -> ReplayOutcome {
    let mut index = FxHashMap::default();
    let mut consumed = 0usize;
    let mut records = 0u64;

    let stop = loop {
        let rest = &body[consumed..];
        if rest.is_empty() {
            break ReplayStop::EndOfData;
        }
        if rest.len() < 4 {
            if rest.iter().all(|b| *b == 0) {
                break ReplayStop::ZeroFill;
            }
            break ReplayStop::TornTail;
        }
        if rest[0..4] == [0, 0, 0, 0] {
            // Zero length field: the pre-sized page tail
            break ReplayStop::ZeroFill;
        }

        match LogRecord::from_bytes(rest) {
            Ok((record, record_len)) => {
                match record {
                    LogRecord::Put { key, value } => {
                        index.insert(
                            key,
                            IndexEntry {
                                value,
                                record_len: record_len as u64,
                            },
                        );
                    }
                    LogRecord::Delete { key } => {
                        index.remove(&key);
                    }
                }
                consumed += record_len;
                records += 1;
            }
            Err(RecordError::InsufficientData) => break ReplayStop::TornTail,
            Err(err) => break ReplayStop::Corrupt(err),
        }
    };

    ReplayOutcome {
        index,
        consumed,
        stop,
        records,
    }
}
