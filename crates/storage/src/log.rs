//! Append-only data file handle.
//!
//! `LogFile` owns the open file and the append cursor. Disk space grows in
//! page-sized steps: after an append pushes past the current physical
//! length, the file is padded with zeroes up to the next page multiple.
//! Everything between the logical end and the physical end is free space;
//! recovery treats a zero length field as the end of the record region.

use satchel_core::{Error, Result};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::format::{FileHeader, FILE_FORMAT_VERSION, FILE_HEADER_SIZE};

/// Open handle to a store's data file.
///
/// The caller (the store) serializes access; `LogFile` itself assumes one
/// writer and seeks to the logical end before every append, so a write
/// that failed partway cannot shift where later records land.
#[derive(Debug)]
pub struct LogFile {
    /// File handle
    file: File,

    /// Path of the underlying file
    path: PathBuf,

    /// Logical end of data, the next append offset
    end: u64,

    /// Physical file length (zero padding included)
    capacity: u64,

    /// Growth granularity
    page_size: u64,
}

impl LogFile {
    /// Create a fresh data file, truncating anything already at `path`.
    ///
    /// Writes the header and pads the file to one page.
    pub fn create(path: &Path, page_size: u64) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        file.write_all(&FileHeader::new().to_bytes())?;
        let end = FILE_HEADER_SIZE as u64;
        let capacity = round_up_to_page(end, page_size);
        file.set_len(capacity)?;

        debug!(target: "satchel::log", path = %path.display(), "created data file");

        Ok(LogFile {
            file,
            path: path.to_path_buf(),
            end,
            capacity,
            page_size,
        })
    }

    /// Open an existing data file, validating its header, and return the
    /// handle together with the raw record region for replay.
    ///
    /// The append position starts at the header boundary; the store moves
    /// it past the replayed records with [`LogFile::set_end`] or
    /// [`LogFile::truncate_tail`].
    pub fn open(path: &Path, page_size: u64) -> Result<(Self, Vec<u8>)> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = file.metadata()?.len();

        // A crash between file creation and the header write can leave an
        // empty file behind; nothing was ever stored, so reinitialize.
        if len == 0 {
            file.write_all(&FileHeader::new().to_bytes())?;
            let end = FILE_HEADER_SIZE as u64;
            let capacity = round_up_to_page(end, page_size);
            file.set_len(capacity)?;
            return Ok((
                LogFile {
                    file,
                    path: path.to_path_buf(),
                    end,
                    capacity,
                    page_size,
                },
                Vec::new(),
            ));
        }

        if len < FILE_HEADER_SIZE as u64 {
            return Err(Error::Decoding(
                "data file shorter than its header".to_string(),
            ));
        }

        let mut header_bytes = [0u8; FILE_HEADER_SIZE];
        file.read_exact(&mut header_bytes)?;
        let header = FileHeader::from_bytes(&header_bytes);

        if !header.is_valid() {
            return Err(Error::Decoding(
                "bad magic bytes in data file header".to_string(),
            ));
        }
        if header.format_version != FILE_FORMAT_VERSION {
            return Err(Error::Decoding(format!(
                "unsupported data file format version {}",
                header.format_version
            )));
        }

        let mut body = Vec::with_capacity(len as usize - FILE_HEADER_SIZE);
        file.read_to_end(&mut body)?;

        debug!(
            target: "satchel::log",
            path = %path.display(),
            bytes = body.len(),
            "opened data file"
        );

        Ok((
            LogFile {
                file,
                path: path.to_path_buf(),
                end: FILE_HEADER_SIZE as u64,
                capacity: len,
                page_size,
            },
            body,
        ))
    }

    /// Park the append cursor at `end` (an absolute file offset).
    pub fn set_end(&mut self, end: u64) -> Result<()> {
        self.file.seek(SeekFrom::Start(end))?;
        self.end = end;
        Ok(())
    }

    /// Drop everything after `end`, then re-pad to a page boundary.
    ///
    /// Used by recovery to cut a torn or corrupt tail. Shrinking before
    /// padding guarantees the bad bytes are gone, not merely skipped.
    pub fn truncate_tail(&mut self, end: u64) -> Result<()> {
        self.file.set_len(end)?;
        self.capacity = round_up_to_page(end, self.page_size);
        self.file.set_len(self.capacity)?;
        self.set_end(end)
    }

    /// Append framed record bytes at the logical end, growing the file by
    /// whole pages when it runs out of padding.
    pub fn append(&mut self, bytes: &[u8]) -> Result<()> {
        // Never trust the OS cursor across calls: an append that failed
        // mid-write leaves it parked inside the dead bytes.
        self.file.seek(SeekFrom::Start(self.end))?;
        self.file.write_all(bytes)?;
        self.end += bytes.len() as u64;
        if self.end > self.capacity {
            self.capacity = round_up_to_page(self.end, self.page_size);
            self.file.set_len(self.capacity)?;
        }
        Ok(())
    }

    /// Flush data and metadata to stable storage.
    pub fn sync(&self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Reset to a freshly-created state: header only, one page, no records.
    pub fn reset(&mut self) -> Result<()> {
        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&FileHeader::new().to_bytes())?;
        self.end = FILE_HEADER_SIZE as u64;
        self.capacity = round_up_to_page(self.end, self.page_size);
        self.file.set_len(self.capacity)?;
        Ok(())
    }

    /// Absolute offset of the next append.
    pub fn end(&self) -> u64 {
        self.end
    }

    /// Bytes of record data in the file (header excluded).
    pub fn bytes_used(&self) -> u64 {
        self.end - FILE_HEADER_SIZE as u64
    }

    /// Physical file length, always >= [`LogFile::end`].
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record a rename performed on the underlying file.
    ///
    /// Compaction builds a replacement file and renames it over the live
    /// one; the open handle stays valid, only the name changes.
    pub fn set_path(&mut self, path: PathBuf) {
        self.path = path;
    }
}

fn round_up_to_page(value: u64, page_size: u64) -> u64 {
    value.div_euclid(page_size) * page_size + if value % page_size == 0 { 0 } else { page_size }
}
