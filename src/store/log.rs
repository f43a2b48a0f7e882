//! Durable backing for the message store.
//!
//! Every accepted mutation is appended here before the in-memory record set
//! changes. On open the log is replayed to rebuild the store.
//!
//! File layout: `magic | version` header followed by frames of
//! `u32 LE length | MessagePack entry | u32 LE CRC32`.

use crate::error::{ChatError, Result};
use crate::types::{Message, MessageId};
use fs2::FileExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};

/// Magic bytes for the message log.
const LOG_MAGIC: &[u8; 4] = b"CHL\0";

/// Current log format version.
const LOG_VERSION: u8 = 1;

const HEADER_LEN: u64 = 5;

/// Sanity bound on a single encoded entry.
const MAX_ENTRY_BYTES: usize = 16 * 1024 * 1024;

/// A persisted store mutation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogEntry {
    Created(Message),
    Edited { id: MessageId, content: String },
    Deleted { id: MessageId },
}

/// Append-only persistence contract behind the store.
///
/// Implementations must make `append` all-or-nothing: either the entry is
/// durable and replayable, or the call fails and nothing was recorded.
pub trait MessageLog: Send + Sync {
    /// Persist one entry.
    fn append(&self, entry: &LogEntry) -> Result<()>;

    /// All entries in append order.
    fn replay(&self) -> Result<Vec<LogEntry>>;

    /// Flush anything buffered to stable storage.
    fn sync(&self) -> Result<()>;
}

/// Log that persists nothing. The store's in-memory set is the only copy.
#[derive(Debug, Default)]
pub struct MemoryLog;

impl MessageLog for MemoryLog {
    fn append(&self, _entry: &LogEntry) -> Result<()> {
        Ok(())
    }

    fn replay(&self) -> Result<Vec<LogEntry>> {
        Ok(Vec::new())
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }
}

struct Writer {
    file: File,
    /// Length of the valid prefix of the file.
    len: u64,
}

/// File-backed append log in a store directory.
pub struct FileLog {
    path: PathBuf,
    writer: Mutex<Writer>,
    sync_every_write: bool,
    /// Held for the lifetime of the log for exclusive access.
    _lock_file: File,
}

impl FileLog {
    /// Open or create the log inside `dir`.
    pub fn open(dir: impl AsRef<Path>, sync_every_write: bool) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let lock_file = Self::acquire_lock(dir)?;
        let path = dir.join("messages.log");

        let existing_len = if path.exists() {
            fs::metadata(&path)?.len()
        } else {
            0
        };

        let len = if existing_len >= HEADER_LEN {
            let (entries, valid_end) = Self::scan(&path)?;
            let file_len = fs::metadata(&path)?.len();
            if valid_end < file_len {
                tracing::warn!(
                    path = %path.display(),
                    valid_end,
                    file_len,
                    "truncating torn tail of message log"
                );
                OpenOptions::new().write(true).open(&path)?.set_len(valid_end)?;
            }
            tracing::info!(path = %path.display(), entries = entries.len(), "message log opened");
            valid_end
        } else {
            if existing_len > 0 {
                // Crashed while writing the header: nothing was ever logged.
                let partial = fs::read(&path)?;
                if !header().starts_with(&partial) {
                    return Err(ChatError::InvalidFormat("Invalid message log magic".into()));
                }
                tracing::warn!(
                    path = %path.display(),
                    file_len = existing_len,
                    "rewriting torn message log header"
                );
            }
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&path)?;
            file.write_all(&header())?;
            file.sync_all()?;
            tracing::info!(path = %path.display(), "message log created");
            HEADER_LEN
        };

        let file = OpenOptions::new().append(true).open(&path)?;

        Ok(Self {
            path,
            writer: Mutex::new(Writer { file, len }),
            sync_every_write,
            _lock_file: lock_file,
        })
    }

    /// Path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn acquire_lock(dir: &Path) -> Result<File> {
        let lock_file = File::create(dir.join("LOCK"))?;
        lock_file
            .try_lock_exclusive()
            .map_err(|_| ChatError::Locked)?;
        Ok(lock_file)
    }

    fn encode_frame(entry: &LogEntry) -> Result<Vec<u8>> {
        let encoded = rmp_serde::to_vec(entry)?;
        if encoded.len() > MAX_ENTRY_BYTES {
            return Err(ChatError::Serialization("log entry too large".into()));
        }

        let mut frame = Vec::with_capacity(encoded.len() + 8);
        frame.extend_from_slice(&(encoded.len() as u32).to_le_bytes());
        frame.extend_from_slice(&encoded);
        frame.extend_from_slice(&crc32fast::hash(&encoded).to_le_bytes());
        Ok(frame)
    }

    /// Read every complete entry. Returns the entries and the offset where the
    /// valid prefix ends; anything past it is a torn write.
    fn scan(path: &Path) -> Result<(Vec<LogEntry>, u64)> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);

        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != LOG_MAGIC {
            return Err(ChatError::InvalidFormat("Invalid message log magic".into()));
        }

        let mut version = [0u8; 1];
        reader.read_exact(&mut version)?;
        if version[0] != LOG_VERSION {
            return Err(ChatError::InvalidFormat(format!(
                "Unsupported message log version: {}",
                version[0]
            )));
        }

        let mut entries = Vec::new();
        let mut offset = HEADER_LEN;

        loop {
            match Self::read_frame(&mut reader) {
                Ok(Some((entry, frame_len))) => {
                    entries.push(entry);
                    offset += frame_len;
                }
                Ok(None) => break,
                Err(ChatError::ChecksumMismatch { expected, got }) => {
                    // A bad final frame is a torn write; anywhere else it's corruption.
                    let frame_end = Self::peek_frame_end(path, offset)?;
                    if frame_end >= file_len {
                        break;
                    }
                    return Err(ChatError::Corruption(format!(
                        "checksum mismatch at offset {} (expected {}, got {})",
                        offset, expected, got
                    )));
                }
                Err(e) => return Err(e),
            }
        }

        Ok((entries, offset))
    }

    /// Read one frame. `Ok(None)` means end of log, including a partial frame.
    fn read_frame(reader: &mut impl Read) -> Result<Option<(LogEntry, u64)>> {
        let mut len_bytes = [0u8; 4];
        if !read_full(reader, &mut len_bytes)? {
            return Ok(None);
        }
        let len = u32::from_le_bytes(len_bytes) as usize;
        if len > MAX_ENTRY_BYTES {
            return Err(ChatError::Corruption("message log entry too large".into()));
        }

        let mut encoded = vec![0u8; len];
        if !read_full(reader, &mut encoded)? {
            return Ok(None);
        }

        let mut checksum_bytes = [0u8; 4];
        if !read_full(reader, &mut checksum_bytes)? {
            return Ok(None);
        }
        let stored = u32::from_le_bytes(checksum_bytes);
        let computed = crc32fast::hash(&encoded);
        if stored != computed {
            return Err(ChatError::ChecksumMismatch {
                expected: stored,
                got: computed,
            });
        }

        let entry = rmp_serde::from_slice(&encoded)?;
        Ok(Some((entry, (len + 8) as u64)))
    }

    fn peek_frame_end(path: &Path, offset: u64) -> Result<u64> {
        use std::io::{Seek, SeekFrom};

        let mut file = File::open(path)?;
        file.seek(SeekFrom::Start(offset))?;
        let mut len_bytes = [0u8; 4];
        file.read_exact(&mut len_bytes)?;
        Ok(offset + 8 + u32::from_le_bytes(len_bytes) as u64)
    }
}

impl MessageLog for FileLog {
    fn append(&self, entry: &LogEntry) -> Result<()> {
        let frame = Self::encode_frame(entry)?;

        let mut writer = self.writer.lock();
        let mut result = writer.file.write_all(&frame);
        if result.is_ok() && self.sync_every_write {
            result = writer.file.sync_data();
        }

        match result {
            Ok(()) => {
                writer.len += frame.len() as u64;
                Ok(())
            }
            Err(e) => {
                // Cut off whatever part of the frame made it to disk.
                let valid = writer.len;
                if let Err(trunc) = writer.file.set_len(valid) {
                    tracing::error!(error = %trunc, "failed to roll back partial log write");
                }
                Err(e.into())
            }
        }
    }

    fn replay(&self) -> Result<Vec<LogEntry>> {
        // Hold the writer so no append races the scan.
        let _writer = self.writer.lock();
        Ok(Self::scan(&self.path)?.0)
    }

    fn sync(&self) -> Result<()> {
        self.writer.lock().file.sync_all()?;
        Ok(())
    }
}

impl Drop for FileLog {
    fn drop(&mut self) {
        // Best-effort sync on drop
        let _ = self.writer.lock().file.sync_all();
    }
}

fn header() -> [u8; HEADER_LEN as usize] {
    let mut header = [0u8; HEADER_LEN as usize];
    header[..4].copy_from_slice(LOG_MAGIC);
    header[4] = LOG_VERSION;
    header
}

/// Fill `buf` completely. Returns false on a clean or partial EOF.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e.into()),
    }
}
