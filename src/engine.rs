//! Shared line-framing and offset bookkeeping used by both watcher backends.
//!
//! Neither backend duplicates this logic: the Linux backend calls
//! [`FileEntry::drain`] from its single event loop, the kqueue backend calls
//! it from its content-tailer thread. Only the *source* of "a file became
//! readable" differs between them.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::PathBuf;

use anyhow::{Context, Result};
use crossbeam_channel::Sender;
use regex::Regex;

use crate::channel::Message;
use crate::offset_store::OffsetStore;
use crate::record::Record;
use crate::scanner;

/// A live tailed file: an open handle positioned at the last-emitted byte.
pub struct FileEntry {
    pub path: PathBuf,
    handle: File,
    offset: u64,
}

impl FileEntry {
    /// Open `path` fresh and seek to whatever the offset store remembers for
    /// it (0 if it has never been seen, or was reset by a prior lifecycle
    /// event).
    pub fn open(path: PathBuf, offsets: &OffsetStore) -> Result<Self> {
        let mut handle =
            File::open(&path).with_context(|| format!("opening {}", path.display()))?;
        let offset = offsets.get(&path);
        handle
            .seek(SeekFrom::Start(offset))
            .with_context(|| format!("seeking {} to {offset}", path.display()))?;
        Ok(Self {
            path,
            handle,
            offset,
        })
    }

    /// Wrap an already-open handle (used by the scanner, which has already
    /// paid the cost of `File::open`).
    pub fn from_handle(path: PathBuf, mut handle: File, offsets: &OffsetStore) -> Result<Self> {
        let offset = offsets.get(&path);
        handle
            .seek(SeekFrom::Start(offset))
            .with_context(|| format!("seeking {} to {offset}", path.display()))?;
        Ok(Self {
            path,
            handle,
            offset,
        })
    }

    /// Read whatever new bytes are available, emit one [`Record`] per
    /// complete line, and persist the new offset. A trailing line with no
    /// newline yet is left unread (not emitted, offset not advanced over
    /// it) so the next call picks it back up once the newline arrives.
    ///
    /// If the file has shrunk below the stored offset (truncation, or a
    /// recreate-in-place), the read position and the stored offset are both
    /// reset to 0 before reading, so the file is re-read from the start.
    pub fn drain(
        &mut self,
        sink_name: &str,
        tx: &Sender<Message>,
        offsets: &OffsetStore,
    ) -> Result<()> {
        let current_len = self
            .handle
            .metadata()
            .with_context(|| format!("stat-ing {}", self.path.display()))?
            .len();
        if current_len < self.offset {
            tracing::warn!(path = %self.path.display(), "file truncated, resetting offset to 0");
            self.offset = 0;
            self.handle
                .seek(SeekFrom::Start(0))
                .with_context(|| format!("re-seeking {} after truncation", self.path.display()))?;
        }

        let mut buf = Vec::new();
        self.handle
            .read_to_end(&mut buf)
            .with_context(|| format!("reading {}", self.path.display()))?;
        if buf.is_empty() {
            return Ok(());
        }

        let mut consumed = 0usize;
        let mut start = 0usize;
        for (i, &b) in buf.iter().enumerate() {
            if b == b'\n' {
                let line = buf[start..=i].to_vec();
                let record = Record::new(sink_name, self.path.clone(), line);
                let _ = tx.send(Message::Record(record));
                start = i + 1;
                consumed = start;
            }
        }

        if consumed == 0 {
            // No complete line yet; rewind the handle past what we just
            // over-read so the partial tail is re-read next time.
            self.handle
                .seek(SeekFrom::Start(self.offset))
                .with_context(|| format!("rewinding {} over partial line", self.path.display()))?;
            return Ok(());
        }

        self.offset += consumed as u64;
        // Rewind to exactly the new offset in case we read past the last
        // complete line into a partial tail.
        self.handle
            .seek(SeekFrom::Start(self.offset))
            .with_context(|| format!("rewinding {} to new offset", self.path.display()))?;
        offsets.update(&self.path, self.offset)
    }
}

impl AsRawFd for FileEntry {
    fn as_raw_fd(&self) -> RawFd {
        self.handle.as_raw_fd()
    }
}

/// Scans the pool once, opens every matching file at its stored offset, and
/// drains whatever is already available. Shared by both watcher backends'
/// startup path and by the CLI's `--once` mode, so "cold start" behaves
/// identically whether or not a watch loop follows it.
pub fn initial_scan_and_drain(
    pool_path: &std::path::Path,
    pattern: &Regex,
    sink_name: &str,
    tx: &Sender<Message>,
    offsets: &OffsetStore,
) -> Result<Vec<FileEntry>> {
    let mut live = Vec::new();
    for scanned in scanner::scan(pool_path, pattern)? {
        let path = scanned.path.clone();
        match FileEntry::from_handle(path.clone(), scanned.handle, offsets) {
            Ok(mut entry) => {
                entry.drain(sink_name, tx, offsets)?;
                live.push(entry);
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "failed to open file during initial scan");
            }
        }
    }
    Ok(live)
}
