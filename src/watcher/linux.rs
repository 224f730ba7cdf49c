//! Single-threaded inotify backend.
//!
//! One watch on the pool directory, one event mask, one state machine:
//! CREATE/MOVED_TO opens a handle, MODIFY drains it, DELETE/MOVED_FROM
//! closes it and resets its offset.

use std::collections::HashMap;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use crossbeam_channel::Sender;
use inotify::{Inotify, WatchMask};
use regex::Regex;

use crate::channel::Message;
use crate::engine::FileEntry;
use crate::offset_store::OffsetStore;
use crate::watcher::{ShutdownFlag, Watcher};

/// inotify delivers events in a bounded byte buffer; this is generous for a
/// single spool directory's worth of activity between wakeups.
const EVENT_BUFFER_BYTES: usize = 4096;

/// How long to wait for the inotify fd to become readable before re-checking
/// the shutdown flag. `read_events_blocking` itself has no timeout, so
/// without this a `SIGTERM` delivered to another thread would never wake
/// this loop up.
const POLL_TIMEOUT_MS: i32 = 1000;

/// `true` if `fd` became readable within `timeout_ms`, `false` on timeout.
fn wait_readable(fd: RawFd, timeout_ms: i32) -> std::io::Result<bool> {
    let mut pfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    let ret = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
    if ret < 0 {
        let err = std::io::Error::last_os_error();
        return match err.kind() {
            std::io::ErrorKind::Interrupted => Ok(false),
            _ => Err(err),
        };
    }
    Ok(ret > 0)
}

pub struct LinuxWatcher {
    pool_path: PathBuf,
    pattern: Regex,
    sink_name: String,
    tx: Sender<Message>,
    offsets: Arc<OffsetStore>,
    shutdown: ShutdownFlag,
}

impl LinuxWatcher {
    pub fn new(
        pool_path: PathBuf,
        pattern: Regex,
        sink_name: String,
        tx: Sender<Message>,
        offsets: Arc<OffsetStore>,
        shutdown: ShutdownFlag,
    ) -> Self {
        Self {
            pool_path,
            pattern,
            sink_name,
            tx,
            offsets,
            shutdown,
        }
    }
}

impl Watcher for LinuxWatcher {
    fn run(self) -> Result<()> {
        let LinuxWatcher {
            pool_path,
            pattern,
            sink_name,
            tx,
            offsets,
            shutdown,
        } = self;

        let mut inotify = Inotify::init().context("initializing inotify")?;
        inotify
            .watches()
            .add(
                &pool_path,
                WatchMask::CREATE
                    | WatchMask::MOVED_TO
                    | WatchMask::MODIFY
                    | WatchMask::DELETE
                    | WatchMask::MOVED_FROM,
            )
            .with_context(|| format!("watching {}", pool_path.display()))?;
        tracing::info!(path = %pool_path.display(), "inotify watcher started");

        let mut live: HashMap<PathBuf, FileEntry> = crate::engine::initial_scan_and_drain(
            &pool_path,
            &pattern,
            &sink_name,
            &tx,
            &offsets,
        )?
        .into_iter()
        .map(|entry| (entry.path.clone(), entry))
        .collect();

        let inotify_fd = inotify.as_raw_fd();
        let mut buffer = [0u8; EVENT_BUFFER_BYTES];
        while !shutdown.is_set() {
            if !wait_readable(inotify_fd, POLL_TIMEOUT_MS).context("polling inotify fd")? {
                continue;
            }

            let events = match inotify.read_events_blocking(&mut buffer) {
                Ok(events) => events,
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err).context("reading inotify events"),
            };

            for event in events {
                let name = match event.name {
                    Some(name) => name,
                    None => continue,
                };
                if !name.to_str().map(|n| pattern.is_match(n)).unwrap_or(false) {
                    continue;
                }
                let path = pool_path.join(&name);

                use inotify::EventMask;
                if event.mask.intersects(EventMask::CREATE | EventMask::MOVED_TO) {
                    if !path.is_file() {
                        continue;
                    }
                    match FileEntry::open(path.clone(), &offsets) {
                        Ok(entry) => {
                            live.insert(path.clone(), entry);
                            offsets.update(&path, 0)?;
                            tracing::info!(path = %path.display(), "file added to live set");
                        }
                        Err(err) => {
                            tracing::warn!(path = %path.display(), error = %err, "failed to open new file");
                        }
                    }
                } else if event.mask.contains(EventMask::MODIFY) {
                    if let Some(entry) = live.get_mut(&path) {
                        entry.drain(&sink_name, &tx, &offsets)?;
                    }
                } else if event
                    .mask
                    .intersects(EventMask::DELETE | EventMask::MOVED_FROM)
                {
                    if live.remove(&path).is_some() {
                        offsets.reset(&[path.clone()])?;
                        tracing::info!(path = %path.display(), "file removed from live set");
                    }
                }
            }
        }

        tracing::info!("inotify watcher shutting down");
        Ok(())
    }
}
