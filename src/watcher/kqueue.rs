//! Two-thread kqueue backend for non-Linux targets.
//!
//! kqueue watches file descriptors, not directory namespaces, so file
//! creation/removal can't be observed the way inotify observes it directly.
//! Two cooperating threads make up for that:
//!
//! - the directory poller lists the pool every 10s and diffs it against the
//!   previous listing, resetting offsets for anything that appeared or
//!   disappeared, then raises `SIGUSR1` on the process;
//! - the content tailer blocks on a kqueue filter set built from the
//!   currently-open handles plus a `SIGUSR1` filter; on a read event it
//!   drains that file, and on the signal it closes every handle and
//!   rebuilds the filter set from a fresh scan, picking up the poller's
//!   changes.

use std::collections::HashSet;
use std::sync::Arc;
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::Sender;
use kqueue::{EventData, EventFilter, FilterFlag, Ident, Watcher as KqueueHandle};
use regex::Regex;

use crate::channel::Message;
use crate::engine::FileEntry;
use crate::offset_store::OffsetStore;
use crate::scanner;
use crate::watcher::{ShutdownFlag, Watcher};

const POLL_INTERVAL: Duration = Duration::from_secs(10);

pub struct KqueueWatcher {
    pool_path: PathBuf,
    pattern: Regex,
    sink_name: String,
    tx: Sender<Message>,
    offsets: Arc<OffsetStore>,
    shutdown: ShutdownFlag,
}

impl KqueueWatcher {
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

    fn list_names(&self) -> Result<HashSet<PathBuf>> {
        Ok(scanner::scan(&self.pool_path, &self.pattern)?
            .into_iter()
            .map(|f| f.path)
            .collect())
    }

    /// Lists the pool every `POLL_INTERVAL`, diffs against the previously
    /// observed set, resets offsets for anything that changed, and wakes
    /// the content tailer. The first poll only seeds the baseline so a
    /// non-empty offset store at startup isn't immediately reset by a
    /// spurious apparent diff.
    fn run_directory_poller(&self) -> Result<()> {
        let mut previous = self.list_names().context("initial pool listing")?;

        while !self.shutdown.is_set() {
            std::thread::sleep(POLL_INTERVAL);
            if self.shutdown.is_set() {
                break;
            }

            let current = self.list_names().context("polling pool directory")?;
            let diff: Vec<PathBuf> = previous
                .symmetric_difference(&current)
                .cloned()
                .collect();

            if !diff.is_empty() {
                self.offsets.reset(&diff)?;
                previous = current;
                unsafe {
                    libc::raise(libc::SIGUSR1);
                }
            }
        }
        Ok(())
    }

    /// Repeatedly rebuilds a kqueue filter set of read-filters (one per
    /// live handle) plus one signal filter, and drains whichever files
    /// become readable. A `SIGUSR1` delivery closes every handle and
    /// breaks out to force a fresh scan and filter rebuild.
    fn run_content_tailer(&self) -> Result<()> {
        loop {
            if self.shutdown.is_set() {
                return Ok(());
            }

            let mut live = crate::engine::initial_scan_and_drain(
                &self.pool_path,
                &self.pattern,
                &self.sink_name,
                &self.tx,
                &self.offsets,
            )?;

            let mut watcher = KqueueHandle::new().context("creating kqueue handle")?;
            for entry in &live {
                watcher
                    .add_fd(entry.as_raw_fd(), EventFilter::EVFILT_READ, FilterFlag::empty())
                    .context("registering read filter")?;
            }
            watcher
                .add_signal(libc::SIGUSR1, FilterFlag::empty())
                .context("registering SIGUSR1 filter")?;
            watcher.watch().context("starting kqueue watch")?;

            'inner: loop {
                if self.shutdown.is_set() {
                    return Ok(());
                }
                match watcher.poll(Some(Duration::from_secs(1))) {
                    None => continue 'inner,
                    Some(event) => match event.data {
                        EventData::ReadReady(_) => {
                            if let Ident::Fd(fd) = event.ident {
                                if let Some(entry) =
                                    live.iter_mut().find(|e| e.as_raw_fd() == fd)
                                {
                                    entry.drain(&self.sink_name, &self.tx, &self.offsets)?;
                                }
                            }
                        }
                        _ => {
                            tracing::info!("kqueue signal received, rebuilding filter set");
                            break 'inner;
                        }
                    },
                }
            }
        }
    }
}

impl Watcher for KqueueWatcher {
    fn run(self) -> Result<()> {
        tracing::info!(path = %self.pool_path.display(), "kqueue watcher started");

        // SIGUSR1's default disposition terminates the process; since kqueue
        // delivers it to us as an event rather than invoking a handler, the
        // default disposition must be turned off first.
        unsafe {
            libc::signal(libc::SIGUSR1, libc::SIG_IGN);
        }

        std::thread::scope(|scope| {
            let poller = scope.spawn(|| self.run_directory_poller());
            let tailer = scope.spawn(|| self.run_content_tailer());

            tailer.join().expect("content tailer thread panicked")?;
            poller.join().expect("directory poller thread panicked")?;
            Ok(())
        })
    }
}
