//! Two OS-event-driven backends for watching the pool directory, selected at
//! compile time by target OS. Neither backend shares code beyond the offset
//! store and [`crate::engine::FileEntry`]; they are expressed as two
//! implementors of a single capability rather than an inheritance chain.

#[cfg(target_os = "linux")]
pub mod linux;
#[cfg(not(target_os = "linux"))]
pub mod kqueue;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;

/// Shared shutdown flag: `SIGTERM` sets it, both backends poll it.
#[derive(Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Runs the pool-watching loop until `shutdown` is set.
pub trait Watcher {
    fn run(self) -> Result<()>;
}

#[cfg(target_os = "linux")]
pub use linux::LinuxWatcher as PlatformWatcher;
#[cfg(not(target_os = "linux"))]
pub use kqueue::KqueueWatcher as PlatformWatcher;
