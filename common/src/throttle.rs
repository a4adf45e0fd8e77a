//! Limits on how hard a run hits the filesystem.
//!
//! Two independent knobs:
//!
//! 1. **Open files** - caps the number of copy tasks alive at once. Every task holds a permit for
//!    its whole lifetime (source and temporary destination file are open together), and the
//!    orchestrator takes the permit *before* spawning, so a full pool also slows down the walk.
//! 2. **Operations per second** - a token bucket refilled by a background task; one token is
//!    consumed per file before it is launched.
//!
//! A value of `0` disables either knob.

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct Throttle {
    open_files: Option<std::sync::Arc<tokio::sync::Semaphore>>,
    max_open_files: usize,
    ops: Option<std::sync::Arc<tokio::sync::Semaphore>>,
    ops_per_sec: usize,
}

/// Permit held by a copy task; dropping it frees the slot.
#[derive(Debug)]
pub struct OpenFilePermit {
    _permit: Option<tokio::sync::OwnedSemaphorePermit>,
}

impl Throttle {
    #[must_use]
    pub fn new(max_open_files: usize, ops_per_sec: usize) -> Self {
        let max_open_files = max_open_files.min(tokio::sync::Semaphore::MAX_PERMITS);
        let ops_per_sec = ops_per_sec.min(tokio::sync::Semaphore::MAX_PERMITS);
        let semaphore = |permits: usize| {
            (permits > 0).then(|| std::sync::Arc::new(tokio::sync::Semaphore::new(permits)))
        };
        Self {
            open_files: semaphore(max_open_files),
            max_open_files,
            ops: semaphore(ops_per_sec),
            ops_per_sec,
        }
    }

    #[must_use]
    pub fn unlimited() -> Self {
        Self::new(0, 0)
    }

    #[must_use]
    pub fn max_open_files(&self) -> Option<usize> {
        self.open_files.as_ref().map(|_| self.max_open_files)
    }

    pub async fn open_file_permit(&self) -> OpenFilePermit {
        let permit = match &self.open_files {
            // the semaphore is never closed
            Some(sem) => sem.clone().acquire_owned().await.ok(),
            None => None,
        };
        OpenFilePermit { _permit: permit }
    }

    pub async fn get_ops_token(&self) {
        if let Some(sem) = &self.ops
            && let Ok(permit) = sem.acquire().await
        {
            permit.forget();
        }
    }

    /// Refill the ops bucket to `ops_per_sec` tokens every second. Returns immediately when the
    /// ops throttle is disabled.
    pub async fn run_replenish_thread(self) {
        let Some(sem) = self.ops else {
            return;
        };
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(1));
        interval.tick().await;
        loop {
            interval.tick().await;
            let curr_permits = sem.available_permits();
            if curr_permits < self.ops_per_sec {
                sem.add_permits(self.ops_per_sec - curr_permits);
            }
        }
    }
}

/// 80% of the soft `RLIMIT_NOFILE`, the default cap on concurrently open files.
pub fn default_max_open_files() -> anyhow::Result<usize> {
    let (soft, _hard) = nix::sys::resource::getrlimit(nix::sys::resource::Resource::RLIMIT_NOFILE)
        .context("failed reading the open files limit")?;
    let limit = usize::try_from(soft).unwrap_or(usize::MAX);
    // each copy task keeps two files open
    Ok(std::cmp::max(1, limit / 10 * 8 / 2))
}
