//! Streaming enumeration of the regular files under a directory tree.
//!
//! The traversal runs in its own task and hands paths over a bounded channel, so consumers start
//! working on the first files while the rest of the tree is still being read, and a slow consumer
//! holds the traversal back instead of letting paths pile up in memory.

use std::os::unix::fs::MetadataExt;
use tracing::{Instrument, instrument};

/// Number of discovered paths buffered between the traversal and its consumer.
pub const DEFAULT_CAPACITY: usize = 1024;

type DirId = (u64, u64);

fn dir_id_of(metadata: &std::fs::Metadata) -> DirId {
    (metadata.dev(), metadata.ino())
}

/// Directories the traversal never enters, identified by device and inode.
///
/// The set may grow while a walk is running. A directory added before any file is written into
/// it is guaranteed not to contribute such files to the walk.
#[derive(Debug, Default)]
pub struct Exclusions {
    ids: std::sync::Mutex<std::collections::HashSet<DirId>>,
}

impl Exclusions {
    fn lock(&self) -> std::sync::MutexGuard<'_, std::collections::HashSet<DirId>> {
        // a set of plain ids cannot be left inconsistent
        self.ids
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn insert(&self, metadata: &std::fs::Metadata) {
        self.lock().insert(dir_id_of(metadata));
    }

    /// Exclude the directory at `path`.
    pub async fn insert_path(&self, path: &std::path::Path) -> std::io::Result<()> {
        let metadata = tokio::fs::metadata(path).await?;
        self.insert(&metadata);
        Ok(())
    }

    #[must_use]
    pub fn contains(&self, metadata: &std::fs::Metadata) -> bool {
        self.lock().contains(&dir_id_of(metadata))
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    /// Directory whose subtree is never entered, matched by device and inode.
    pub exclude: Option<std::path::PathBuf>,
    /// Shared set of further directories to skip, may be extended during the walk.
    pub exclusions: std::sync::Arc<Exclusions>,
    pub capacity: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            exclude: None,
            exclusions: Default::default(),
            capacity: DEFAULT_CAPACITY,
        }
    }
}

/// One-shot stream of file paths produced by [`walk`].
#[derive(Debug)]
pub struct Walk {
    files: async_channel::Receiver<std::path::PathBuf>,
    task: tokio::task::JoinHandle<u64>,
}

impl Walk {
    /// Next discovered file, `None` once the traversal has finished.
    pub async fn next(&self) -> Option<std::path::PathBuf> {
        self.files.recv().await.ok()
    }

    /// Stop consuming and wait for the traversal task; returns the number of directories or
    /// entries that could not be read.
    pub async fn finish(self) -> u64 {
        self.files.close();
        match self.task.await {
            Ok(errors) => errors,
            Err(error) => {
                tracing::error!("directory traversal task failed: {}", error);
                1
            }
        }
    }
}

/// Start walking `root`; yields regular files (and symlinks resolving to regular files) found at
/// any depth. Directories reached through symlinks are not entered. Unordered.
pub fn walk(
    root: &std::path::Path,
    settings: &Settings,
    cancel: tokio_util::sync::CancellationToken,
) -> Walk {
    let (send, files) = async_channel::bounded(std::cmp::max(1, settings.capacity));
    let task = tokio::spawn(
        traverse(
            root.to_path_buf(),
            settings.exclude.clone(),
            settings.exclusions.clone(),
            send,
            cancel,
        )
        .in_current_span(),
    );
    Walk { files, task }
}

async fn is_regular_file(entry: &tokio::fs::DirEntry) -> std::io::Result<bool> {
    let file_type = entry.file_type().await?;
    if file_type.is_symlink() {
        // dangling links are skipped silently
        return Ok(tokio::fs::metadata(entry.path())
            .await
            .is_ok_and(|metadata| metadata.is_file()));
    }
    Ok(file_type.is_file())
}

#[instrument(skip(exclusions, send, cancel))]
async fn traverse(
    root: std::path::PathBuf,
    exclude: Option<std::path::PathBuf>,
    exclusions: std::sync::Arc<Exclusions>,
    send: async_channel::Sender<std::path::PathBuf>,
    cancel: tokio_util::sync::CancellationToken,
) -> u64 {
    if let Some(path) = &exclude {
        match (
            tokio::fs::metadata(path).await,
            tokio::fs::metadata(&root).await,
        ) {
            (Ok(excluded), Ok(root_metadata))
                if dir_id_of(&excluded) == dir_id_of(&root_metadata) =>
            {
                // the root itself is walked, only directories added to `exclusions` are skipped
                tracing::debug!("excluded path {:?} is the walk root", path);
            }
            (Ok(excluded), _) => exclusions.insert(&excluded),
            (Err(error), _) => {
                tracing::debug!("cannot read metadata of excluded path {:?}: {}", path, error);
            }
        }
    }
    let mut errors = 0;
    let mut pending = vec![root];
    while let Some(dir) = pending.pop() {
        if cancel.is_cancelled() {
            tracing::debug!("traversal cancelled");
            break;
        }
        // unreadable directories are reported by read_dir below
        let dir_metadata = tokio::fs::metadata(&dir).await.ok();
        let is_excluded =
            || dir_metadata.as_ref().is_some_and(|metadata| exclusions.contains(metadata));
        if is_excluded() {
            tracing::debug!("skipping excluded directory {:?}", &dir);
            continue;
        }
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(error) => {
                tracing::error!("cannot open directory {:?} for reading: {}", &dir, error);
                errors += 1;
                continue;
            }
        };
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(error) => {
                    tracing::error!("failed traversing directory {:?}: {}", &dir, error);
                    errors += 1;
                    break;
                }
            };
            let path = entry.path();
            let file_type = match entry.file_type().await {
                Ok(file_type) => file_type,
                Err(error) => {
                    tracing::error!("failed reading file type of {:?}: {}", &path, error);
                    errors += 1;
                    continue;
                }
            };
            if file_type.is_dir() {
                if let Ok(metadata) = entry.metadata().await
                    && exclusions.contains(&metadata)
                {
                    tracing::debug!("skipping excluded directory {:?}", &path);
                    continue;
                }
                pending.push(path);
                continue;
            }
            match is_regular_file(&entry).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::trace!("skipping non-regular entry {:?}", &path);
                    continue;
                }
                Err(error) => {
                    tracing::error!("failed reading file type of {:?}: {}", &path, error);
                    errors += 1;
                    continue;
                }
            }
            // a destination created after the directory was opened, its new files are not ours
            if is_excluded() {
                tracing::debug!("directory {:?} became excluded, leaving it", &dir);
                break;
            }
            if cancel.is_cancelled() {
                tracing::debug!("traversal cancelled");
                return errors;
            }
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    tracing::debug!("traversal cancelled");
                    return errors;
                }
                res = send.send(path) => {
                    if res.is_err() {
                        tracing::debug!("consumer gone, stopping traversal");
                        return errors;
                    }
                }
            }
        }
        // ReadDir keeps a file descriptor open
        drop(entries);
    }
    errors
}
