//! Creation of the per-bucket directories under the output root.
//!
//! Many files sharing a bucket reach the resolver at the same time. Each bucket gets a one-time
//! initialisation guard, so the directory is created by exactly one task while the others wait
//! for it. Independently of the guard, an already existing directory is treated as success, which
//! also covers directories left behind by an earlier run.

use anyhow::{Context, anyhow};
use tracing::instrument;

use crate::bucket::Bucket;

/// Whether [`Resolver::resolve`] had to create the target directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirState {
    Created,
    Existing,
}

#[derive(Debug, Clone)]
pub struct TargetDirectory {
    pub path: std::path::PathBuf,
    pub state: DirState,
}

type Guard = std::sync::Arc<tokio::sync::OnceCell<std::path::PathBuf>>;

/// Resolves buckets to directories under a fixed output root.
#[derive(Debug)]
pub struct Resolver {
    output_root: std::path::PathBuf,
    guards: std::sync::Mutex<std::collections::HashMap<Bucket, Guard>>,
    created: std::sync::atomic::AtomicUsize,
    existing: std::sync::atomic::AtomicUsize,
    exclusions: Option<std::sync::Arc<crate::walk::Exclusions>>,
}

impl Resolver {
    pub fn new(output_root: &std::path::Path) -> Self {
        Self {
            output_root: output_root.to_path_buf(),
            guards: Default::default(),
            created: Default::default(),
            existing: Default::default(),
            exclusions: None,
        }
    }

    /// Register every resolved directory in `exclusions` before it is handed out, so a walk
    /// sharing the set never descends into destinations.
    #[must_use]
    pub fn with_exclusions(
        mut self,
        exclusions: std::sync::Arc<crate::walk::Exclusions>,
    ) -> Self {
        self.exclusions = Some(exclusions);
        self
    }

    /// Number of bucket directories this resolver created.
    pub fn directories_created(&self) -> usize {
        self.created.load(std::sync::atomic::Ordering::Relaxed)
    }

    /// Number of bucket directories that were already present.
    pub fn directories_unchanged(&self) -> usize {
        self.existing.load(std::sync::atomic::Ordering::Relaxed)
    }

    #[must_use]
    pub fn output_root(&self) -> &std::path::Path {
        &self.output_root
    }

    fn guard(&self, bucket: &Bucket) -> Guard {
        // a poisoned map still holds valid guards, nothing is left half-updated
        let mut guards = self
            .guards
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        guards.entry(bucket.clone()).or_default().clone()
    }

    /// Return `output_root/bucket`, creating it if needed.
    ///
    /// Only the call that actually performs the creation reports [`DirState::Created`]; every
    /// other caller for the same bucket gets [`DirState::Existing`]. A failed creation leaves the
    /// guard unset so the next file in that bucket tries again.
    #[instrument(skip(self))]
    pub async fn resolve(&self, bucket: &Bucket) -> anyhow::Result<TargetDirectory> {
        let guard = self.guard(bucket);
        let mut state = DirState::Existing;
        let state_ref = &mut state;
        let path = guard
            .get_or_try_init(|| async move {
                let path = self.output_root.join(bucket);
                *state_ref = ensure_dir(&path).await?;
                if let Some(exclusions) = &self.exclusions {
                    exclusions
                        .insert_path(&path)
                        .await
                        .with_context(|| format!("failed reading metadata from {path:?}"))?;
                }
                let counter = match *state_ref {
                    DirState::Created => {
                        crate::get_progress().directories_created.inc();
                        &self.created
                    }
                    DirState::Existing => &self.existing,
                };
                counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                Ok::<_, anyhow::Error>(path)
            })
            .await?
            .clone();
        Ok(TargetDirectory { path, state })
    }
}

/// Create `path` and any missing parents; an existing directory is not an error.
#[instrument]
pub async fn ensure_dir(path: &std::path::Path) -> anyhow::Result<DirState> {
    match tokio::fs::create_dir(path).await {
        Ok(()) => {
            tracing::debug!("created directory");
            Ok(DirState::Created)
        }
        Err(error) if error.kind() == std::io::ErrorKind::AlreadyExists => {
            let metadata = tokio::fs::metadata(path)
                .await
                .with_context(|| format!("failed reading metadata from {path:?}"))?;
            if metadata.is_dir() {
                tracing::debug!("directory already exists");
                Ok(DirState::Existing)
            } else {
                Err(anyhow!("{path:?} exists and is not a directory"))
            }
        }
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            // missing parents, create_dir_all tolerates concurrent creators of the same chain
            tokio::fs::create_dir_all(path)
                .await
                .with_context(|| format!("cannot create directory {path:?}"))?;
            Ok(DirState::Created)
        }
        Err(error) => Err(error).with_context(|| format!("cannot create directory {path:?}")),
    }
}
