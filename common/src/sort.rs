//! The sort pipeline: walk the source tree and copy every file into `output/<bucket>/<name>`.
//!
//! Each discovered file gets its own task running classify → resolve → copy. Failures stay local
//! to the file that caused them: they are logged, counted and never cancel sibling tasks. Only a
//! missing or unusable source (or output) root ends the run before any file is touched.

use tracing::{Instrument, instrument};

use crate::bucket;
use crate::copy::{self, CopyOutcome};
use crate::destination;
use crate::preserve;
use crate::throttle::Throttle;
use crate::walk;

#[derive(Debug, Copy, Clone, Default)]
pub struct Settings {
    pub preserve: preserve::Settings,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub files_found: usize,
    pub files_copied: usize,
    pub files_failed: usize,
    pub bytes_copied: u64,
    pub directories_created: usize,
    pub directories_unchanged: usize,
    pub walk_errors: usize,
}

impl Summary {
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.files_failed > 0 || self.walk_errors > 0
    }
}

impl std::ops::Add for Summary {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self {
            files_found: self.files_found + other.files_found,
            files_copied: self.files_copied + other.files_copied,
            files_failed: self.files_failed + other.files_failed,
            bytes_copied: self.bytes_copied + other.bytes_copied,
            directories_created: self.directories_created + other.directories_created,
            directories_unchanged: self.directories_unchanged + other.directories_unchanged,
            walk_errors: self.walk_errors + other.walk_errors,
        }
    }
}

impl From<&CopyOutcome> for Summary {
    fn from(outcome: &CopyOutcome) -> Self {
        match outcome {
            CopyOutcome::Copied { bytes, .. } => Summary {
                files_found: 1,
                files_copied: 1,
                bytes_copied: *bytes,
                ..Default::default()
            },
            CopyOutcome::Failed { .. } => Summary {
                files_found: 1,
                files_failed: 1,
                ..Default::default()
            },
        }
    }
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "files found: {}\n\
            files copied: {}\n\
            files failed: {}\n\
            bytes copied: {}\n\
            directories created: {}\n\
            directories unchanged: {}\n\
            walk errors: {}",
            self.files_found,
            self.files_copied,
            self.files_failed,
            bytesize::ByteSize(self.bytes_copied),
            self.directories_created,
            self.directories_unchanged,
            self.walk_errors,
        )
    }
}

/// Reasons a run did not complete cleanly.
///
/// The first four end the run before anything is copied; `Incomplete` and `Cancelled` carry the
/// summary of what was done.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("source directory {0:?} does not exist")]
    SourceNotFound(std::path::PathBuf),
    #[error("source {0:?} is not a directory")]
    SourceNotDirectory(std::path::PathBuf),
    #[error("cannot access source directory {path:?}: {source:#}")]
    SourceUnreadable {
        path: std::path::PathBuf,
        #[source]
        source: anyhow::Error,
    },
    #[error("cannot create output directory {path:?}: {source:#}")]
    OutputCreateFailed {
        path: std::path::PathBuf,
        #[source]
        source: anyhow::Error,
    },
    #[error(
        "failed sorting {} of {} files ({} unreadable directories or entries)",
        .summary.files_failed,
        .summary.files_found,
        .summary.walk_errors
    )]
    Incomplete { summary: Summary },
    #[error("interrupted after sorting {} files", .summary.files_copied)]
    Cancelled { summary: Summary },
}

impl Error {
    #[must_use]
    pub fn summary(&self) -> Summary {
        match self {
            Error::Incomplete { summary } | Error::Cancelled { summary } => *summary,
            _ => Summary::default(),
        }
    }
}

/// classify → resolve → copy for one file. Never fails: errors become a logged
/// [`CopyOutcome::Failed`].
#[instrument(skip(resolver, settings))]
pub async fn sort_file(
    src: &std::path::Path,
    resolver: &destination::Resolver,
    settings: &Settings,
) -> CopyOutcome {
    let prog_track = crate::get_progress();
    let _ops_guard = prog_track.ops.guard();
    let bucket = bucket::classify(src);
    let result = match resolver.resolve(&bucket).await {
        Ok(target) => copy::copy_file(src, &target.path, &settings.preserve).await,
        Err(source) => Err(copy::Error::DirectoryCreateFailed { bucket, source }),
    };
    match result {
        Ok((dst, bytes)) => {
            tracing::info!("copied {:?} to {:?}", src, &dst);
            prog_track.files_copied.inc();
            prog_track.bytes_copied.add(bytes);
            CopyOutcome::Copied {
                src: src.to_path_buf(),
                dst,
                bytes,
            }
        }
        Err(error) => {
            tracing::error!("error copying file {:?}: {}", src, &error);
            prog_track.files_failed.inc();
            CopyOutcome::Failed {
                src: src.to_path_buf(),
                error,
            }
        }
    }
}

fn outcome_summary(res: Result<CopyOutcome, tokio::task::JoinError>) -> Summary {
    match res {
        Ok(outcome) => Summary::from(&outcome),
        Err(error) => {
            tracing::error!("copy task failed: {}", error);
            crate::get_progress().files_failed.inc();
            Summary {
                files_found: 1,
                files_failed: 1,
                ..Default::default()
            }
        }
    }
}

async fn check_source(src: &std::path::Path) -> Result<(), Error> {
    match tokio::fs::metadata(src).await {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(Error::SourceNotDirectory(src.to_path_buf())),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            Err(Error::SourceNotFound(src.to_path_buf()))
        }
        Err(error) => Err(Error::SourceUnreadable {
            path: src.to_path_buf(),
            source: anyhow::Error::from(error)
                .context(format!("failed reading metadata from {src:?}")),
        }),
    }
}

/// Copy every regular file under `src` into `output/<bucket>/<file name>`.
///
/// The output directory is created first, before the source is validated, so it exists even when
/// the run ends with [`Error::SourceNotFound`]. Copy tasks are launched while the walk is still in
/// progress; `throttle` bounds how many are alive at once. Cancelling `cancel` stops the walk and
/// the launching of new tasks, lets in-flight tasks finish, and returns [`Error::Cancelled`].
/// Bucket directories are never walked, even when `output` lies inside `src` or is `src` itself.
#[instrument(skip(settings, throttle, cancel))]
pub async fn sort(
    src: &std::path::Path,
    output: &std::path::Path,
    settings: &Settings,
    throttle: &Throttle,
    cancel: tokio_util::sync::CancellationToken,
) -> Result<Summary, Error> {
    let prog_track = crate::get_progress();
    destination::ensure_dir(output)
        .await
        .map_err(|source| Error::OutputCreateFailed {
            path: output.to_path_buf(),
            source,
        })?;
    check_source(src).await?;
    tracing::info!("sorting files from {:?} into {:?}", src, output);
    let exclusions = std::sync::Arc::new(walk::Exclusions::default());
    let walk = walk::walk(
        src,
        &walk::Settings {
            exclude: Some(output.to_path_buf()),
            exclusions: exclusions.clone(),
            ..Default::default()
        },
        cancel.clone(),
    );
    let resolver =
        std::sync::Arc::new(destination::Resolver::new(output).with_exclusions(exclusions));
    let mut join_set = tokio::task::JoinSet::new();
    let mut summary = Summary::default();
    loop {
        let path = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            path = walk.next() => match path {
                Some(path) => path,
                None => break,
            },
        };
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = throttle.get_ops_token() => {}
        }
        let permit = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            permit = throttle.open_file_permit() => permit,
        };
        prog_track.files_found.inc();
        while let Some(res) = join_set.try_join_next() {
            summary = summary + outcome_summary(res);
        }
        let resolver = resolver.clone();
        let settings = *settings;
        let do_sort = || async move {
            let _permit = permit;
            sort_file(&path, &resolver, &settings).await
        };
        join_set.spawn(do_sort().in_current_span());
    }
    while let Some(res) = join_set.join_next().await {
        summary = summary + outcome_summary(res);
    }
    let walk_errors = walk.finish().await;
    summary.walk_errors = usize::try_from(walk_errors).unwrap_or(usize::MAX);
    summary.directories_created = resolver.directories_created();
    summary.directories_unchanged = resolver.directories_unchanged();
    if cancel.is_cancelled() {
        tracing::warn!("sorting interrupted, {} files copied", summary.files_copied);
        return Err(Error::Cancelled { summary });
    }
    if summary.files_found == 0 && summary.walk_errors == 0 {
        tracing::warn!("no files found in the source folder: {:?}", src);
    }
    if summary.has_failures() {
        return Err(Error::Incomplete { summary });
    }
    tracing::info!(
        "sorted {} files ({}) into {} buckets",
        summary.files_copied,
        bytesize::ByteSize(summary.bytes_copied),
        summary.directories_created + summary.directories_unchanged
    );
    Ok(summary)
}

/// Convenience wrapper resolving relative paths against the current directory first, so log lines
/// and the excluded output subtree refer to stable paths.
pub async fn sort_paths(
    src: &std::path::Path,
    output: &std::path::Path,
    settings: &Settings,
    throttle: &Throttle,
    cancel: tokio_util::sync::CancellationToken,
) -> Result<Summary, Error> {
    let src = std::path::absolute(src).map_err(|error| Error::SourceUnreadable {
        path: src.to_path_buf(),
        source: anyhow::Error::from(error).context(format!("cannot resolve path {src:?}")),
    })?;
    let output = std::path::absolute(output).map_err(|error| Error::OutputCreateFailed {
        path: output.to_path_buf(),
        source: anyhow::Error::from(error).context(format!("cannot resolve path {output:?}")),
    })?;
    sort(&src, &output, settings, throttle, cancel).await
}
