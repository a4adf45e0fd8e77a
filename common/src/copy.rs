use anyhow::Context;
use tracing::instrument;

use crate::bucket::Bucket;
use crate::preserve;

/// Failure of a single file's classify-resolve-copy pipeline.
///
/// # Logging Convention
/// The Display implementation shows the full error chain, so it can be logged with `{}`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cannot create directory for bucket '{bucket}': {source:#}")]
    DirectoryCreateFailed {
        bucket: Bucket,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed copying {src:?} to {dst:?}: {source:#}")]
    CopyFailed {
        src: std::path::PathBuf,
        dst: std::path::PathBuf,
        #[source]
        source: anyhow::Error,
    },
}

/// Result of sorting one source file.
#[derive(Debug)]
pub enum CopyOutcome {
    Copied {
        src: std::path::PathBuf,
        dst: std::path::PathBuf,
        bytes: u64,
    },
    Failed {
        src: std::path::PathBuf,
        error: Error,
    },
}

impl CopyOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, CopyOutcome::Copied { .. })
    }
}

static TMP_COUNTER: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);

/// Hidden, unique sibling of `dst` used while the data is being written.
fn temporary_path(dst: &std::path::Path) -> std::path::PathBuf {
    let n = TMP_COUNTER.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    let name = dst
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    dst.with_file_name(format!(".{name}.rsort-{}-{n}.tmp", std::process::id()))
}

/// Copy `src` into `target_dir`, keeping its file name.
///
/// Data goes to a temporary file in `target_dir` which is renamed over the final name once the
/// content and metadata are in place, so readers never see a partially written file. An existing
/// file with the same name is replaced; when two sources race for one name the last rename wins.
#[instrument(skip(preserve))]
pub async fn copy_file(
    src: &std::path::Path,
    target_dir: &std::path::Path,
    preserve: &preserve::Settings,
) -> Result<(std::path::PathBuf, u64), Error> {
    let name = src.file_name().ok_or_else(|| Error::CopyFailed {
        src: src.to_path_buf(),
        dst: target_dir.to_path_buf(),
        source: anyhow::anyhow!("source has no file name"),
    })?;
    let dst = target_dir.join(name);
    let tmp = temporary_path(&dst);
    match write_and_rename(src, &tmp, &dst, preserve).await {
        Ok(bytes) => Ok((dst, bytes)),
        Err(source) => {
            if let Err(error) = tokio::fs::remove_file(&tmp).await
                && error.kind() != std::io::ErrorKind::NotFound
            {
                tracing::warn!("failed removing temporary file {:?}: {}", &tmp, error);
            }
            Err(Error::CopyFailed {
                src: src.to_path_buf(),
                dst,
                source,
            })
        }
    }
}

async fn write_and_rename(
    src: &std::path::Path,
    tmp: &std::path::Path,
    dst: &std::path::Path,
    preserve: &preserve::Settings,
) -> anyhow::Result<u64> {
    // follows symlinks, a link to a regular file is copied as that file
    let src_metadata = tokio::fs::metadata(src)
        .await
        .with_context(|| format!("failed reading metadata from {src:?}"))?;
    tracing::debug!("copying data");
    let bytes = tokio::fs::copy(src, tmp)
        .await
        .with_context(|| format!("failed copying data into {tmp:?}"))?;
    tracing::debug!("setting metadata");
    preserve::set_file_metadata(preserve, &src_metadata, tmp).await?;
    tokio::fs::rename(tmp, dst)
        .await
        .with_context(|| format!("failed renaming {tmp:?} to {dst:?}"))?;
    Ok(bytes)
}
