use anyhow::Context;
use std::os::unix::fs::MetadataExt;
use std::os::unix::prelude::PermissionsExt;
use tracing::instrument;

/// Which source attributes are carried over to the copied file.
#[derive(Copy, Clone, Debug)]
pub struct Settings {
    pub uid: bool,
    pub gid: bool,
    pub time: bool,
    pub mode_mask: u32,
}

impl Default for Settings {
    fn default() -> Self {
        preserve_default()
    }
}

/// Everything: owner, group, timestamps and the full mode including setuid, setgid and sticky.
#[must_use]
pub fn preserve_all() -> Settings {
    Settings {
        uid: true,
        gid: true,
        time: true,
        mode_mask: 0o7777,
    }
}

/// Timestamps and permission bits; special bits are dropped to mimic `cp`.
#[must_use]
pub fn preserve_default() -> Settings {
    Settings {
        uid: false,
        gid: false,
        time: true,
        mode_mask: 0o0777,
    }
}

#[instrument]
pub async fn set_file_metadata(
    settings: &Settings,
    metadata: &std::fs::Metadata,
    path: &std::path::Path,
) -> anyhow::Result<()> {
    let permissions =
        std::fs::Permissions::from_mode(metadata.permissions().mode() & settings.mode_mask);
    tokio::fs::set_permissions(path, permissions.clone())
        .await
        .with_context(|| format!("cannot set {path:?} permissions to {permissions:?}"))?;
    if !(settings.time || settings.uid || settings.gid) {
        return Ok(());
    }
    let settings = *settings;
    let dst = path.to_owned();
    let metadata = metadata.clone();
    tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
        // set timestamps first - those are unlikely to fail
        if settings.time {
            tracing::debug!("setting timestamps");
            let atime = filetime::FileTime::from_last_access_time(&metadata);
            let mtime = filetime::FileTime::from_last_modification_time(&metadata);
            filetime::set_file_times(&dst, atime, mtime)
                .with_context(|| format!("failed setting timestamps for {dst:?}"))?;
        }
        if settings.uid || settings.gid {
            tracing::debug!("setting uid and gid");
            let uid = settings
                .uid
                .then(|| nix::unistd::Uid::from_raw(metadata.uid()));
            let gid = settings
                .gid
                .then(|| nix::unistd::Gid::from_raw(metadata.gid()));
            nix::unistd::chown(&dst, uid, gid).with_context(|| {
                format!("cannot set {dst:?} owner to {uid:?} and/or group id to {gid:?}")
            })?;
        }
        Ok(())
    })
    .await?
}
