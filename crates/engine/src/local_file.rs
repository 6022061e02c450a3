//! Local-filesystem helpers for the transfer pipeline: size probing,
//! parent-directory creation with notifications, and positioned opens.

use crate::notification::Notification;
use crate::services::Services;
use chrono::{DateTime, NaiveDateTime, Utc};
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom};
use std::path::Path;

/// Size of a local file, `-1` when it does not exist.
pub(crate) fn local_size(path: &Path) -> i64 {
    std::fs::metadata(path)
        .ok()
        .filter(std::fs::Metadata::is_file)
        .and_then(|meta| i64::try_from(meta.len()).ok())
        .unwrap_or(-1)
}

/// Modification time of a local file as a naive UTC stamp.
pub(crate) fn local_mtime(path: &Path) -> Option<NaiveDateTime> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    Some(DateTime::<Utc>::from(modified).naive_utc())
}

/// Creates every missing ancestor of `path`, emitting a
/// `LocalDirCreated` notification per created segment.
pub(crate) fn create_parent_dirs(services: &Services, path: &Path) -> std::io::Result<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() || parent.exists() {
        return Ok(());
    }

    let mut missing = Vec::new();
    let mut probe = parent.to_path_buf();
    while !probe.exists() {
        missing.push(probe.clone());
        if !probe.pop() || probe.as_os_str().is_empty() {
            break;
        }
    }
    for dir in missing.into_iter().rev() {
        std::fs::create_dir(&dir)?;
        services.notify(Notification::LocalDirCreated(dir));
    }
    Ok(())
}

/// Opens the local target of a download, truncating or seeking to the
/// end depending on the resume decision.
pub(crate) fn open_download_target(
    services: &Services,
    path: &Path,
    resume: bool,
) -> std::io::Result<(File, u64)> {
    create_parent_dirs(services, path)?;
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(!resume)
        .open(path)?;
    let offset = if resume {
        file.seek(SeekFrom::End(0))?
    } else {
        0
    };
    Ok((file, offset))
}

/// Opens the local source of an upload positioned at `offset`.
pub(crate) fn open_upload_source(path: &Path, offset: u64) -> std::io::Result<File> {
    let mut file = File::open(path)?;
    if offset > 0 {
        file.seek(SeekFrom::Start(offset))?;
    }
    Ok(file)
}

/// Applies a remote mtime to the finished download.
pub(crate) fn set_local_mtime(path: &Path, mtime: NaiveDateTime) {
    let system_time = DateTime::<Utc>::from_naive_utc_and_offset(mtime, Utc).into();
    if let Ok(file) = File::options().write(true).open(path) {
        let _ = file.set_modified(system_time);
    }
}
