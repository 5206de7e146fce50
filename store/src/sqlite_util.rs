//! Shared SQLite and secure-filesystem helpers for the ledger database.
//!
//! This module is the single authority for:
//! - Secure directory creation and Unix permission tightening
//! - Secure SQLite database file creation with permission hardening
//! - SQLite WAL/SHM sidecar path computation
//! - Timestamp encoding (UTC milliseconds since the epoch)

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::error::StoreError;

fn open_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Open {
        path: path.to_path_buf(),
        source,
    }
}

/// Open a SQLite database at `path` with secure directory and file permissions.
///
/// 1. Creates the parent directory if it doesn't exist
/// 2. Tightens directory permissions (Unix: 0o700, owner-only)
/// 3. Creates the DB file with secure permissions (Unix: 0o600)
/// 4. Opens the SQLite connection
pub(crate) fn open_secure_db(path: &Path) -> Result<Connection, StoreError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        ensure_secure_dir(parent)?;
    }
    ensure_secure_db_files(path)?;

    Ok(Connection::open(path)?)
}

/// Ensure a directory exists with secure permissions.
///
/// On Unix, tightens permissions to 0o700 if the directory is owned by the
/// current user.
pub(crate) fn ensure_secure_dir(path: &Path) -> Result<(), StoreError> {
    fs::create_dir_all(path).map_err(open_error(path))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::{MetadataExt, PermissionsExt};
        let metadata = fs::metadata(path).map_err(open_error(path))?;

        let our_uid = unsafe { libc::getuid() };
        if metadata.uid() != our_uid {
            return Ok(());
        }

        let current_mode = metadata.permissions().mode() & 0o777;
        if current_mode & 0o077 != 0 {
            fs::set_permissions(path, fs::Permissions::from_mode(0o700))
                .map_err(open_error(path))?;
        }
    }
    Ok(())
}

/// Ensure a SQLite database file (and its WAL/SHM sidecars) has secure permissions.
///
/// If the file doesn't exist, it is created with 0o600 on Unix.
pub(crate) fn ensure_secure_db_files(path: &Path) -> Result<(), StoreError> {
    if !path.exists() {
        let mut options = OpenOptions::new();
        options.create(true).truncate(false).read(true).write(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let _file = options.open(path).map_err(open_error(path))?;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(open_error(path))?;
        for suffix in ["-wal", "-shm"] {
            let sidecar = sqlite_sidecar_path(path, suffix);
            if sidecar.exists() {
                let _ = fs::set_permissions(&sidecar, fs::Permissions::from_mode(0o600));
            }
        }
    }
    Ok(())
}

/// Compute the path to a SQLite sidecar file (e.g. `-wal`, `-shm`).
fn sqlite_sidecar_path(path: &Path, suffix: &str) -> PathBuf {
    let file_name = path.file_name().map(|name| name.to_string_lossy());
    match file_name {
        Some(name) => path.with_file_name(format!("{name}{suffix}")),
        None => PathBuf::from(format!("{}{suffix}", path.display())),
    }
}

// ── Timestamps ──────────────────────────────────────────────────────────

pub(crate) fn to_millis(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}

pub(crate) fn from_millis(table: &'static str, millis: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .ok_or_else(|| StoreError::corrupt(table, format!("timestamp {millis} out of range")))
}

pub(crate) fn from_optional_millis(
    table: &'static str,
    millis: Option<i64>,
) -> Result<Option<DateTime<Utc>>, StoreError> {
    millis.map(|ms| from_millis(table, ms)).transpose()
}
