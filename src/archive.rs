use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{BisectError, Result};

const LOG_PREFIX: &str = "BOUT.log.";
const DUMP_PREFIX: &str = "BOUT.dmp.";

/// Copy the log files (and optionally dump files) in `data_dir` into
/// `destination`, creating it if needed. Returns the copied files.
///
/// Existing files in `destination` are overwritten.
pub fn backup_log_files(
    data_dir: &Path,
    destination: &Path,
    include_dump_files: bool,
) -> Result<Vec<PathBuf>> {
    let archive_err = |source| BisectError::Archive {
        path: destination.to_path_buf(),
        source,
    };

    fs::create_dir_all(destination).map_err(archive_err)?;

    let mut copied = Vec::new();
    let entries = match fs::read_dir(data_dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(dir = %data_dir.display(), error = %e, "no log directory to archive");
            return Ok(copied);
        }
    };

    for entry in entries {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue,
        };

        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let name = entry.file_name();
        let name = name.to_string_lossy();
        let wanted =
            name.starts_with(LOG_PREFIX) || (include_dump_files && name.starts_with(DUMP_PREFIX));
        if !wanted {
            continue;
        }

        let target = destination.join(&*name);
        fs::copy(&path, &target).map_err(archive_err)?;
        copied.push(target);
    }

    copied.sort();
    tracing::debug!(
        from = %data_dir.display(),
        to = %destination.display(),
        files = copied.len(),
        "archived logs"
    );
    Ok(copied)
}
