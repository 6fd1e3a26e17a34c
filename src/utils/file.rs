//! Input shard discovery.

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::IngestError;

/// Find every file in `folder` matching `pattern` (e.g. `*.parquet`), in shard order.
///
/// The folder itself is escaped, so only `pattern` is interpreted as a glob.
pub fn discover_input_files(folder: &Path, pattern: &str) -> Result<Vec<PathBuf>, IngestError> {
    let escaped = glob::Pattern::escape(&folder.to_string_lossy());
    let full = Path::new(&escaped).join(pattern);
    let full = full.to_string_lossy();

    let entries =
        glob::glob(&full).map_err(|e| IngestError::InvalidPattern(format!("{full}: {e}")))?;

    let mut files = Vec::new();
    for entry in entries {
        match entry {
            Ok(path) if path.is_file() => files.push(path),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "skipping unreadable input entry"),
        }
    }

    if files.is_empty() {
        return Err(IngestError::NoFilesFound(
            folder.join(pattern).display().to_string(),
        ));
    }

    sort_shards(&mut files);
    Ok(files)
}

/// Order shards by path length, then lexicographically, so `f9` precedes `f10`
/// without requiring zero-padded names.
pub fn sort_shards(files: &mut [PathBuf]) {
    files.sort_by(|a, b| {
        let (a, b) = (a.as_os_str(), b.as_os_str());
        a.len().cmp(&b.len()).then_with(|| a.cmp(b))
    });
}
