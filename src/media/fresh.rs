use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Recursively list regular files under `root` whose modification time is
/// strictly after `cutoff`, sorted lexicographically.
///
/// The external downloaders pick their own output names (title-derived
/// templates, dynamic extensions), so a job recovers its output by asking
/// "what appeared here since I started" rather than guessing filenames. Each
/// job scans only its own scratch directory, so a concurrent job's files can
/// never show up in the listing.
pub fn files_created_after(root: &Path, cutoff: SystemTime) -> Vec<PathBuf> {
    let mut files = Vec::new();
    collect(root, cutoff, &mut files);
    files.sort();
    files
}

fn collect(dir: &Path, cutoff: SystemTime, out: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else {
            continue;
        };

        if file_type.is_dir() {
            collect(&path, cutoff, out);
        } else if file_type.is_file() {
            let modified = entry
                .metadata()
                .and_then(|meta| meta.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            if modified > cutoff {
                out.push(path);
            }
        }
    }
}
