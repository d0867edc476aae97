//! Export-directory enumeration.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Sniffs the first five lines for a DSX block opener. Unreadable files are
/// simply not DSX.
pub fn looks_like_dsx(path: &Path) -> bool {
    let Ok(mut file) = fs::File::open(path) else {
        return false;
    };
    let mut buf = [0u8; 4096];
    let Ok(read) = file.read(&mut buf) else {
        return false;
    };
    let head = String::from_utf8_lossy(&buf[..read]);
    let head: String = head.lines().take(5).collect::<Vec<_>>().join("\n");
    head.contains("BEGIN HEADER") || head.contains("BEGIN DSJOB")
}

/// Enumerates DSX files under `directory` in priority order: a full-project
/// `exportall.dsx` first, then the `jobs/` subdirectory, then remaining
/// `.dsx` and extensionless files, then `.dsx` files one subdirectory down.
/// Files failing the first-lines sniff are skipped silently.
pub fn dsx_files(directory: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    let exportall = directory.join("exportall.dsx");
    if exportall.is_file() {
        files.push(exportall);
    }

    let jobs_dir = directory.join("jobs");
    if jobs_dir.is_dir() {
        files.extend(sorted_dsx_entries(&jobs_dir, false));
    }

    let mut rest = Vec::new();
    let mut subdirs = Vec::new();
    for entry in fs::read_dir(directory)? {
        let path = entry?.path();
        if path.is_dir() {
            if path != jobs_dir {
                subdirs.push(path);
            }
            continue;
        }
        if files.contains(&path) {
            continue;
        }
        let is_dsx_ext = path.extension().is_some_and(|e| e == "dsx");
        let no_ext = path.extension().is_none();
        if is_dsx_ext || no_ext {
            rest.push(path);
        }
    }
    rest.sort();
    files.extend(rest);

    subdirs.sort();
    for subdir in subdirs {
        files.extend(sorted_dsx_entries(&subdir, true));
    }

    files.retain(|path| looks_like_dsx(path));
    Ok(files)
}

fn sorted_dsx_entries(directory: &Path, dsx_extension_only: bool) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(directory) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension().is_some_and(|e| e == "dsx")
                || (!dsx_extension_only && path.extension().is_none())
        })
        .collect();
    files.sort();
    files
}
