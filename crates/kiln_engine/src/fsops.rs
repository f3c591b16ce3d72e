//! Filesystem helpers for artifact placement and change detection.

use std::fs::{self, File};
use std::io;
use std::path::Path;
use std::time::SystemTime;

/// Returns a file's modification time, or `None` if it cannot be read.
pub fn modified_time(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Returns `true` when `path` is strictly newer than `reference`.
///
/// Either side being unreadable counts as newer: the caller cannot
/// prove the reference is current, so it must redo the work.
pub fn newer_than(path: &Path, reference: &Path) -> bool {
    let Some(reference_time) = modified_time(reference) else {
        return true;
    };
    match modified_time(path) {
        Some(time) => time > reference_time,
        None => true,
    }
}

/// Removes a directory tree, treating a missing tree as success.
pub fn remove_tree(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Removes a file, treating a missing file as success.
pub fn remove_file_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Concatenates `inputs` in order into `output`, replacing any previous
/// contents.
pub fn concat_files(inputs: &[&Path], output: &Path) -> io::Result<()> {
    let mut out = File::create(output)?;
    for input in inputs {
        let mut file = File::open(input)?;
        io::copy(&mut file, &mut out)?;
    }
    Ok(())
}
