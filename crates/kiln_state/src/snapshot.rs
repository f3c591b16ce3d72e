//! Content-hash snapshots of a project's tracked file tree.

use kiln_common::ContentHash;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// A snapshot mapping each tracked file to its content hash.
///
/// Paths are stored relative to the project root so persisted state
/// survives the project directory moving. The map is ordered, so
/// iteration and serialization are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSnapshot {
    files: BTreeMap<PathBuf, ContentHash>,
}

impl FileSnapshot {
    /// Creates an empty snapshot.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Hashes every file under the given directories, relative to
    /// `project_dir`.
    ///
    /// Directories that do not exist are skipped, as are files that cannot
    /// be read and entries whose name starts with a dot. A vanished file
    /// surfaces as removed in the next diff rather than as a scan error.
    pub fn scan(project_dir: &Path, dirs: &[String]) -> Self {
        let mut files = BTreeMap::new();
        for dir in dirs {
            scan_dir(project_dir, &project_dir.join(dir), &mut files);
        }
        Self { files }
    }

    /// Returns the hash of a tracked file.
    pub fn get(&self, path: &Path) -> Option<&ContentHash> {
        self.files.get(path)
    }

    /// Records a file hash directly.
    pub fn insert(&mut self, path: PathBuf, hash: ContentHash) {
        self.files.insert(path, hash);
    }

    /// Iterates over tracked files in path order.
    pub fn files(&self) -> impl Iterator<Item = (&PathBuf, &ContentHash)> {
        self.files.iter()
    }

    /// Returns the tracked paths in order.
    pub fn paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.files.keys()
    }

    /// Returns the number of tracked files.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Returns `true` if no files are tracked.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

fn scan_dir(project_dir: &Path, dir: &Path, files: &mut BTreeMap<PathBuf, ContentHash>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return,
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with('.'))
            .unwrap_or(false);
        if hidden {
            continue;
        }
        if path.is_dir() {
            scan_dir(project_dir, &path, files);
        } else if let Ok(content) = std::fs::read(&path) {
            let relative = path.strip_prefix(project_dir).unwrap_or(&path).to_path_buf();
            files.insert(relative, ContentHash::from_bytes(&content));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn scan_collects_nested_files_relative_to_root() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "src/main.c", "int main() {}");
        write(dir.path(), "src/game/engine.c", "void tick() {}");
        write(dir.path(), "res/icon.png", "not really a png");

        let snapshot = FileSnapshot::scan(
            dir.path(),
            &["src".to_string(), "res".to_string()],
        );
        let paths: Vec<_> = snapshot.paths().cloned().collect();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("res/icon.png"),
                PathBuf::from("src/game/engine.c"),
                PathBuf::from("src/main.c"),
            ]
        );
    }

    #[test]
    fn missing_directory_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "src/main.c", "int main() {}");

        let snapshot = FileSnapshot::scan(
            dir.path(),
            &["src".to_string(), "res".to_string()],
        );
        assert_eq!(snapshot.len(), 1);
    }

    #[test]
    fn dotfiles_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "src/main.c", "int main() {}");
        write(dir.path(), "src/.main.c.swp", "editor junk");

        let snapshot = FileSnapshot::scan(dir.path(), &["src".to_string()]);
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.get(Path::new("src/main.c")).is_some());
    }

    #[test]
    fn content_change_changes_hash() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "src/main.c", "int main() { return 0; }");
        let before = FileSnapshot::scan(dir.path(), &["src".to_string()]);

        write(dir.path(), "src/main.c", "int main() { return 1; }");
        let after = FileSnapshot::scan(dir.path(), &["src".to_string()]);

        assert_ne!(
            before.get(Path::new("src/main.c")),
            after.get(Path::new("src/main.c"))
        );
    }

    #[test]
    fn identical_trees_compare_equal() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "src/main.c", "int main() {}");

        let a = FileSnapshot::scan(dir.path(), &["src".to_string()]);
        let b = FileSnapshot::scan(dir.path(), &["src".to_string()]);
        assert_eq!(a, b);
    }

    #[test]
    fn empty_snapshot() {
        let snapshot = FileSnapshot::empty();
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.len(), 0);
    }
}
