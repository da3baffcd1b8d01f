// ABOUTME: Discovers engine binaries under the engines root directory.
// ABOUTME: One engine per sub-directory, keyed by the sub-directory's name.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Logical engine name -> executable path. Ordered so "first engine" is stable.
pub type EngineMap = BTreeMap<String, PathBuf>;

/// Source of the current set of engines. Each call is a full rescan.
pub trait Discover: Send + Sync {
    fn scan(&self) -> EngineMap;
}

/// Scans `root/<name>/<binary>` on the local filesystem.
#[derive(Debug, Clone)]
pub struct DirectoryDiscovery {
    root: PathBuf,
}

impl DirectoryDiscovery {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Discover for DirectoryDiscovery {
    fn scan(&self) -> EngineMap {
        scan(&self.root)
    }
}

/// Scan `root` for engine binaries.
///
/// A missing or unreadable root yields an empty map. When a folder holds more
/// than one candidate, the lexicographically first file name wins and the rest
/// are reported in a warning.
pub fn scan(root: &Path) -> EngineMap {
    let mut engines = EngineMap::new();

    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(root = %root.display(), error = %e, "Cannot read engines directory");
            return engines;
        }
    };

    for entry in entries.flatten() {
        let dir = entry.path();
        if !dir.is_dir() {
            continue;
        }

        let name = match dir.file_name().and_then(|n| n.to_str()) {
            Some(n) => n.to_string(),
            None => continue,
        };

        // Skip hidden directories
        if name.starts_with('.') {
            continue;
        }

        let mut candidates = match candidates_in(&dir) {
            Ok(found) => found,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Skipping unreadable engine folder");
                continue;
            }
        };
        if candidates.is_empty() {
            debug!(engine = %name, "No executable found in engine folder");
            continue;
        }

        candidates.sort();
        let chosen = candidates.remove(0);
        if !candidates.is_empty() {
            warn!(
                engine = %name,
                chosen = %chosen.display(),
                ignored = ?candidates,
                "Engine folder has several executables; using the first by name"
            );
        }
        engines.insert(name, chosen);
    }

    let names: Vec<&String> = engines.keys().collect();
    debug!(root = %root.display(), engines = ?names, "Engine scan complete");
    engines
}

fn candidates_in(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in fs::read_dir(dir)?.flatten() {
        let path = entry.path();
        if path.is_dir() {
            continue;
        }
        let file_name = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n.to_lowercase(),
            None => continue,
        };
        if is_documentation(&file_name) {
            continue;
        }
        if looks_executable(&path) {
            found.push(path);
        }
    }
    Ok(found)
}

/// Names that are clearly not engine binaries. Expects a lowercased name.
fn is_documentation(lower_name: &str) -> bool {
    lower_name.starts_with("readme")
        || lower_name.starts_with("license")
        || lower_name.ends_with(".txt")
}

#[cfg(windows)]
fn looks_executable(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("exe"))
}

#[cfg(not(windows))]
fn looks_executable(path: &Path) -> bool {
    if path.extension().is_none() {
        return true;
    }
    has_exec_bit(path)
}

#[cfg(unix)]
fn has_exec_bit(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(all(not(unix), not(windows)))]
fn has_exec_bit(_path: &Path) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        fs::write(path, b"x").unwrap();
    }

    #[cfg(unix)]
    fn touch_exec(path: &Path) {
        use std::os::unix::fs::PermissionsExt;
        touch(path);
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[cfg(windows)]
    fn touch_exec(path: &Path) {
        touch(path);
    }

    #[cfg(unix)]
    fn binary(name: &str) -> String {
        name.to_string()
    }

    #[cfg(windows)]
    fn binary(name: &str) -> String {
        format!("{name}.exe")
    }

    #[test]
    fn test_scan_one_engine_per_folder() {
        let tmp = TempDir::new().unwrap();
        for engine in ["stockfish", "komodo", "lc0"] {
            let dir = tmp.path().join(engine);
            fs::create_dir(&dir).unwrap();
            touch_exec(&dir.join(binary(engine)));
            touch(&dir.join("README"));
            touch(&dir.join("readme.md"));
            touch(&dir.join("LICENSE"));
            touch(&dir.join("Copying.txt"));
            fs::create_dir(dir.join("nets")).unwrap();
        }

        let engines = scan(tmp.path());
        assert_eq!(engines.len(), 3);
        assert_eq!(
            engines.keys().cloned().collect::<Vec<_>>(),
            vec!["komodo", "lc0", "stockfish"]
        );
        for (name, path) in &engines {
            assert_eq!(path, &tmp.path().join(name).join(binary(name)));
        }
    }

    #[test]
    fn test_scan_skips_hidden_and_empty_folders() {
        let tmp = TempDir::new().unwrap();
        let hidden = tmp.path().join(".cache");
        fs::create_dir(&hidden).unwrap();
        touch_exec(&hidden.join(binary("engine")));
        fs::create_dir(tmp.path().join("empty")).unwrap();
        touch(&tmp.path().join("stray-file"));

        assert!(scan(tmp.path()).is_empty());
    }

    #[test]
    fn test_scan_missing_root_is_empty() {
        let tmp = TempDir::new().unwrap();
        assert!(scan(&tmp.path().join("does-not-exist")).is_empty());
    }

    #[test]
    fn test_scan_picks_first_candidate_by_name() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("stockfish");
        fs::create_dir(&dir).unwrap();
        touch_exec(&dir.join(binary("stockfish-avx2")));
        touch_exec(&dir.join(binary("stockfish-avx512")));
        touch_exec(&dir.join(binary("stockfish-aarch64")));

        let engines = scan(tmp.path());
        assert_eq!(engines["stockfish"], dir.join(binary("stockfish-aarch64")));
    }

    #[cfg(unix)]
    #[test]
    fn test_scan_unix_requires_exec_bit_for_dotted_names() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("berserk");
        fs::create_dir(&dir).unwrap();
        touch(&dir.join("berserk.nnue"));
        touch(&dir.join("notes.md"));
        assert!(scan(tmp.path()).is_empty());

        touch_exec(&dir.join("berserk-13.bin"));
        let engines = scan(tmp.path());
        assert_eq!(engines["berserk"], dir.join("berserk-13.bin"));
    }

    #[test]
    fn test_rescan_replaces_previous_result() {
        let tmp = TempDir::new().unwrap();
        let discovery = DirectoryDiscovery::new(tmp.path());
        assert_eq!(discovery.root(), tmp.path());
        let dir = tmp.path().join("ethereal");
        fs::create_dir(&dir).unwrap();
        touch_exec(&dir.join(binary("ethereal")));
        assert_eq!(discovery.scan().len(), 1);

        fs::remove_dir_all(&dir).unwrap();
        assert!(discovery.scan().is_empty());
    }

    #[test]
    fn test_is_documentation() {
        assert!(is_documentation("readme"));
        assert!(is_documentation("readme.md"));
        assert!(is_documentation("license-gpl"));
        assert!(is_documentation("authors.txt"));
        assert!(!is_documentation("stockfish"));
        assert!(!is_documentation("stockfish.exe"));
    }
}
