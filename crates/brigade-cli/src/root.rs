use std::path::{Path, PathBuf};

/// Resolve the project root.
///
/// Priority:
/// 1. `--root` flag / `BRIGADE_ROOT` env var (passed in as `explicit`)
/// 2. Walk upward from `cwd` looking for `.brigade/`
/// 3. Fall back to `cwd`
pub fn resolve_root(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_brigade_dir(&cwd).unwrap_or(cwd)
}

fn find_brigade_dir(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(brigade_core::paths::BRIGADE_DIR).is_dir())
        .map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn explicit_root_wins() {
        let dir = TempDir::new().unwrap();
        assert_eq!(resolve_root(Some(dir.path())), dir.path());
    }

    #[test]
    fn finds_brigade_dir_from_subdirectory() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".brigade")).unwrap();
        let deep = dir.path().join("menus/winter");
        std::fs::create_dir_all(&deep).unwrap();

        assert_eq!(find_brigade_dir(&deep).unwrap(), dir.path());
    }

    #[test]
    fn no_brigade_dir_found() {
        let dir = TempDir::new().unwrap();
        assert!(find_brigade_dir(dir.path()).is_none());
    }
}
