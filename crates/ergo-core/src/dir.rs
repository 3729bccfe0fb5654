//! Data directory discovery.

use crate::error::Error;
use std::path::{Path, PathBuf};

pub const DATA_DIR: &str = ".ergo";

#[derive(Debug, Clone, Default)]
pub struct DirOptions {
    /// Authoritative data directory; no discovery when set.
    pub explicit: Option<PathBuf>,
    /// Where upward discovery starts.
    pub start: PathBuf,
}

/// Resolve the data directory: the explicit path if given, otherwise the
/// nearest `.ergo/` at or above `start`.
pub fn ergo_dir(opts: &DirOptions) -> Result<PathBuf, Error> {
    if let Some(explicit) = &opts.explicit {
        if explicit.is_dir() {
            return Ok(explicit.clone());
        }
        return Err(Error::NotInitialized {
            dir: explicit.display().to_string(),
        });
    }
    find_upward(&opts.start).ok_or_else(|| Error::NotInitialized {
        dir: opts.start.join(DATA_DIR).display().to_string(),
    })
}

fn find_upward(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(DATA_DIR))
        .find(|candidate| candidate.is_dir())
}

/// The directory that holds the data directory; result paths are relative
/// to it.
pub fn project_root(data_dir: &Path) -> PathBuf {
    match data_dir.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn discovery_walks_upward() {
        let root = TempDir::new().expect("temp dir");
        fs::create_dir_all(root.path().join(DATA_DIR)).expect("data dir");
        let nested = root.path().join("a/b/c");
        fs::create_dir_all(&nested).expect("nested");

        let found = ergo_dir(&DirOptions {
            explicit: None,
            start: nested,
        })
        .expect("found");
        assert_eq!(found, root.path().join(DATA_DIR));
        assert_eq!(project_root(&found), root.path());
    }

    #[test]
    fn explicit_dir_is_authoritative() {
        let root = TempDir::new().expect("temp dir");
        fs::create_dir_all(root.path().join(DATA_DIR)).expect("data dir");
        let missing = root.path().join("elsewhere");

        let err = ergo_dir(&DirOptions {
            explicit: Some(missing),
            start: root.path().to_path_buf(),
        })
        .expect_err("explicit path must exist");
        assert!(matches!(err, Error::NotInitialized { .. }));
    }

    #[test]
    fn no_data_dir_anywhere_is_not_initialized() {
        let root = TempDir::new().expect("temp dir");
        let result = ergo_dir(&DirOptions {
            explicit: None,
            start: root.path().to_path_buf(),
        });
        // A stray .ergo above the temp root would make this find something.
        if let Ok(found) = result {
            assert!(!found.starts_with(root.path()));
        }
    }
}
