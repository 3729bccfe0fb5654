//! Evidence capture for result attachments.
//!
//! Read-only observations of a project file: content hash, modification
//! time, and the current git revision when there is one. Captured outside
//! the store lock and recorded afterwards through a locked mutation.

use crate::event::Evidence;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::process::Command;

#[derive(Debug, thiserror::Error)]
pub enum EvidenceError {
    #[error("result path must be relative to the project root: {0}")]
    Absolute(String),

    #[error("result path escapes the project root: {0}")]
    Escapes(String),

    #[error("result path is inside the ergo data directory: {0}")]
    InsideDataDir(String),

    #[error("result path is not a regular file: {0}")]
    NotAFile(String),

    #[error("{path}: {message}")]
    Io { path: String, message: String },
}

pub fn capture_evidence(
    project_root: &Path,
    data_dir: &Path,
    rel_path: &str,
    summary: &str,
) -> Result<Evidence, EvidenceError> {
    let rel = clean_relative(rel_path)?;
    let full = project_root.join(&rel);

    if let Ok(data_rel) = data_dir.strip_prefix(project_root)
        && !data_rel.as_os_str().is_empty()
        && rel.starts_with(data_rel)
    {
        return Err(EvidenceError::InsideDataDir(rel_path.to_string()));
    }

    let io = |err: std::io::Error| EvidenceError::Io {
        path: full.display().to_string(),
        message: err.to_string(),
    };
    let canonical = full.canonicalize().map_err(io)?;
    let canonical_root = project_root.canonicalize().map_err(io)?;
    if !canonical.starts_with(&canonical_root) {
        return Err(EvidenceError::Escapes(rel_path.to_string()));
    }
    if let Ok(canonical_data) = data_dir.canonicalize()
        && canonical.starts_with(&canonical_data)
    {
        return Err(EvidenceError::InsideDataDir(rel_path.to_string()));
    }

    let metadata = fs::metadata(&canonical).map_err(io)?;
    if !metadata.is_file() {
        return Err(EvidenceError::NotAFile(rel_path.to_string()));
    }
    let bytes = fs::read(&canonical).map_err(io)?;
    let sha256 = format!("{:x}", Sha256::digest(&bytes));
    let mtime: DateTime<Utc> = metadata.modified().map_err(io)?.into();

    Ok(Evidence {
        summary: summary.trim().to_string(),
        path: normalized_display(&rel),
        sha256,
        mtime,
        git_commit: git_head(project_root),
    })
}

/// Reject absolute paths and any `..`; drop `.` components.
fn clean_relative(raw: &str) -> Result<PathBuf, EvidenceError> {
    let path = Path::new(raw.trim());
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir => return Err(EvidenceError::Escapes(raw.to_string())),
            Component::RootDir | Component::Prefix(_) => {
                return Err(EvidenceError::Absolute(raw.to_string()));
            }
        }
    }
    if clean.as_os_str().is_empty() {
        return Err(EvidenceError::NotAFile(raw.to_string()));
    }
    Ok(clean)
}

fn normalized_display(path: &Path) -> String {
    path.components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Best effort: any failure means "no revision".
fn git_head(project_root: &Path) -> Option<String> {
    let output = Command::new("git")
        .arg("rev-parse")
        .arg("HEAD")
        .current_dir(project_root)
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let head = String::from_utf8(output.stdout).ok()?.trim().to_string();
    (!head.is_empty()).then_some(head)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn project() -> TempDir {
        let dir = TempDir::new().expect("temp dir");
        fs::create_dir_all(dir.path().join(".ergo")).expect("data dir");
        fs::create_dir_all(dir.path().join("out")).expect("out dir");
        fs::write(dir.path().join("out/report.txt"), b"hello\n").expect("fixture");
        fs::write(dir.path().join(".ergo/events.jsonl"), b"").expect("fixture");
        dir
    }

    #[test]
    fn captures_hash_and_normalized_path() {
        let dir = project();
        let evidence = capture_evidence(
            dir.path(),
            &dir.path().join(".ergo"),
            "./out/report.txt",
            "  report  ",
        )
        .expect("capture");
        assert_eq!(evidence.path, "out/report.txt");
        assert_eq!(evidence.summary, "report");
        assert_eq!(
            evidence.sha256,
            "5891b5b522d5df086d0ff0b110fbd9d21bb4fc7163af34d08286a2e846f6be03"
        );
    }

    #[test]
    fn rejects_paths_outside_the_project_or_inside_the_data_dir() {
        let dir = project();
        let data = dir.path().join(".ergo");
        let cases = [
            ("/etc/passwd", "absolute"),
            ("../secret", "escape"),
            ("out/../../secret", "escape"),
            (".ergo/events.jsonl", "data"),
            ("out", "dir"),
        ];
        for (raw, kind) in cases {
            let err = capture_evidence(dir.path(), &data, raw, "").expect_err(raw);
            let matched = match kind {
                "absolute" => matches!(err, EvidenceError::Absolute(_)),
                "escape" => matches!(err, EvidenceError::Escapes(_)),
                "data" => matches!(err, EvidenceError::InsideDataDir(_)),
                "dir" => matches!(err, EvidenceError::NotAFile(_)),
                _ => false,
            };
            assert!(matched, "{raw}: unexpected error {err:?}");
        }
    }
}
