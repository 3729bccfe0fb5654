//! Event log store: one JSON event per line, append-only.
//!
//! Reading is forgiving at the tail and strict in the interior. A final line
//! without a trailing newline is an interrupted write and is dropped; any
//! earlier line that fails to decode is a hard error carrying the file path,
//! the 1-based line number, and a snippet of the offending text.

use crate::event::Event;
use regex::Regex;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

const SNIPPET_CHARS: usize = 80;

/// Errors from reading or writing the event log.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("{path}: I/O error: {message}")]
    Io { path: String, message: String },

    #[error("{path}:{line}: malformed event ({message}): {snippet}")]
    Malformed {
        path: String,
        line: usize,
        snippet: String,
        message: String,
    },

    #[error(
        "{path}:{line}: unresolved merge conflict marker: {snippet} (resolve the conflict in the event log, then retry)"
    )]
    MergeConflict {
        path: String,
        line: usize,
        snippet: String,
    },

    #[error("{path}: corrupted log: {message}")]
    Corrupt { path: String, message: String },

    #[error("serialization error: {0}")]
    Serialize(String),
}

impl LogError {
    fn io(path: &Path, err: impl std::fmt::Display) -> Self {
        Self::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }

    /// 1-based line number for integrity errors.
    pub fn line(&self) -> Option<usize> {
        match self {
            Self::Malformed { line, .. } | Self::MergeConflict { line, .. } => Some(*line),
            _ => None,
        }
    }
}

fn conflict_marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:<{7}|={7}|>{7}|\|{7})(?:\s|$)").expect("conflict marker regex must compile")
    })
}

/// Read the ordered event sequence. A missing file is an empty log.
pub fn read(path: impl AsRef<Path>) -> Result<Vec<Event>, LogError> {
    let path = path.as_ref();
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(LogError::io(path, err)),
    };
    parse_lines(path, complete_lines(path, &bytes))
}

/// Split off everything after the last newline.
///
/// The fragment is what an interrupted append leaves behind; it is dropped
/// here and never reaches the strict parser.
fn complete_lines<'a>(path: &Path, bytes: &'a [u8]) -> &'a [u8] {
    match bytes.iter().rposition(|b| *b == b'\n') {
        Some(last) if last + 1 == bytes.len() => bytes,
        Some(last) => {
            tracing::warn!(
                path = %path.display(),
                dropped_bytes = bytes.len() - last - 1,
                "dropping unterminated final log line"
            );
            &bytes[..=last]
        }
        None => {
            if !bytes.is_empty() {
                tracing::warn!(
                    path = %path.display(),
                    dropped_bytes = bytes.len(),
                    "dropping unterminated final log line"
                );
            }
            &[]
        }
    }
}

/// Strict interior parser: every non-blank line must decode.
fn parse_lines(path: &Path, bytes: &[u8]) -> Result<Vec<Event>, LogError> {
    let mut events = Vec::new();
    let lines = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    if lines.is_empty() {
        return Ok(events);
    }
    for (idx, raw) in lines.split(|b| *b == b'\n').enumerate() {
        let line = std::str::from_utf8(raw).map_err(|err| LogError::Malformed {
            path: path.display().to_string(),
            line: idx + 1,
            snippet: snippet(String::from_utf8_lossy(raw).trim()),
            message: err.to_string(),
        })?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.contains('\0') {
            return Err(LogError::Corrupt {
                path: path.display().to_string(),
                message: format!("line {}: contains NUL byte(s)", idx + 1),
            });
        }
        match serde_json::from_str::<Event>(trimmed) {
            Ok(event) => events.push(event),
            Err(err) if conflict_marker_re().is_match(trimmed) => {
                tracing::debug!(error = %err, "merge conflict marker in event log");
                return Err(LogError::MergeConflict {
                    path: path.display().to_string(),
                    line: idx + 1,
                    snippet: snippet(trimmed),
                });
            }
            Err(err) => {
                return Err(LogError::Malformed {
                    path: path.display().to_string(),
                    line: idx + 1,
                    snippet: snippet(trimmed),
                    message: err.to_string(),
                });
            }
        }
    }
    Ok(events)
}

fn snippet(line: &str) -> String {
    let mut out: String = line.chars().take(SNIPPET_CHARS).collect();
    if line.chars().count() > SNIPPET_CHARS {
        out.push('…');
    }
    out
}

fn encode(events: &[Event]) -> Result<Vec<u8>, LogError> {
    let mut buf = Vec::new();
    for event in events {
        serde_json::to_writer(&mut buf, event).map_err(|e| LogError::Serialize(e.to_string()))?;
        buf.push(b'\n');
    }
    Ok(buf)
}

/// Durably append events to the end of the log in a single write.
///
/// Callers must hold the store lock. A crash-truncated fragment at the end
/// of the file is cut back to the last newline first, so new events never
/// fuse with it.
pub fn append(path: impl AsRef<Path>, events: &[Event]) -> Result<(), LogError> {
    let path = path.as_ref();
    if events.is_empty() {
        return Ok(());
    }
    let buf = encode(events)?;

    let mut file = OpenOptions::new()
        .read(true)
        .append(true)
        .create(true)
        .open(path)
        .map_err(|e| LogError::io(path, e))?;
    repair_tail(path, &mut file)?;
    file.write_all(&buf).map_err(|e| LogError::io(path, e))?;
    file.sync_data().map_err(|e| LogError::io(path, e))?;
    tracing::debug!(path = %path.display(), count = events.len(), "appended events");
    Ok(())
}

fn repair_tail(path: &Path, file: &mut File) -> Result<(), LogError> {
    let len = file.metadata().map_err(|e| LogError::io(path, e))?.len();
    if len == 0 {
        return Ok(());
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1))
        .map_err(|e| LogError::io(path, e))?;
    file.read_exact(&mut last).map_err(|e| LogError::io(path, e))?;
    if last[0] == b'\n' {
        return Ok(());
    }

    let mut bytes = Vec::with_capacity(len as usize);
    file.seek(SeekFrom::Start(0))
        .map_err(|e| LogError::io(path, e))?;
    file.read_to_end(&mut bytes)
        .map_err(|e| LogError::io(path, e))?;
    let keep = bytes
        .iter()
        .rposition(|b| *b == b'\n')
        .map(|idx| idx as u64 + 1)
        .unwrap_or(0);
    tracing::warn!(
        path = %path.display(),
        dropped_bytes = len - keep,
        "truncating unterminated final log line before append"
    );
    file.set_len(keep).map_err(|e| LogError::io(path, e))?;
    Ok(())
}

/// Atomically replace the whole log: temp file, rename, then directory sync.
pub fn write_full(path: impl AsRef<Path>, events: &[Event]) -> Result<(), LogError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| LogError::io(parent, e))?;
    }

    let tmp_path = tmp_write_path(path);
    let write_result = (|| -> Result<(), LogError> {
        let file = File::create(&tmp_path).map_err(|e| LogError::io(&tmp_path, e))?;
        let mut writer = BufWriter::new(file);
        writer
            .write_all(&encode(events)?)
            .map_err(|e| LogError::io(&tmp_path, e))?;
        let file = writer
            .into_inner()
            .map_err(|e| LogError::io(&tmp_path, e))?;
        file.sync_all().map_err(|e| LogError::io(&tmp_path, e))?;
        Ok(())
    })();

    if let Err(error) = write_result {
        let _ = fs::remove_file(&tmp_path);
        return Err(error);
    }

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        LogError::Io {
            path: format!("{} -> {}", tmp_path.display(), path.display()),
            message: e.to_string(),
        }
    })?;

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        let dir = File::open(parent).map_err(|e| LogError::io(parent, e))?;
        dir.sync_all().map_err(|e| LogError::io(parent, e))?;
    }

    tracing::debug!(path = %path.display(), count = events.len(), "rewrote event log");
    Ok(())
}

fn tmp_write_path(path: &Path) -> PathBuf {
    let unique = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let mut tmp: OsString = path.as_os_str().to_os_string();
    tmp.push(format!(".tmp.{}.{}", std::process::id(), unique));
    PathBuf::from(tmp)
}
