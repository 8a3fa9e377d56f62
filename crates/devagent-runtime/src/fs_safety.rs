//! Path sanitisation and atomic file writes (spec §4.2.4).
//!
//! Shared by the `FILE_WRITE` handler and the Planner's directive phase —
//! both need the same disallowed-location rewrite and atomic-write
//! discipline, so it lives as its own module rather than being duplicated.

use std::io::Write;
use std::path::{Path, PathBuf};

const DISALLOWED_ABSOLUTE_PREFIXES: &[&str] = &["/bin", "/sbin", "/etc", "/usr", "/System"];
const PLACEHOLDER_PREFIXES: &[&str] = &["/path/to/", "/example/"];
const PLACEHOLDER_EXACT: &[&str] = &["/dev/null"];

/// `true` if `path` is absolute and lands in a disallowed system location,
/// is an obvious LLM placeholder (`/path/to/*`, `/example/*`, `/dev/null`),
/// or has an empty basename.
pub fn is_disallowed(path: &str) -> bool {
    if path.is_empty() {
        return true;
    }
    let p = Path::new(path);
    if !p.is_absolute() {
        return false;
    }
    if PLACEHOLDER_EXACT.contains(&path) {
        return true;
    }
    if PLACEHOLDER_PREFIXES.iter().any(|prefix| path.starts_with(prefix)) {
        return true;
    }
    if DISALLOWED_ABSOLUTE_PREFIXES
        .iter()
        .any(|prefix| path.starts_with(prefix))
    {
        return true;
    }
    match p.file_name() {
        Some(name) => name.to_string_lossy().is_empty(),
        None => true,
    }
}

/// Infers a safe filename from description keywords when the proposed path
/// is disallowed (spec §4.2.4). Falls back to a generic name when no
/// keyword matches.
fn infer_filename(description: &str) -> &'static str {
    let lower = description.to_lowercase();
    if lower.contains("sql") {
        "output.sql"
    } else if lower.contains("todo") {
        "TODO.md"
    } else if lower.contains("database") {
        "database.sql"
    } else {
        "output.txt"
    }
}

/// Rewrites `proposed_path` to a safe relative path under `working_dir` if
/// it is disallowed; otherwise returns it unchanged, resolved against
/// `working_dir` if it was relative.
pub fn sanitize_path(proposed_path: &str, description: &str, working_dir: &Path) -> PathBuf {
    if is_disallowed(proposed_path) {
        return working_dir.join(infer_filename(description));
    }
    let p = Path::new(proposed_path);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        working_dir.join(p)
    }
}

/// How a file write should behave relative to an existing file (spec §4.2.4
/// `fileOperationMode`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Create,
    Replace,
    Append,
    Modify,
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum FsSafetyError {
    #[error("file already exists: {0}")]
    AlreadyExists(PathBuf),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Reads `path`'s current content before a `MODIFY`/`AUTO` write (spec
/// §4.2.4: "require first reading `originalFileContent` into the subtask
/// before writing"). Returns `(None, false)` rather than an error when the
/// file does not exist yet — `MODIFY`/`AUTO` on a missing file degrades to
/// a plain create, it is not a failure.
pub fn read_original(path: &Path) -> (Option<String>, bool) {
    match std::fs::read_to_string(path) {
        Ok(content) => (Some(content), true),
        Err(_) => (None, false),
    }
}

/// Writes `content` to `path` honouring `mode`, creating parent directories
/// as needed, and writing atomically (temp-file-then-rename) for every mode
/// except `Append`, which must write in place.
pub fn write_file(path: &Path, content: &str, mode: WriteMode) -> Result<(), FsSafetyError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    if mode == WriteMode::Create && path.exists() {
        return Err(FsSafetyError::AlreadyExists(path.to_path_buf()));
    }

    if mode == WriteMode::Append {
        let mut file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(content.as_bytes())?;
        return Ok(());
    }

    let parent = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(content.as_bytes())?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disallowed_system_paths_are_rejected() {
        assert!(is_disallowed("/etc/passwd"));
        assert!(is_disallowed("/bin/sh"));
        assert!(is_disallowed("/usr/local/lib"));
    }

    #[test]
    fn placeholder_paths_are_rejected() {
        assert!(is_disallowed("/path/to/file.txt"));
        assert!(is_disallowed("/example/foo.py"));
        assert!(is_disallowed("/dev/null"));
    }

    #[test]
    fn empty_basename_is_rejected() {
        assert!(is_disallowed("/tmp/"));
        assert!(is_disallowed(""));
    }

    #[test]
    fn relative_and_normal_absolute_paths_are_allowed() {
        assert!(!is_disallowed("notes.txt"));
        assert!(!is_disallowed("/home/user/project/notes.txt"));
    }

    #[test]
    fn sanitize_rewrites_disallowed_path_using_description_keywords() {
        let dir = tempfile::tempdir().unwrap();
        let result = sanitize_path("/etc/schema.sql", "generate a sql migration", dir.path());
        assert_eq!(result, dir.path().join("output.sql"));
    }

    #[test]
    fn sanitize_keeps_valid_relative_path_under_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let result = sanitize_path("notes/todo.md", "write notes", dir.path());
        assert_eq!(result, dir.path().join("notes/todo.md"));
    }

    #[test]
    fn write_then_read_round_trips_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b/hello.txt");
        write_file(&path, "hello", WriteMode::Replace).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello");
    }

    #[test]
    fn create_mode_fails_if_file_exists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.txt");
        write_file(&path, "first", WriteMode::Create).unwrap();
        let err = write_file(&path, "second", WriteMode::Create).unwrap_err();
        assert!(matches!(err, FsSafetyError::AlreadyExists(_)));
    }

    #[test]
    fn read_original_reports_existing_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("existing.txt");
        std::fs::write(&path, "before").unwrap();
        assert_eq!(read_original(&path), (Some("before".to_string()), true));
    }

    #[test]
    fn read_original_reports_missing_file_without_erroring() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.txt");
        assert_eq!(read_original(&path), (None, false));
    }

    #[test]
    fn append_mode_concatenates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.txt");
        write_file(&path, "a", WriteMode::Append).unwrap();
        write_file(&path, "b", WriteMode::Append).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "ab");
    }
}
