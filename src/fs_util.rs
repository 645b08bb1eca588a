use std::fs;
use std::io::Write;

use camino::Utf8Path;

use crate::error::CurateError;

pub fn ensure_parent(path: &Utf8Path) -> Result<(), CurateError> {
    if let Some(parent) = path.parent() {
        if !parent.as_str().is_empty() {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| CurateError::Filesystem(format!("create {parent}: {err}")))?;
        }
    }
    Ok(())
}

/// Writes `content` to a temp file next to `path` and renames it into place.
pub fn write_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), CurateError> {
    ensure_parent(path)?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    let mut temp = tempfile::Builder::new()
        .prefix(".litcurate")
        .tempfile_in(dir.as_std_path())
        .map_err(|err| CurateError::Filesystem(err.to_string()))?;
    temp.write_all(content)
        .map_err(|err| CurateError::Filesystem(err.to_string()))?;
    temp.as_file()
        .sync_all()
        .map_err(|err| CurateError::Filesystem(err.to_string()))?;
    temp.persist(path.as_std_path())
        .map_err(|err| CurateError::Filesystem(format!("replace {path}: {err}")))?;
    Ok(())
}

/// Reads a file that may legitimately be absent.
pub fn read_optional(path: &Utf8Path) -> Result<Option<String>, CurateError> {
    match fs::read_to_string(path.as_std_path()) {
        Ok(content) => Ok(Some(content)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(CurateError::Filesystem(format!("read {path}: {err}"))),
    }
}
