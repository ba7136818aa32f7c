use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use thiserror::Error;

use crate::models::XrayConfig;

/// A relay document could not be produced or durably committed.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("document failed validation: {0}")]
    Schema(String),
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("written file {path} did not read back intact: {reason}")]
    Verify { path: PathBuf, reason: String },
}

/// Path of the temporary file written next to `path` before the rename.
pub fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Write `config` to `path` so that readers only ever see a complete document.
///
/// The JSON is written to `<path>.tmp` and synced, read back and parsed into
/// an [`XrayConfig`] that must equal `config`, and only then renamed over
/// `path`. On failure the temporary file is removed and `path` is untouched.
pub fn persist_config(config: &XrayConfig, path: &Path) -> Result<(), PersistError> {
    let content = serde_json::to_string_pretty(config)?;
    write_verified(path, &content, |written| {
        let parsed: XrayConfig =
            serde_json::from_str(written).map_err(|e| format!("not a relay document: {}", e))?;
        if &parsed != config {
            return Err("content differs from the generated document".to_string());
        }
        Ok(())
    })?;
    info!("Relay config written to {}", path.display());
    Ok(())
}

/// Write-verify-rename protocol behind [`persist_config`].
///
/// `verify` receives the content read back from the temporary file.
pub fn write_verified<F>(path: &Path, content: &str, verify: F) -> Result<(), PersistError>
where
    F: FnOnce(&str) -> Result<(), String>,
{
    let temp_path = temp_path_for(path);
    let result = write_then_rename(path, &temp_path, content, verify);
    if result.is_err() {
        remove_temp(&temp_path);
    }
    result
}

fn write_then_rename<F>(
    path: &Path,
    temp_path: &Path,
    content: &str,
    verify: F,
) -> Result<(), PersistError>
where
    F: FnOnce(&str) -> Result<(), String>,
{
    let io_err = |at: &Path| {
        let at = at.to_path_buf();
        move |source| PersistError::Io { path: at, source }
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err(parent))?;
    }

    let mut file = File::create(temp_path).map_err(io_err(temp_path))?;
    file.write_all(content.as_bytes())
        .and_then(|_| file.sync_all())
        .map_err(io_err(temp_path))?;
    drop(file);
    debug!("Wrote {} bytes to {}", content.len(), temp_path.display());

    let written = fs::read_to_string(temp_path).map_err(io_err(temp_path))?;
    verify(&written).map_err(|reason| PersistError::Verify {
        path: temp_path.to_path_buf(),
        reason,
    })?;

    fs::rename(temp_path, path).map_err(io_err(path))
}

fn remove_temp(temp_path: &Path) {
    match fs::remove_file(temp_path) {
        Ok(()) => debug!("Removed {}", temp_path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {}", temp_path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_path_is_adjacent() {
        assert_eq!(
            temp_path_for(Path::new("/etc/xray/config.json")),
            PathBuf::from("/etc/xray/config.json.tmp")
        );
    }

    #[test]
    fn test_failed_verification_keeps_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "previous").unwrap();

        let result = write_verified(&path, "{\"inbounds\": [", |_| Err("truncated".to_string()));

        assert!(matches!(result, Err(PersistError::Verify { .. })));
        assert_eq!(fs::read_to_string(&path).unwrap(), "previous");
        assert!(!temp_path_for(&path).exists());
    }

    #[test]
    fn test_verifier_sees_written_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        write_verified(&path, "hello", |written| {
            assert_eq!(written, "hello");
            Ok(())
        })
        .unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "hello");
        assert!(!temp_path_for(&path).exists());
    }
}
