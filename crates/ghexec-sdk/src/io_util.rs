use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Filesystem helpers shared by the state store, script writer and log artifacts.
pub struct IOUtil;

impl IOUtil {
    /// Create `path` and all of its parents.
    pub fn ensure_directory(path: &Path) -> Result<()> {
        fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory '{}'", path.display()))
    }

    /// Create an empty file at `path` if nothing exists there yet.
    pub fn ensure_file(path: &Path) -> Result<()> {
        if path.exists() {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            Self::ensure_directory(parent)?;
        }
        fs::write(path, b"").with_context(|| format!("Failed to create file '{}'", path.display()))
    }

    /// Write `contents` to `path`, creating parent directories.
    pub fn write_file(path: &Path, contents: impl AsRef<[u8]>) -> Result<()> {
        if let Some(parent) = path.parent() {
            Self::ensure_directory(parent)?;
        }
        fs::write(path, contents).with_context(|| format!("Failed to write file '{}'", path.display()))
    }

    /// Write an executable file (mode 0755 on unix).
    pub fn write_executable(path: &Path, contents: impl AsRef<[u8]>) -> Result<()> {
        Self::write_file(path, contents)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o755))
                .with_context(|| format!("Failed to set permissions on '{}'", path.display()))?;
        }
        Ok(())
    }

    /// Read a file as UTF-8, treating a missing file as empty.
    pub fn read_to_string_or_empty(path: &Path) -> Result<String> {
        match fs::read_to_string(path) {
            Ok(contents) => Ok(contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e).with_context(|| format!("Failed to read file '{}'", path.display())),
        }
    }

    /// Serialize a value as pretty JSON and write it to a file.
    pub fn save_object<T: Serialize>(path: &Path, value: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(value)?;
        Self::write_file(path, json.as_bytes())
            .with_context(|| format!("Failed to write object to '{}'", path.display()))
    }

    /// Deserialize a JSON file, creating it when absent. An empty file yields
    /// `T::default()`.
    pub fn load_object_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
        Self::ensure_file(path)?;
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read file '{}'", path.display()))?;
        if json.trim().is_empty() {
            return Ok(T::default());
        }
        serde_json::from_str(&json)
            .with_context(|| format!("Failed to deserialize JSON from '{}'", path.display()))
    }
}
