//! Contains a collection of useful utility functions.

use std::ffi::OsStr;
use std::fs::{read, read_dir};
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::Result;

/// Create a static deser object from given path using serde.
///
/// Format is picked based on the file extension.
pub fn deser_struct_from_path<T>(file_path: &Path) -> Result<T>
where
    for<'de> T: serde::Deserialize<'de>,
{
    let bytes = read(file_path)?;
    let ext = file_path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");
    let d: T = match ext {
        "toml" => toml::from_slice(&bytes)?,
        #[cfg(feature = "yaml")]
        "yaml" | "yml" => serde_yaml::from_slice(&bytes)?,
        _ => {
            return Err(Error::Other(format!(
                "unsupported file format: {}",
                file_path.to_string_lossy()
            )))
        }
    };
    Ok(d)
}

/// Get paths to files with the given extension in the provided directory.
/// Not recursive.
pub fn find_files_with_extension(dir: &Path, extension: &str) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = Vec::new();
    if dir.is_dir() {
        let dir_entry = match read_dir(dir) {
            Ok(d) => d,
            _ => {
                error!("couldn't read directory at path: {}", dir.to_string_lossy());
                return Vec::new();
            }
        };
        for entry in dir_entry {
            let path = match entry {
                Ok(p) => p.path(),
                _ => continue,
            };
            if path.is_file() && path.extension().unwrap_or(OsStr::new("")) == extension {
                paths.push(path);
            }
        }
    }
    paths
}

/// Resolves `path` against `base` unless it's already absolute.
pub fn resolve_path(base: &Path, path: &Path) -> PathBuf {
    let joined = if path.is_relative() {
        base.join(path)
    } else {
        path.to_path_buf()
    };
    dunce::canonicalize(&joined).unwrap_or(joined)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn resolve_keeps_absolute() {
        let abs = std::env::temp_dir();
        assert_eq!(resolve_path(Path::new("/somewhere"), &abs), dunce::canonicalize(&abs).unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn resolve_joins_relative() {
        let resolved = resolve_path(Path::new("/nonexistent-base"), Path::new("model.nlogo"));
        assert_eq!(resolved, PathBuf::from("/nonexistent-base/model.nlogo"));
    }
}
