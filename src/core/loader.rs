//! Record loading utilities
//!
//! Generic helpers to read and write the YAML records of a project
//! directory.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::store::StoreError;

/// Load all records of type T from a directory
///
/// Scans the directory for .yaml files and deserializes them.
/// Files that fail to parse are skipped with a warning.
pub fn load_all<T: DeserializeOwned + 'static>(dir: &Path) -> Result<Vec<T>, StoreError> {
    let mut records = Vec::new();

    if !dir.exists() {
        return Ok(records);
    }

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();

        if path.extension().map_or(false, |e| e == "yaml") {
            match read_yaml::<T>(&path) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping record"),
            }
        }
    }

    Ok(records)
}

/// Find a record file by ID (supports partial matching)
///
/// Searches for a file whose stem starts with or contains the given ID.
pub fn find_record_file(dir: &Path, id: &str) -> Option<PathBuf> {
    if !dir.exists() || id.is_empty() {
        return None;
    }

    let mut candidates: Vec<PathBuf> = fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().map_or(false, |e| e == "yaml"))
        .filter(|p| {
            let stem = p.file_stem().and_then(|s| s.to_str()).unwrap_or("");
            stem.starts_with(id) || stem.contains(id)
        })
        .collect();

    candidates.sort();
    candidates.into_iter().next()
}

/// Read one YAML record
pub fn read_yaml<T: DeserializeOwned + 'static>(path: &Path) -> Result<T, StoreError> {
    let content = fs::read_to_string(path)?;
    serde_yml::from_str(&content).map_err(|e| StoreError::Yaml {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Write one YAML record through a temporary file, so readers never see a
/// partial record
pub fn write_yaml<T: Serialize>(path: &Path, record: &T) -> Result<(), StoreError> {
    let content = serde_yml::to_string(record).map_err(|e| StoreError::Yaml {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("yaml.tmp");
    fs::write(&tmp, content)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
