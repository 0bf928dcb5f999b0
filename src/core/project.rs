//! Project discovery and structure

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::identity::RecordId;

const PROJECT_DIR: &str = ".intake";

/// An intake workspace: a directory containing `.intake/`
#[derive(Debug)]
pub struct Project {
    /// Root directory of the project (parent of .intake/)
    root: PathBuf,
}

impl Project {
    /// Find project root by walking up from the current directory
    pub fn discover() -> Result<Self, ProjectError> {
        let current = std::env::current_dir()
            .map_err(|e| ProjectError::IoError(e.to_string()))?;
        Self::discover_from(&current)
    }

    /// Find project root by walking up from the given directory
    pub fn discover_from(start: &Path) -> Result<Self, ProjectError> {
        let mut current = start
            .canonicalize()
            .map_err(|e| ProjectError::IoError(e.to_string()))?;

        loop {
            if current.join(PROJECT_DIR).is_dir() {
                return Ok(Self { root: current });
            }

            if !current.pop() {
                return Err(ProjectError::NotFound {
                    searched_from: start.to_path_buf(),
                });
            }
        }
    }

    /// Create a new project structure at the given path
    pub fn init(path: &Path) -> Result<Self, ProjectError> {
        let root = path
            .canonicalize()
            .unwrap_or_else(|_| path.to_path_buf());

        if root.join(PROJECT_DIR).exists() {
            return Err(ProjectError::AlreadyExists(root.clone()));
        }

        Self::create_structure(root)
    }

    /// Initialize even if .intake/ exists; stored records are kept
    pub fn init_force(path: &Path) -> Result<Self, ProjectError> {
        let root = path
            .canonicalize()
            .unwrap_or_else(|_| path.to_path_buf());
        Self::create_structure(root)
    }

    fn create_structure(root: PathBuf) -> Result<Self, ProjectError> {
        let project = Self { root };

        for dir in [
            project.profiles_dir(),
            project.sessions_dir(),
            project.submissions_dir(),
        ] {
            std::fs::create_dir_all(&dir).map_err(|e| ProjectError::IoError(e.to_string()))?;
        }

        std::fs::write(project.config_path(), Self::default_config())
            .map_err(|e| ProjectError::IoError(e.to_string()))?;

        Ok(project)
    }

    fn default_config() -> &'static str {
        r#"# Consular intake project configuration

# Back-office API. When unset, profiles and submissions are stored
# in this directory and document analysis is unavailable.
# api_url: "https://consulat.example.org/api"
# api_token: ""

# Request timeout in seconds
# timeout_secs: 30

# Language of the applicant-facing texts
# locale: fr

# Agent or applicant recorded on sessions
# actor: ""
"#
    }

    /// Get the project root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the .intake directory
    pub fn intake_dir(&self) -> PathBuf {
        self.root.join(PROJECT_DIR)
    }

    pub fn config_path(&self) -> PathBuf {
        self.intake_dir().join("config.yaml")
    }

    pub fn profiles_dir(&self) -> PathBuf {
        self.intake_dir().join("profiles")
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.intake_dir().join("sessions")
    }

    pub fn submissions_dir(&self) -> PathBuf {
        self.intake_dir().join("submissions")
    }

    pub fn profile_path(&self, id: &RecordId) -> PathBuf {
        self.profiles_dir().join(format!("{}.yaml", id))
    }

    pub fn session_path(&self, id: &RecordId) -> PathBuf {
        self.sessions_dir().join(format!("{}.session.yaml", id))
    }

    pub fn submission_path(&self, id: &RecordId) -> PathBuf {
        self.submissions_dir().join(format!("{}.yaml", id))
    }

    /// Iterate the files of a record directory ending with `suffix`
    pub fn iter_files(dir: &Path, suffix: &str) -> impl Iterator<Item = PathBuf> {
        let suffix = suffix.to_string();
        walkdir::WalkDir::new(dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(move |e| e.path().to_string_lossy().ends_with(&suffix))
            .map(|e| e.path().to_path_buf())
    }
}

/// Errors that can occur during project operations
#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("not an intake project (searched from {searched_from:?}). Run 'intake init' to create one.")]
    NotFound { searched_from: PathBuf },

    #[error("intake project already exists at {0:?}")]
    AlreadyExists(PathBuf),

    #[error("IO error: {0}")]
    IoError(String),
}
