//! Configuration management with layered hierarchy

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::core::Project;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_LOCALE: &str = "fr";

/// Intake configuration with layered hierarchy
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Back-office API base URL; unset means local file storage
    pub api_url: Option<String>,

    /// Bearer token sent to the API
    pub api_token: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: Option<u64>,

    /// Applicant-facing language
    pub locale: Option<String>,

    /// Agent or applicant recorded on sessions
    pub actor: Option<String>,
}

impl Config {
    /// Load configuration from all sources, merging in priority order
    pub fn load() -> Self {
        let project = Project::discover().ok();
        Self::load_for(project.as_ref())
    }

    /// Same as [`Config::load`] with an already discovered project
    pub fn load_for(project: Option<&Project>) -> Self {
        let mut config = Config::default();

        // 1. Built-in defaults (accessors)

        // 2. Global user config (~/.config/intake/config.yaml)
        if let Some(global_path) = Self::global_config_path() {
            if let Some(global) = Self::read(&global_path) {
                config.merge(global);
            }
        }

        // 3. Project config (.intake/config.yaml)
        if let Some(project) = project {
            if let Some(project_config) = Self::read(&project.config_path()) {
                config.merge(project_config);
            }
        }

        // 4. Environment variables
        config.merge(Self::from_env());

        config
    }

    fn read(path: &std::path::Path) -> Option<Config> {
        if !path.exists() {
            return None;
        }
        let contents = std::fs::read_to_string(path).ok()?;
        match serde_yml::from_str::<Config>(&contents) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable config");
                None
            }
        }
    }

    fn from_env() -> Config {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        Config {
            api_url: var("INTAKE_API_URL"),
            api_token: var("INTAKE_API_TOKEN"),
            timeout_secs: None,
            locale: var("INTAKE_LOCALE"),
            actor: var("INTAKE_ACTOR"),
        }
    }

    /// Get the path to the global config file
    fn global_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "intake")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Merge another config into this one (other takes precedence)
    fn merge(&mut self, other: Config) {
        if other.api_url.is_some() {
            self.api_url = other.api_url;
        }
        if other.api_token.is_some() {
            self.api_token = other.api_token;
        }
        if other.timeout_secs.is_some() {
            self.timeout_secs = other.timeout_secs;
        }
        if other.locale.is_some() {
            self.locale = other.locale;
        }
        if other.actor.is_some() {
            self.actor = other.actor;
        }
    }

    /// API base URL without trailing slash
    pub fn api_url(&self) -> Option<&str> {
        self.api_url
            .as_deref()
            .map(|url| url.trim_end_matches('/'))
            .filter(|url| !url.is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    pub fn locale(&self) -> String {
        self.locale
            .clone()
            .unwrap_or_else(|| DEFAULT_LOCALE.to_string())
    }

    /// Actor name, falling back to the login name
    pub fn actor(&self) -> String {
        if let Some(ref actor) = self.actor {
            return actor.clone();
        }

        std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "unknown".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.locale(), "fr");
        assert!(config.api_url().is_none());
    }

    #[test]
    fn test_merge_prefers_later_layer() {
        let mut config: Config = serde_yml::from_str("api_url: https://a.example\nlocale: en\n").unwrap();
        let project: Config = serde_yml::from_str("api_url: https://b.example/\ntimeout_secs: 5\n").unwrap();
        config.merge(project);

        assert_eq!(config.api_url(), Some("https://b.example"));
        assert_eq!(config.locale(), "en");
        assert_eq!(config.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_project_config_is_read() {
        let tmp = tempdir().unwrap();
        let project = Project::init(tmp.path()).unwrap();
        std::fs::write(project.config_path(), "actor: agent-7\ntimeout_secs: 12\n").unwrap();

        let config = Config::load_for(Some(&project));
        assert_eq!(config.timeout(), Duration::from_secs(12));
        if std::env::var("INTAKE_ACTOR").is_err() {
            assert_eq!(config.actor(), "agent-7");
        }
    }

    #[test]
    fn test_unreadable_project_config_is_ignored() {
        let tmp = tempdir().unwrap();
        let project = Project::init(tmp.path()).unwrap();
        std::fs::write(project.config_path(), "timeout_secs: [not, a, number]\n").unwrap();

        let config = Config::load_for(Some(&project));
        assert_eq!(config.timeout_secs, None);
    }
}
