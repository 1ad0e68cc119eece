//! Project configuration (`flux.json`) shipped at the root of every
//! deployed source tree.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lowest port an application may bind inside its container.
const MIN_PORT: u16 = 1024;

/// Per-project deployment configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    /// Host header under which the deployment is reachable.
    pub url: String,
    /// Container-internal TCP port the application listens on.
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_file: Option<String>,
    /// `KEY=VALUE` environment entries passed to the container.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub environment: Vec<String>,
}

#[derive(Debug, Error, PartialEq)]
pub enum ProjectError {
    #[error("invalid flux.json, a name, url, and port must be specified")]
    MissingField,

    #[error("invalid flux.json, port must be between {MIN_PORT} and 65535")]
    PortOutOfRange,

    #[error("failed to read env file {path}: {reason}")]
    EnvFile { path: String, reason: String },
}

impl ProjectConfig {
    /// Check the required fields. Validation never mutates state; a bad
    /// config is rejected before the pipeline touches anything.
    pub fn validate(&self) -> Result<(), ProjectError> {
        if self.name.is_empty() || self.url.is_empty() || self.port == 0 {
            return Err(ProjectError::MissingField);
        }
        if self.port < MIN_PORT {
            return Err(ProjectError::PortOutOfRange);
        }
        Ok(())
    }

    /// The full container environment: explicit `environment` entries
    /// first, then the entries of `env_file` (resolved relative to the
    /// staged project directory). Later duplicates win at the runtime,
    /// so env-file entries override nothing listed explicitly.
    pub fn resolved_environment(&self, project_dir: &Path) -> Result<Vec<String>, ProjectError> {
        let mut env = self.environment.clone();

        if let Some(env_file) = &self.env_file {
            let path = project_dir.join(env_file);
            let contents = std::fs::read_to_string(&path).map_err(|e| ProjectError::EnvFile {
                path: env_file.clone(),
                reason: e.to_string(),
            })?;
            env.extend(parse_env_file(&contents));
        }

        Ok(env)
    }
}

/// Parse `KEY=VALUE` lines. Blank lines and `#` comments are skipped;
/// values keep any `=` they contain.
fn parse_env_file(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter(|line| line.contains('='))
        .map(|line| {
            let (key, value) = line.split_once('=').unwrap();
            format!("{}={}", key.trim(), value.trim())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ProjectConfig {
        ProjectConfig {
            name: "web".to_string(),
            url: "web.test".to_string(),
            port: 8080,
            env_file: None,
            environment: vec![],
        }
    }

    #[test]
    fn valid_config_passes() {
        assert_eq!(test_config().validate(), Ok(()));
    }

    #[test]
    fn missing_name_is_rejected() {
        let config = ProjectConfig {
            name: String::new(),
            ..test_config()
        };
        assert_eq!(config.validate(), Err(ProjectError::MissingField));
    }

    #[test]
    fn missing_url_is_rejected() {
        let config = ProjectConfig {
            url: String::new(),
            ..test_config()
        };
        assert_eq!(config.validate(), Err(ProjectError::MissingField));
    }

    #[test]
    fn zero_port_is_rejected() {
        let config = ProjectConfig {
            port: 0,
            ..test_config()
        };
        assert_eq!(config.validate(), Err(ProjectError::MissingField));
    }

    #[test]
    fn privileged_port_is_rejected() {
        let config = ProjectConfig {
            port: 80,
            ..test_config()
        };
        assert_eq!(config.validate(), Err(ProjectError::PortOutOfRange));
    }

    #[test]
    fn env_file_entries_append_after_explicit_environment() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(".env"),
            "# comment\n\nDB_HOST=localhost\nDB_URL=postgres://u:p@host/db?x=1\n",
        )
        .unwrap();

        let config = ProjectConfig {
            env_file: Some(".env".to_string()),
            environment: vec!["EXPLICIT=1".to_string()],
            ..test_config()
        };

        let env = config.resolved_environment(dir.path()).unwrap();
        assert_eq!(
            env,
            vec![
                "EXPLICIT=1".to_string(),
                "DB_HOST=localhost".to_string(),
                "DB_URL=postgres://u:p@host/db?x=1".to_string(),
            ]
        );
    }

    #[test]
    fn missing_env_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = ProjectConfig {
            env_file: Some("nope.env".to_string()),
            ..test_config()
        };

        assert!(matches!(
            config.resolved_environment(dir.path()),
            Err(ProjectError::EnvFile { .. })
        ));
    }

    #[test]
    fn no_env_file_keeps_explicit_environment() {
        let dir = tempfile::tempdir().unwrap();
        let config = ProjectConfig {
            environment: vec!["A=1".to_string()],
            ..test_config()
        };

        assert_eq!(
            config.resolved_environment(dir.path()).unwrap(),
            vec!["A=1".to_string()]
        );
    }

    #[test]
    fn parse_skips_malformed_lines() {
        let env = parse_env_file("JUSTAKEY\nGOOD=yes\n   \n#A=b\n");
        assert_eq!(env, vec!["GOOD=yes".to_string()]);
    }
}
