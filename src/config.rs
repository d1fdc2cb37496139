//! Configuration file loading
//!
//! The control plane reads a YAML file shaped like `MeshConfig`. A missing
//! `--config` flag means defaults; a path that does not exist is an error.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use wanmesh_control::MeshConfig;

/// Load the configuration, applying a database URL override if given
pub fn load(path: Option<&Path>, database_url: Option<String>) -> Result<MeshConfig> {
    let mut config = match path {
        Some(path) => {
            let yaml = fs::read_to_string(path)
                .context(format!("Failed to read config file: {:?}", path))?;
            serde_yaml::from_str::<MeshConfig>(&yaml)
                .context(format!("Failed to parse config file: {:?}", path))?
        }
        None => MeshConfig::default(),
    };

    if let Some(url) = database_url {
        config.database_url = url;
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use wanmesh_proto::JobPriority;

    #[test]
    fn test_defaults_without_file() {
        let config = load(None, None).unwrap();
        assert_eq!(config, MeshConfig::default());
    }

    #[test]
    fn test_yaml_file_with_override() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "database_url: sqlite://./from-file.db?mode=rwc\n\
             tunnel_capacity: 200\n\
             job:\n  priority: normal\n  attempts: 3\n\
             rollback:\n  backoff_ms: 50\n"
        )
        .unwrap();

        let config = load(Some(file.path()), Some("sqlite::memory:".to_string())).unwrap();
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.tunnel_capacity, 200);
        assert_eq!(config.job.priority, JobPriority::Normal);
        assert_eq!(config.job.attempts, 3);
        assert_eq!(config.rollback.backoff_ms, 50);
        assert_eq!(config.rollback.max_attempts, 3);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.yaml");
        let err = load(Some(path.as_path()), None).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
