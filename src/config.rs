use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const CONFIG_FILE_NAME: &str = ".gatorconfig.json";

/// On-disk CLI configuration, stored as JSON in the user's home directory.
///
/// The file is read in full at every invocation and rewritten in full
/// whenever the current user changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub db_url: String,
    #[serde(default)]
    pub current_user_name: String,
    #[serde(skip)]
    path: PathBuf,
}

impl Config {
    /// Read the config file from its default location (`~/.gatorconfig.json`).
    pub fn read() -> Result<Self> {
        Self::read_from(default_path()?)
    }

    pub fn read_from(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let text = fs::read_to_string(&path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let mut config: Config = serde_json::from_str(&text)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        config.path = path;
        Ok(config)
    }

    /// Record `name` as the current user and rewrite the config file.
    pub fn set_user(&mut self, name: &str) -> Result<()> {
        self.current_user_name = name.to_string();
        self.write()
    }

    pub fn write(&self) -> Result<()> {
        let text = serde_json::to_string(self)?;
        fs::write(&self.path, text)
            .with_context(|| format!("writing config file {}", self.path.display()))?;
        Ok(())
    }
}

fn default_path() -> Result<PathBuf> {
    let home = env::var_os("HOME").context("HOME is not set")?;
    Ok(Path::new(&home).join(CONFIG_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &tempfile::TempDir, text: &str) -> PathBuf {
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn test_read_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"{"db_url": "sqlite:gator.db", "current_user_name": "kahya"}"#,
        );

        let config = Config::read_from(path).unwrap();
        assert_eq!(config.db_url, "sqlite:gator.db");
        assert_eq!(config.current_user_name, "kahya");
    }

    #[test]
    fn test_missing_user_name_defaults_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, r#"{"db_url": "sqlite:gator.db"}"#);

        let config = Config::read_from(path).unwrap();
        assert_eq!(config.current_user_name, "");
    }

    #[test]
    fn test_set_user_rewrites_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, r#"{"db_url": "sqlite:gator.db"}"#);

        let mut config = Config::read_from(&path).unwrap();
        config.set_user("lane").unwrap();

        let reread = Config::read_from(&path).unwrap();
        assert_eq!(reread.db_url, "sqlite:gator.db");
        assert_eq!(reread.current_user_name, "lane");
    }

    #[test]
    fn test_malformed_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "not json");

        assert!(Config::read_from(path).is_err());
    }

    #[test]
    fn test_missing_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);

        assert!(Config::read_from(path).is_err());
    }
}
