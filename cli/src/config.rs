use anyhow::{Context, Result, bail};
use directories::ProjectDirs;
use std::path::PathBuf;

pub const DEFAULT_USER: &str = "local";

pub struct Config {
    pub db_path: PathBuf,
    pub user_id: String,
}

impl Config {
    /// Resolve the database path and current user. Explicit values (from flags
    /// or `PANTRY_DB` / `PANTRY_USER`) win over the platform data directory and
    /// the default user.
    pub fn load(db_path: Option<PathBuf>, user_id: Option<String>) -> Result<Self> {
        let db_path = match db_path {
            Some(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent).with_context(|| {
                        format!("Failed to create database directory: {}", parent.display())
                    })?;
                }
                path
            }
            None => Self::default_db_path()?,
        };

        let user_id = user_id.map_or_else(|| DEFAULT_USER.to_string(), |u| u.trim().to_string());
        if user_id.is_empty() {
            bail!("User id must not be empty");
        }

        Ok(Config { db_path, user_id })
    }

    fn default_db_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("", "", "smartpantry")
            .context("Could not determine home directory")?;

        let data_dir = proj_dirs.data_dir().to_path_buf();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        Ok(data_dir.join("pantry.db"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_path_and_user() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("pantry.db");
        let config = Config::load(Some(path.clone()), Some(" bob ".to_string())).unwrap();
        assert_eq!(config.db_path, path);
        assert_eq!(config.user_id, "bob");
        assert!(dir.path().join("nested").is_dir());
    }

    #[test]
    fn test_default_user() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(Some(dir.path().join("pantry.db")), None).unwrap();
        assert_eq!(config.user_id, DEFAULT_USER);
    }

    #[test]
    fn test_blank_user_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load(Some(dir.path().join("pantry.db")), Some("  ".to_string())).is_err());
    }
}
