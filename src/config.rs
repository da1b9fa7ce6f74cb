use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Settings read from `storefront.toml`; every field is optional
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct StorefrontConfig {
    pub database: Option<String>,
    pub schema_script: Option<String>,
    pub assets_dir: Option<String>,
    pub backup_path: Option<String>,
    pub lock_file: Option<String>,
}

/// Paths after applying flags over config over defaults
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPaths {
    pub database: PathBuf,
    pub schema_script: Option<PathBuf>,
    pub assets_dir: PathBuf,
    pub backup_path: PathBuf,
    pub lock_file: PathBuf,
}

impl StorefrontConfig {
    pub fn resolve(&self, database_flag: Option<PathBuf>) -> ResolvedPaths {
        let database = database_flag
            .or_else(|| self.database.as_ref().map(PathBuf::from))
            .unwrap_or_else(default_database_path);
        let lock_file = self
            .lock_file
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| database.with_extension("lock"));
        ResolvedPaths {
            schema_script: self.schema_script.as_ref().map(PathBuf::from),
            assets_dir: self
                .assets_dir
                .as_ref()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("assets")),
            backup_path: self
                .backup_path
                .as_ref()
                .map(PathBuf::from)
                .unwrap_or_else(default_backup_path),
            lock_file,
            database,
        }
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("storefront.toml")
}

pub fn default_database_path() -> PathBuf {
    PathBuf::from("storefront.db")
}

pub fn default_backup_path() -> PathBuf {
    PathBuf::from("backup").join("storefront.xml")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<StorefrontConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: StorefrontConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &StorefrontConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

pub fn ensure_db_dir(db_path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
