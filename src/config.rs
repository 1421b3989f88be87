use crate::core::{DbError, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

pub const ENV_DATA_DIR: &str = "ROLNODB_DATA_DIR";
pub const ENV_CACHE_TTL_SECS: &str = "ROLNODB_CACHE_TTL_SECS";

/// Store configuration
///
/// Every collection file lives directly under `data_dir`.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory holding one JSON file per collection
    pub data_dir: PathBuf,

    /// Lifetime of a read-through cache snapshot
    pub cache_ttl: Duration,

    /// Write files with two-space indentation
    pub pretty: bool,
}

impl StoreConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            cache_ttl: DEFAULT_CACHE_TTL,
            pretty: true,
        }
    }

    /// Load from `ROLNODB_DATA_DIR` / `ROLNODB_CACHE_TTL_SECS`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`StoreConfig::from_env`] with an explicit variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_dir = lookup(ENV_DATA_DIR).unwrap_or_else(|| DEFAULT_DATA_DIR.to_string());
        let mut config = Self::new(data_dir);

        if let Some(raw) = lookup(ENV_CACHE_TTL_SECS) {
            let secs = raw.trim().parse::<u64>().map_err(|_| {
                DbError::Config(format!(
                    "{} must be a whole number of seconds, got '{}'",
                    ENV_CACHE_TTL_SECS, raw
                ))
            })?;
            config = config.cache_ttl(Duration::from_secs(secs));
        }

        config.validate()?;
        Ok(config)
    }

    /// Set the data directory
    pub fn data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    /// Set the cache TTL
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Toggle pretty-printed output
    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    pub fn path_for(&self, file_name: impl AsRef<Path>) -> PathBuf {
        self.data_dir.join(file_name)
    }

    pub fn validate(&self) -> Result<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(DbError::Config("data directory must not be empty".to_string()));
        }
        if self.cache_ttl.is_zero() {
            return Err(DbError::Config("cache TTL must be greater than zero".to_string()));
        }
        Ok(())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new(DEFAULT_DATA_DIR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<StoreConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        StoreConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert_eq!(config.cache_ttl, Duration::from_secs(300));
        assert!(config.pretty);
    }

    #[test]
    fn test_env_overrides() {
        let config = load(&[(ENV_DATA_DIR, "/var/lib/rolno"), (ENV_CACHE_TTL_SECS, "30")]).unwrap();
        assert_eq!(config.path_for("users.json"), PathBuf::from("/var/lib/rolno/users.json"));
        assert_eq!(config.cache_ttl, Duration::from_secs(30));
    }

    #[test]
    fn test_rejects_bad_ttl() {
        let err = load(&[(ENV_CACHE_TTL_SECS, "soon")]).unwrap_err();
        assert!(matches!(err, DbError::Config(_)));

        let err = load(&[(ENV_CACHE_TTL_SECS, "0")]).unwrap_err();
        assert!(matches!(err, DbError::Config(_)));
    }
}
