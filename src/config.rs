use std::{collections::HashMap, path::PathBuf, time::Duration};

use config::{Config, ConfigError, Environment};
use serde::Deserialize;

const DEFAULT_PREFIX: &str = "gitsplit_";
const DEFAULT_LOCK_TIMEOUT_SECS: u64 = 300;

/// Process level settings, read from `GITSPLIT_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitsplitSettings {
    /// Directory receiving the temporary working repositories.
    pub workdir_dir: PathBuf,
    pub workdir_prefix: String,
    pub cache_lock_timeout: Duration,
}

impl Default for GitsplitSettings {
    fn default() -> Self {
        Self {
            workdir_dir: std::env::temp_dir(),
            workdir_prefix: DEFAULT_PREFIX.to_owned(),
            cache_lock_timeout: Duration::from_secs(DEFAULT_LOCK_TIMEOUT_SECS),
        }
    }
}

impl GitsplitSettings {
    pub fn load() -> anyhow::Result<Self> {
        Ok(RawConfig::load(None)?.into())
    }
}

impl From<RawConfig> for GitsplitSettings {
    fn from(raw: RawConfig) -> Self {
        let defaults = GitsplitSettings::default();
        Self {
            workdir_dir: raw.workdir.dir.unwrap_or(defaults.workdir_dir),
            workdir_prefix: raw.workdir.prefix.unwrap_or(defaults.workdir_prefix),
            cache_lock_timeout: raw
                .cache
                .locktimeout
                .map(Duration::from_secs)
                .unwrap_or(defaults.cache_lock_timeout),
        }
    }
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct RawConfig {
    #[serde(default)]
    workdir: WorkdirConfig,
    #[serde(default)]
    cache: CacheConfig,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct WorkdirConfig {
    dir: Option<PathBuf>,
    prefix: Option<String>,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct CacheConfig {
    locktimeout: Option<u64>,
}

impl RawConfig {
    fn load(env: Option<HashMap<String, String>>) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(
                Environment::with_prefix("GITSPLIT")
                    .separator("_")
                    .try_parsing(true)
                    .source(env),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn load_empty() {
        let env = HashMap::from([]);
        let config = RawConfig::load(Some(env)).unwrap();
        assert_eq!(config, RawConfig::default());
        assert_eq!(GitsplitSettings::from(config), GitsplitSettings::default());
    }

    #[test]
    fn load_environment() {
        let env = HashMap::from([
            ("GITSPLIT_WORKDIR_DIR".to_owned(), "/scratch".to_owned()),
            ("GITSPLIT_WORKDIR_PREFIX".to_owned(), "split-".to_owned()),
            ("GITSPLIT_CACHE_LOCKTIMEOUT".to_owned(), "5".to_owned()),
        ]);
        let config = RawConfig::load(Some(env)).unwrap();
        assert_eq!(
            config,
            RawConfig {
                workdir: WorkdirConfig {
                    dir: Some("/scratch".into()),
                    prefix: Some("split-".to_owned()),
                },
                cache: CacheConfig {
                    locktimeout: Some(5)
                },
            }
        );
        assert_eq!(
            GitsplitSettings::from(config),
            GitsplitSettings {
                workdir_dir: "/scratch".into(),
                workdir_prefix: "split-".to_owned(),
                cache_lock_timeout: Duration::from_secs(5),
            }
        );
    }
}
