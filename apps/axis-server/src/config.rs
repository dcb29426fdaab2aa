use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use crate::automation::DEFAULT_PROGRAM;
use crate::poller::DEFAULT_REFRESH_TICKS;
use crate::snapshot_cache::DEFAULT_TTL;

const DEFAULT_BIND: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_STATE_DIR: &str = "./state";
const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, thiserror::Error)]
pub(crate) enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Optional TOML layer named by `AXIS_CONFIG`. Every key may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct FileConfig {
    pub bind: Option<String>,
    pub port: Option<u16>,
    pub state_dir: Option<PathBuf>,
    pub provider_url: Option<String>,
    pub provider_timeout_secs: Option<u64>,
    pub automation_bin: Option<String>,
    pub cache_ttl_secs: Option<u64>,
    pub refresh_ticks: Option<u32>,
}

impl FileConfig {
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ServerConfig {
    pub addr: SocketAddr,
    pub state_dir: PathBuf,
    pub provider_url: Option<String>,
    pub provider_timeout: Duration,
    pub automation_bin: String,
    pub cache_ttl: Duration,
    pub refresh_ticks: u32,
}

impl ServerConfig {
    /// Resolve from the process environment, layered over `AXIS_CONFIG`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let lookup = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        let file = match lookup("AXIS_CONFIG") {
            Some(path) => {
                let path = PathBuf::from(path);
                let file = FileConfig::read(&path)?;
                info!(target: "axis::config", path = %path.display(), "loaded config file");
                file
            }
            None => FileConfig::default(),
        };
        Self::resolve(file, lookup)
    }

    /// Environment values win over file values, which win over defaults.
    pub fn resolve<F>(file: FileConfig, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind = lookup("AXIS_BIND")
            .or(file.bind)
            .unwrap_or_else(|| DEFAULT_BIND.to_string());
        let port = match lookup("AXIS_PORT").or_else(|| lookup("PORT")) {
            Some(raw) => parse("AXIS_PORT", raw)?,
            None => file.port.unwrap_or(DEFAULT_PORT),
        };
        let addr = format!("{bind}:{port}")
            .parse()
            .map_err(|_| ConfigError::Invalid {
                key: "AXIS_BIND",
                value: bind.clone(),
            })?;

        let state_dir = lookup("AXIS_STATE_DIR")
            .map(PathBuf::from)
            .or(file.state_dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR));
        let provider_url = lookup("AXIS_PROVIDER_URL").or(file.provider_url);
        let provider_timeout = match lookup("AXIS_PROVIDER_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(parse("AXIS_PROVIDER_TIMEOUT_SECS", raw)?),
            None => file
                .provider_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_PROVIDER_TIMEOUT),
        };
        let automation_bin = lookup("AXIS_AUTOMATION_BIN")
            .or(file.automation_bin)
            .unwrap_or_else(|| DEFAULT_PROGRAM.to_string());
        let cache_ttl = match lookup("AXIS_CACHE_TTL_SECS") {
            Some(raw) => Duration::from_secs(parse("AXIS_CACHE_TTL_SECS", raw)?),
            None => file
                .cache_ttl_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_TTL),
        };
        let refresh_ticks = match lookup("AXIS_REFRESH_TICKS") {
            Some(raw) => parse("AXIS_REFRESH_TICKS", raw)?,
            None => file.refresh_ticks.unwrap_or(DEFAULT_REFRESH_TICKS),
        };
        if refresh_ticks == 0 {
            return Err(ConfigError::Invalid {
                key: "AXIS_REFRESH_TICKS",
                value: "0".into(),
            });
        }

        Ok(Self {
            addr,
            state_dir,
            provider_url,
            provider_timeout,
            automation_bin,
            cache_ttl,
            refresh_ticks,
        })
    }
}

fn parse<T: std::str::FromStr>(key: &'static str, raw: String) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { key, value: raw })
}
