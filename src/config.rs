use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::rate_limit::RateLimitConfig;

const DEFAULT_BIND: &str = "0.0.0.0:8080";
const DEFAULT_UPLOAD_DIR: &str = "uploads";
const DEFAULT_MAX_UPLOAD: usize = 10 * 1024 * 1024; // 10 MiB
const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
    #[error("reading config file {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("parsing config file {path}: {source}")]
    Parse { path: PathBuf, source: serde_json::Error },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Postgres,
    Memory,
}

/// Optional JSON file layered under the environment. Every key is optional.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub database_url: Option<String>,
    pub jwt_secret: Option<String>,
    pub bind_addr: Option<String>,
    pub upload_dir: Option<PathBuf>,
    pub max_upload_bytes: Option<usize>,
    pub frontend_url: Option<String>,
    pub enable_hsts: Option<bool>,
    pub store: Option<String>,
    pub rate_limit_enabled: Option<bool>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read(path).map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        serde_json::from_slice(&raw).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub bind_addr: String,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub frontend_url: Option<String>,
    pub enable_hsts: bool,
    pub store: StoreKind,
    pub rate_limit_enabled: bool,
    pub rate_limits: RateLimitConfig,
}

fn parse_bool(key: &'static str, v: &str) -> Result<bool, ConfigError> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::Invalid { key, reason: format!("expected a boolean, got {other:?}") }),
    }
}

fn parse_num<T: std::str::FromStr>(key: &'static str, v: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    v.trim().parse().map_err(|e: T::Err| ConfigError::Invalid { key, reason: e.to_string() })
}

impl Config {
    /// Process environment over the optional `BLOG_CONFIG` file.
    pub fn load() -> Result<Self, ConfigError> {
        let file = match std::env::var("BLOG_CONFIG") {
            Ok(p) if !p.trim().is_empty() => Some(FileConfig::load(Path::new(&p))?),
            _ => None,
        };
        Self::from_sources(file, |k| std::env::var(k).ok())
    }

    /// Merge `file` with `env`; env wins. `env` is injectable for tests.
    pub fn from_sources(file: Option<FileConfig>, env: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let file = file.unwrap_or_default();
        let env = |k: &str| env(k).filter(|v| !v.trim().is_empty());

        let jwt_secret = env("JWT_SECRET").or(file.jwt_secret).ok_or(ConfigError::Missing("JWT_SECRET"))?;
        if jwt_secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::Invalid {
                key: "JWT_SECRET",
                reason: format!("must be at least {MIN_SECRET_LEN} bytes"),
            });
        }

        let store = match env("STORE").or(file.store).as_deref().map(str::trim) {
            None | Some("postgres") => StoreKind::Postgres,
            Some("memory") => StoreKind::Memory,
            Some(other) => {
                return Err(ConfigError::Invalid { key: "STORE", reason: format!("unknown store {other:?}") })
            }
        };

        let database_url = env("DATABASE_URL").or(file.database_url);
        if store == StoreKind::Postgres && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let max_upload_bytes = match env("MAX_UPLOAD_BYTES") {
            Some(v) => parse_num("MAX_UPLOAD_BYTES", &v)?,
            None => file.max_upload_bytes.unwrap_or(DEFAULT_MAX_UPLOAD),
        };
        if max_upload_bytes == 0 {
            return Err(ConfigError::Invalid { key: "MAX_UPLOAD_BYTES", reason: "must be positive".into() });
        }

        let enable_hsts = match env("ENABLE_HSTS") {
            Some(v) => parse_bool("ENABLE_HSTS", &v)?,
            None => file.enable_hsts.unwrap_or(false),
        };
        let rate_limit_enabled = match env("RL_ENABLED") {
            Some(v) => parse_bool("RL_ENABLED", &v)?,
            None => file.rate_limit_enabled.unwrap_or(true),
        };

        Ok(Self {
            database_url,
            jwt_secret,
            bind_addr: env("BIND_ADDR").or(file.bind_addr).unwrap_or_else(|| DEFAULT_BIND.to_string()),
            upload_dir: env("UPLOAD_DIR").map(PathBuf::from).or(file.upload_dir).unwrap_or_else(|| PathBuf::from(DEFAULT_UPLOAD_DIR)),
            max_upload_bytes,
            frontend_url: env("FRONTEND_URL").or(file.frontend_url),
            enable_hsts,
            store,
            rate_limit_enabled,
            rate_limits: rate_limits_from(&env)?,
        })
    }
}

fn rate_limits_from(env: &impl Fn(&str) -> Option<String>) -> Result<RateLimitConfig, ConfigError> {
    let limit = |key: &'static str, default: usize| -> Result<usize, ConfigError> {
        env(key).map(|v| parse_num(key, &v)).transpose().map(|v| v.unwrap_or(default))
    };
    let window = |key: &'static str, default: u64| -> Result<Duration, ConfigError> {
        env(key).map(|v| parse_num(key, &v)).transpose().map(|v| Duration::from_secs(v.unwrap_or(default)))
    };
    let d = RateLimitConfig::default();
    Ok(RateLimitConfig {
        auth_limit: limit("RL_AUTH_LIMIT", d.auth_limit)?,
        auth_window: window("RL_AUTH_WINDOW", d.auth_window.as_secs())?,
        post_limit: limit("RL_POST_LIMIT", d.post_limit)?,
        post_window: window("RL_POST_WINDOW", d.post_window.as_secs())?,
        comment_limit: limit("RL_COMMENT_LIMIT", d.comment_limit)?,
        comment_window: window("RL_COMMENT_WINDOW", d.comment_window.as_secs())?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn memory_store_needs_only_a_secret() {
        let cfg = Config::from_sources(None, env_of(&[("JWT_SECRET", SECRET), ("STORE", "memory")])).unwrap();
        assert_eq!(cfg.store, StoreKind::Memory);
        assert_eq!(cfg.bind_addr, DEFAULT_BIND);
        assert_eq!(cfg.max_upload_bytes, DEFAULT_MAX_UPLOAD);
        assert!(cfg.rate_limit_enabled);
        assert!(!cfg.enable_hsts);
    }

    #[test]
    fn postgres_store_requires_database_url() {
        let err = Config::from_sources(None, env_of(&[("JWT_SECRET", SECRET)])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("DATABASE_URL")));
    }

    #[test]
    fn short_secret_is_rejected() {
        let err = Config::from_sources(None, env_of(&[("JWT_SECRET", "short"), ("STORE", "memory")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "JWT_SECRET", .. }));
    }

    #[test]
    fn env_overrides_file() {
        let file = FileConfig {
            jwt_secret: Some(SECRET.into()),
            store: Some("memory".into()),
            bind_addr: Some("127.0.0.1:9000".into()),
            max_upload_bytes: Some(1024),
            ..FileConfig::default()
        };
        let cfg = Config::from_sources(Some(file), env_of(&[("MAX_UPLOAD_BYTES", "2048"), ("RL_POST_LIMIT", "7")])).unwrap();
        assert_eq!(cfg.bind_addr, "127.0.0.1:9000");
        assert_eq!(cfg.max_upload_bytes, 2048);
        assert_eq!(cfg.rate_limits.post_limit, 7);
    }

    #[test]
    fn garbage_numbers_are_invalid() {
        let err = Config::from_sources(
            None,
            env_of(&[("JWT_SECRET", SECRET), ("STORE", "memory"), ("RL_AUTH_WINDOW", "soon")]),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "RL_AUTH_WINDOW", .. }));
    }
}
