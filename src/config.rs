use std::path::PathBuf;
use std::time::Duration;

use crate::rate_limit::RateLimitConfig;

pub const MIN_JWT_SECRET_LEN: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("JWT_SECRET must be at least {MIN_JWT_SECRET_LEN} characters long")]
    WeakSecret,
    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Process configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub port: u16,
    pub jwt_secret: String,
    pub frontend_url: String,
    pub upload_dir: PathBuf,
    /// Where the in-memory backend snapshots its state; `None` keeps it purely in memory.
    pub data_dir: Option<PathBuf>,
    pub database_url: Option<String>,
    pub enable_hsts: bool,
    pub rate_limit_enabled: bool,
    pub rate_limits: RateLimitConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary variable source.
    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_secret = get("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;
        if jwt_secret.len() < MIN_JWT_SECRET_LEN {
            return Err(ConfigError::WeakSecret);
        }

        let parse = |name: &'static str, default: u64| -> Result<u64, ConfigError> {
            match get(name) {
                Some(v) => v.parse().map_err(|_| ConfigError::Invalid { name, value: v }),
                None => Ok(default),
            }
        };
        let flag = |name: &str, default: bool| {
            get(name).map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(default)
        };

        let port = parse("PORT", 8080)?;
        let port = u16::try_from(port).map_err(|_| ConfigError::Invalid { name: "PORT", value: port.to_string() })?;

        let rate_limits = RateLimitConfig {
            post_limit: parse("RL_POST_LIMIT", 5)? as usize,
            post_window: Duration::from_secs(parse("RL_POST_WINDOW", 300)?),
            comment_limit: parse("RL_COMMENT_LIMIT", 20)? as usize,
            comment_window: Duration::from_secs(parse("RL_COMMENT_WINDOW", 60)?),
            report_limit: parse("RL_REPORT_LIMIT", 10)? as usize,
            report_window: Duration::from_secs(parse("RL_REPORT_WINDOW", 3600)?),
            upload_limit: parse("RL_UPLOAD_LIMIT", 10)? as usize,
            upload_window: Duration::from_secs(parse("RL_UPLOAD_WINDOW", 3600)?),
        };

        Ok(Self {
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            jwt_secret,
            frontend_url: get("FRONTEND_URL").unwrap_or_else(|| "http://localhost:5173".into()),
            upload_dir: get("UPLOAD_DIR").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("uploads")),
            data_dir: get("FIXLOG_DATA_DIR").map(PathBuf::from),
            database_url: get("DATABASE_URL"),
            enable_hsts: flag("ENABLE_HSTS", false),
            rate_limit_enabled: flag("RL_ENABLED", true),
            rate_limits,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn cfg(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AppConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_apply() {
        let c = cfg(&[("JWT_SECRET", SECRET)]).unwrap();
        assert_eq!(c.port, 8080);
        assert_eq!(c.frontend_url, "http://localhost:5173");
        assert!(c.data_dir.is_none());
        assert!(!c.enable_hsts);
        assert!(c.rate_limit_enabled);
        assert_eq!(c.rate_limits.comment_window, Duration::from_secs(60));
    }

    #[test]
    fn secret_is_required_and_long() {
        assert!(matches!(cfg(&[]), Err(ConfigError::Missing("JWT_SECRET"))));
        assert!(matches!(cfg(&[("JWT_SECRET", "short")]), Err(ConfigError::WeakSecret)));
    }

    #[test]
    fn bad_numbers_are_rejected() {
        let err = cfg(&[("JWT_SECRET", SECRET), ("PORT", "http")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "PORT", .. }));
        let err = cfg(&[("JWT_SECRET", SECRET), ("PORT", "70000")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "PORT", .. }));
    }

    #[test]
    fn overrides_are_read() {
        let c = cfg(&[
            ("JWT_SECRET", SECRET),
            ("ENABLE_HSTS", "true"),
            ("RL_ENABLED", "0"),
            ("RL_POST_LIMIT", "1"),
            ("FIXLOG_DATA_DIR", "/tmp/fixlog"),
        ])
        .unwrap();
        assert!(c.enable_hsts);
        assert!(!c.rate_limit_enabled);
        assert_eq!(c.rate_limits.post_limit, 1);
        assert_eq!(c.data_dir, Some(PathBuf::from("/tmp/fixlog")));
    }
}
