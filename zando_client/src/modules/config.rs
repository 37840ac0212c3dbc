use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;
use url::Url;
use zando_protocol::DEFAULT_API_URL;

pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_UPLOAD_MB: u64 = 20;
pub const DEFAULT_NOTIFICATION_MS: u64 = 5000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid api url {url:?}: {source}")]
    InvalidApiUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("api url must use http or https: {0}")]
    UnsupportedScheme(String),
    #[error("no session directory available; set ZANDO_SESSION_DIR")]
    NoSessionDir,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_url: Url,
    pub http_timeout: Duration,
    pub max_upload_bytes: u64,
    pub session_dir: PathBuf,
    /// Gate DNA/report workflows behind a logged-in session.
    pub require_auth: bool,
    pub notification_duration: Duration,
}

impl ClientConfig {
    pub fn new(api_url: &str, session_dir: PathBuf) -> Result<Self, ConfigError> {
        Ok(Self {
            api_url: parse_api_url(api_url)?,
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_MB * 1024 * 1024,
            session_dir,
            require_auth: true,
            notification_duration: Duration::from_millis(DEFAULT_NOTIFICATION_MS),
        })
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary variable source. Unparsable numeric or
    /// boolean values fall back to their defaults with a warning.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_url = lookup("ZANDO_API_URL")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let session_dir = match lookup("ZANDO_SESSION_DIR")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
        {
            Some(dir) => PathBuf::from(dir),
            None => default_session_dir().ok_or(ConfigError::NoSessionDir)?,
        };

        let mut cfg = Self::new(&api_url, session_dir)?;

        let timeout_secs = parse_u64(&lookup, "ZANDO_HTTP_TIMEOUT_SECS")
            .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS)
            .clamp(5, 300);
        cfg.http_timeout = Duration::from_secs(timeout_secs);

        let max_bytes = parse_u64(&lookup, "ZANDO_MAX_UPLOAD_MB")
            .filter(|mb| *mb > 0)
            .and_then(|mb| match mb.checked_mul(1024 * 1024) {
                Some(bytes) => Some(bytes),
                None => {
                    warn!("ignoring ZANDO_MAX_UPLOAD_MB={mb}: too large");
                    None
                }
            });
        cfg.max_upload_bytes = max_bytes.unwrap_or(DEFAULT_MAX_UPLOAD_MB * 1024 * 1024);

        if let Some(ms) = parse_u64(&lookup, "ZANDO_NOTIFICATION_MS").filter(|ms| *ms > 0) {
            cfg.notification_duration = Duration::from_millis(ms);
        }

        if let Some(flag) = parse_bool(&lookup, "ZANDO_REQUIRE_AUTH") {
            cfg.require_auth = flag;
        }

        Ok(cfg)
    }
}

pub fn parse_api_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim()).map_err(|source| ConfigError::InvalidApiUrl {
        url: raw.to_string(),
        source,
    })?;
    if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
        return Err(ConfigError::UnsupportedScheme(raw.to_string()));
    }
    Ok(url)
}

pub fn default_session_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("zando"))
}

fn parse_u64<F>(lookup: &F, key: &str) -> Option<u64>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<u64>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("ignoring {key}={raw:?}: not an unsigned integer");
            None
        }
    }
}

fn parse_bool<F>(lookup: &F, key: &str) -> Option<bool>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        other => {
            warn!("ignoring {key}={other:?}: expected true/false");
            None
        }
    }
}
