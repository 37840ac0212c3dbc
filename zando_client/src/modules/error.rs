use crate::modules::config::ConfigError;
use crate::modules::google_auth::TokenError;
use crate::modules::session::SessionError;
use reqwest::StatusCode;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("could not connect to API at {base_url}: {source}")]
    Network {
        base_url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("not authorized; stored credentials were cleared")]
    Unauthorized,
    #[error("request failed: status={status} detail={detail}")]
    BadStatus { status: StatusCode, detail: String },
    #[error("response decode failed: {0}")]
    Decode(String),
    #[error("{} is {size} bytes; the upload limit is {limit} bytes", .path.display())]
    FileTooLarge { path: PathBuf, size: u64, limit: u64 },
    #[error("{} is empty", .0.display())]
    EmptyFile(PathBuf),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("identity token error: {0}")]
    Token(#[from] TokenError),
    #[error("session store error: {0}")]
    Session(#[from] SessionError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("no analysis data available; upload and analyze a DNA file first")]
    MissingAnalysis,
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("login required")]
    LoginRequired,
}

impl ApiError {
    /// True when the caller should send the user back to the login step.
    pub fn requires_login(&self) -> bool {
        matches!(self, ApiError::Unauthorized | ApiError::LoginRequired)
    }

    pub fn is_network(&self) -> bool {
        matches!(self, ApiError::Network { .. })
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::BadStatus { status, .. } => Some(*status),
            ApiError::Unauthorized => Some(StatusCode::UNAUTHORIZED),
            ApiError::Http(e) => e.status(),
            _ => None,
        }
    }

    /// Short detail line for a toast.
    pub fn detail(&self) -> String {
        match self {
            ApiError::BadStatus { detail, .. } if !detail.is_empty() => detail.clone(),
            ApiError::Network { base_url, .. } => format!(
                "Could not connect to API at {base_url}. Please check your network connection."
            ),
            ApiError::Unauthorized => "Your session has expired. Please log in again.".to_string(),
            other => other.to_string(),
        }
    }
}
