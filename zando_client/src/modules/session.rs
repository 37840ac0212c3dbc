use crate::modules::google_auth::{check_expiry, GoogleUser, TokenError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};
use zando_protocol::UserProfile;
use zeroize::Zeroizing;

const SESSION_FILE: &str = "session.json";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("session encode failed: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("identity token rejected: {0}")]
    Token(#[from] TokenError),
    #[error("session lock poisoned")]
    Poisoned,
}

#[derive(Default, Serialize, Deserialize)]
struct SessionData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    access_token: Option<Zeroizing<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user: Option<UserProfile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    google_token: Option<Zeroizing<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    google_user: Option<GoogleUser>,
    /// First-login stamps keyed by Google subject. Survive logout.
    #[serde(default)]
    first_login: HashMap<String, DateTime<Utc>>,
}

/// Credentials and cached identity, persisted as one JSON file.
pub struct SessionStore {
    path: PathBuf,
    data: Mutex<SessionData>,
}

impl SessionStore {
    /// Opens (or creates) the session under `dir`. A corrupt file is discarded
    /// and the session starts logged out.
    pub fn open(dir: &Path) -> Result<Self, SessionError> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(SESSION_FILE);

        let data = match std::fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<SessionData>(&bytes) {
                Ok(d) => d,
                Err(e) => {
                    warn!("discarding unreadable session file {}: {e}", path.display());
                    let _ = std::fs::remove_file(&path);
                    SessionData::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => SessionData::default(),
            Err(e) => return Err(e.into()),
        };

        debug!("session opened at {}", path.display());
        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn access_token(&self) -> Option<Zeroizing<String>> {
        self.data.lock().ok()?.access_token.clone()
    }

    pub fn set_access_token(&self, token: &str) -> Result<(), SessionError> {
        self.update(|d| d.access_token = Some(Zeroizing::new(token.to_string())))
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.data.lock().ok()?.user.clone()
    }

    pub fn set_user(&self, user: UserProfile) -> Result<(), SessionError> {
        self.update(|d| d.user = Some(user))
    }

    pub fn google_user(&self) -> Option<GoogleUser> {
        self.data.lock().ok()?.google_user.clone()
    }

    pub fn google_token(&self) -> Option<Zeroizing<String>> {
        self.data.lock().ok()?.google_token.clone()
    }

    pub fn first_login(&self, google_id: &str) -> Option<DateTime<Utc>> {
        self.data.lock().ok()?.first_login.get(google_id).copied()
    }

    pub fn is_authenticated(&self) -> bool {
        self.data
            .lock()
            .map(|d| d.access_token.is_some() || d.google_token.is_some())
            .unwrap_or(false)
    }

    /// Accepts a Google identity token, stamping the first-login time the
    /// first time this subject is seen.
    pub fn google_login(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<GoogleUser, SessionError> {
        let claims = check_expiry(token, now)?;
        let mut user = GoogleUser::from(claims);

        let mut guard = self.data.lock().map_err(|_| SessionError::Poisoned)?;
        let created = *guard.first_login.entry(user.id.clone()).or_insert(now);
        user.created_at = Some(created);
        guard.google_token = Some(Zeroizing::new(token.trim().to_string()));
        guard.google_user = Some(user.clone());
        self.persist(&guard)?;

        info!(user = %user.email, "google sign-in stored");
        Ok(user)
    }

    /// Start-up check: keeps a still-valid Google session and drops an
    /// expired or unreadable one.
    pub fn restore_google_user(&self, now: DateTime<Utc>) -> Option<GoogleUser> {
        let token = self.google_token()?;
        match self.google_login(&token, now) {
            Ok(user) => Some(user),
            Err(e) => {
                info!("dropping stored google session: {e}");
                let cleared = self.update(|d| {
                    d.google_token = None;
                    d.google_user = None;
                });
                if let Err(e) = cleared {
                    warn!("failed to persist cleared google session: {e}");
                }
                None
            }
        }
    }

    /// Logout: forgets every credential but keeps first-login stamps.
    pub fn clear(&self) -> Result<(), SessionError> {
        self.update(|d| {
            d.access_token = None;
            d.user = None;
            d.google_token = None;
            d.google_user = None;
        })
    }

    fn update(&self, f: impl FnOnce(&mut SessionData)) -> Result<(), SessionError> {
        let mut guard = self.data.lock().map_err(|_| SessionError::Poisoned)?;
        f(&mut guard);
        self.persist(&guard)
    }

    fn persist(&self, data: &SessionData) -> Result<(), SessionError> {
        let encoded = Zeroizing::new(serde_json::to_vec_pretty(data)?);
        let tmp = self.path.with_extension("json.tmp");
        let mut file = create_private(&tmp)?;
        file.write_all(encoded.as_slice())?;
        file.sync_all()?;
        drop(file);
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Creates `path` fresh with owner-only permissions. A leftover file from an
/// interrupted write is removed first so its mode is never reused.
fn create_private(path: &Path) -> std::io::Result<File> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e),
        _ => {}
    }
    let mut opts = OpenOptions::new();
    opts.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(0o600);
    }
    opts.open(path)
}
