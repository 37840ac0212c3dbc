use crate::modules::analysis_state::{AnalysisState, AnalysisStore};
use crate::modules::backend::{Backend, HttpBackend};
use crate::modules::config::ClientConfig;
use crate::modules::error::ApiError;
use crate::modules::google_auth::GoogleUser;
use crate::modules::notifications::NotificationCenter;
use crate::modules::progress::UploadProgress;
use crate::modules::session::SessionStore;
use chrono::Utc;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;
use zando_protocol::{
    AnalysisRequest, AnalysisResult, DnaUploadResponse, FormatsResponse, ProfileUpdate,
    RegisterRequest, ReportMetadata, ReportRequest, ReportResponse, ReportType, SnpDataResponse,
    UploadListResponse, UserProfile, ValidationResponse,
};

/// Whoever is signed in, by whichever route.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Account {
    Api(UserProfile),
    Google(GoogleUser),
}

/// Application state shared by every front-end action: the backend, the
/// stored session, the current analysis and the toast queue.
pub struct App {
    pub config: ClientConfig,
    pub backend: Arc<dyn Backend>,
    pub session: Arc<SessionStore>,
    pub analysis: AnalysisStore,
    pub notifications: NotificationCenter,
}

impl App {
    pub fn new(
        config: ClientConfig,
        backend: Arc<dyn Backend>,
        session: Arc<SessionStore>,
    ) -> Self {
        let notifications = NotificationCenter::new(config.notification_duration);
        Self {
            config,
            backend,
            session,
            analysis: AnalysisStore::new(),
            notifications,
        }
    }

    /// Opens the session on disk and wires an HTTP backend to it.
    pub fn from_config(config: ClientConfig) -> Result<Self, ApiError> {
        let session = Arc::new(SessionStore::open(&config.session_dir)?);
        let backend: Arc<dyn Backend> = Arc::new(HttpBackend::new(&config, Arc::clone(&session))?);
        session.restore_google_user(Utc::now());
        Ok(Self::new(config, backend, session))
    }

    pub fn analysis(&self) -> AnalysisState {
        self.analysis.snapshot()
    }

    /// Route guard for everything past the landing page.
    pub fn require_login(&self) -> Result<(), ApiError> {
        if self.config.require_auth && !self.session.is_authenticated() {
            self.notifications
                .warning("Please log in to continue", None);
            return Err(ApiError::LoginRequired);
        }
        Ok(())
    }

    fn fail<T>(&self, message: &str, err: ApiError) -> Result<T, ApiError> {
        let message = if err.is_network() {
            "API connection error"
        } else {
            message
        };
        self.notifications.error(message, Some(err.detail()));
        Err(err)
    }

    pub async fn formats(&self) -> Result<FormatsResponse, ApiError> {
        match self.backend.supported_formats().await {
            Ok(f) => Ok(f),
            Err(e) => self.fail("Could not load supported formats", e),
        }
    }

    pub async fn validate(&self, path: &Path) -> Result<ValidationResponse, ApiError> {
        self.require_login()?;
        let v = match self.backend.validate_dna(path).await {
            Ok(v) => v,
            Err(e) => return self.fail("Error validating file", e),
        };
        let detail = format!(
            "{} valid SNPs, {} invalid lines",
            v.stats.valid_snps, v.stats.invalid_lines
        );
        if v.valid {
            self.notifications.info("File looks valid", Some(detail));
        } else {
            self.notifications
                .warning("File did not pass validation", Some(detail));
        }
        Ok(v)
    }

    /// Uploads an export. The current analysis is only replaced once the
    /// backend has accepted the file.
    pub async fn upload(
        &self,
        path: &Path,
        progress: Option<watch::Sender<UploadProgress>>,
    ) -> Result<DnaUploadResponse, ApiError> {
        self.require_login()?;
        let resp = match self.backend.upload_dna(path, progress).await {
            Ok(r) => r,
            Err(e) => return self.fail("Error uploading file", e),
        };

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .or_else(|| Some(resp.file_name.clone()).filter(|n| !n.is_empty()));
        self.analysis
            .set_uploaded(file_name, resp.file_hash.clone(), resp.snp_count);
        info!(file_hash = %resp.file_hash, cached = resp.cached, "upload accepted");

        let detail = resp.cached.then(|| "Retrieved from cache".to_string());
        self.notifications
            .success("File successfully uploaded", detail);
        Ok(resp)
    }

    pub async fn uploads(&self, limit: u32, offset: u32) -> Result<UploadListResponse, ApiError> {
        self.require_login()?;
        match self.backend.list_uploads(limit, offset).await {
            Ok(l) => Ok(l),
            Err(e) => self.fail("Could not list uploaded files", e),
        }
    }

    pub async fn snp_data(&self, file_hash: &str) -> Result<SnpDataResponse, ApiError> {
        self.require_login()?;
        match self.backend.snp_data(file_hash).await {
            Ok(d) => Ok(d),
            Err(e) => self.fail("Could not load SNP data", e),
        }
    }

    /// Points the session at an earlier upload or analysis.
    pub fn select(&self, file_hash: Option<String>, analysis_id: Option<String>) {
        self.analysis.adopt(file_hash, analysis_id);
    }

    pub async fn analyze(&self, force_refresh: bool) -> Result<AnalysisResult, ApiError> {
        self.require_login()?;
        let current = self.analysis.snapshot();
        if current.file_hash.is_none() && current.analysis_id.is_none() {
            return self.fail("No analysis data available", ApiError::MissingAnalysis);
        }

        self.analysis.set_analyzing(None);
        let req = AnalysisRequest {
            file_hash: current.file_hash.clone(),
            analysis_id: current.analysis_id.clone(),
            force_refresh,
        };

        let outcome = async {
            let processed = self.backend.process_analysis(&req).await?;
            let result = self.backend.analysis_result(&processed.analysis_id).await?;
            Ok::<_, ApiError>((processed, result))
        }
        .await;

        match outcome {
            Ok((processed, result)) => {
                self.analysis.set_analyzed(
                    result.analysis_id.clone(),
                    Some(processed.snp_count).filter(|n| *n > 0),
                    result.data.clone(),
                );
                let detail = if processed.cached {
                    "Retrieved from cache".to_string()
                } else {
                    format!("{} SNPs analysed", processed.snp_count)
                };
                self.notifications.success("Analysis complete", Some(detail));
                Ok(result)
            }
            Err(e) => {
                self.analysis.set_error(e.detail());
                self.fail("Analysis failed", e)
            }
        }
    }

    pub async fn analysis_result(&self, analysis_id: &str) -> Result<AnalysisResult, ApiError> {
        self.require_login()?;
        match self.backend.analysis_result(analysis_id).await {
            Ok(r) => Ok(r),
            Err(e) => self.fail("Could not load analysis", e),
        }
    }

    pub async fn analysis_exists(&self, file_hash: &str) -> bool {
        self.backend.analysis_exists(file_hash).await
    }

    pub async fn generate_report(
        &self,
        report_type: ReportType,
    ) -> Result<ReportResponse, ApiError> {
        self.require_login()?;
        let Some((file_hash, analysis_id)) = self.analysis.report_source() else {
            self.notifications.error(
                "No analysis data available",
                Some("You need to upload and analyze a DNA file first".to_string()),
            );
            return Err(ApiError::MissingAnalysis);
        };

        let req = ReportRequest {
            file_hash,
            analysis_id,
            report_type,
            include_raw_data: false,
        };
        match self.backend.generate_report(&req).await {
            Ok(r) => {
                let detail = if r.cached {
                    "Retrieved from cache"
                } else {
                    "New report created"
                };
                self.notifications
                    .success("Report generated successfully", Some(detail.to_string()));
                Ok(r)
            }
            Err(e) => self.fail("Failed to generate report", e),
        }
    }

    pub async fn report(&self, report_id: &str) -> Result<ReportMetadata, ApiError> {
        self.require_login()?;
        match self.backend.report_metadata(report_id).await {
            Ok(m) => Ok(m),
            Err(e) => self.fail("Could not load report", e),
        }
    }

    pub async fn reports(&self) -> Result<Vec<ReportMetadata>, ApiError> {
        self.require_login()?;
        match self.backend.user_reports().await {
            Ok(r) => Ok(r),
            Err(e) => self.fail("Could not list reports", e),
        }
    }

    /// Fetches the rendered report and writes it to `out`.
    pub async fn download_report(&self, report_id: &str, out: &Path) -> Result<u64, ApiError> {
        self.require_login()?;
        let bytes = match self.backend.download_report(report_id).await {
            Ok(b) => b,
            Err(e) => return self.fail("Failed to download report", e),
        };
        if let Err(e) = tokio::fs::write(out, &bytes).await {
            return self.fail("Failed to save report", e.into());
        }
        self.notifications
            .success("Report downloaded", Some(out.display().to_string()));
        Ok(bytes.len() as u64)
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<UserProfile, ApiError> {
        let outcome = async {
            let token = self.backend.login(username, password).await?;
            self.session.set_access_token(&token.access_token)?;
            let profile = self.backend.profile().await?;
            self.session.set_user(profile.clone())?;
            Ok::<_, ApiError>(profile)
        }
        .await;

        match outcome {
            Ok(profile) => {
                info!(username = %profile.username, "logged in");
                self.notifications
                    .success(format!("Logged in as {}", profile.username), None);
                Ok(profile)
            }
            Err(ApiError::Unauthorized) => {
                self.notifications.error(
                    "Login failed",
                    Some("Please check your credentials.".to_string()),
                );
                Err(ApiError::Unauthorized)
            }
            Err(e) => self.fail("Login failed", e),
        }
    }

    pub async fn register(&self, req: RegisterRequest) -> Result<UserProfile, ApiError> {
        if let Err(e) = self.backend.register(&req).await {
            return self.fail("Registration failed", e);
        }
        self.login(&req.username, &req.password).await
    }

    pub async fn update_profile(&self, update: ProfileUpdate) -> Result<UserProfile, ApiError> {
        if update.is_empty() {
            return Err(ApiError::InvalidInput("nothing to update".to_string()));
        }
        let outcome = async {
            let profile = self.backend.update_profile(&update).await?;
            self.session.set_user(profile.clone())?;
            Ok::<_, ApiError>(profile)
        }
        .await;
        match outcome {
            Ok(p) => {
                self.notifications.success("Profile updated", None);
                Ok(p)
            }
            Err(e) => self.fail("Failed to update profile", e),
        }
    }

    /// Re-fetches the profile for a stored API token. A rejected token has
    /// already been cleared by the backend.
    pub async fn refresh_profile(&self) -> Result<Option<UserProfile>, ApiError> {
        if self.session.access_token().is_none() {
            return Ok(None);
        }
        match self.backend.profile().await {
            Ok(p) => {
                self.session.set_user(p.clone())?;
                Ok(Some(p))
            }
            Err(ApiError::Unauthorized) => {
                self.notifications.warning(
                    "Session expired",
                    Some(ApiError::Unauthorized.detail()),
                );
                Err(ApiError::Unauthorized)
            }
            Err(e) => self.fail("Could not load profile", e),
        }
    }

    pub async fn account(&self) -> Result<Option<Account>, ApiError> {
        if let Some(p) = self.refresh_profile().await? {
            return Ok(Some(Account::Api(p)));
        }
        Ok(self.session.google_user().map(Account::Google))
    }

    pub fn google_login(&self, id_token: &str) -> Result<GoogleUser, ApiError> {
        match self.session.google_login(id_token, Utc::now()) {
            Ok(user) => {
                self.notifications
                    .success(format!("Signed in as {}", user.name), None);
                Ok(user)
            }
            Err(e) => self.fail("Google sign-in failed", e.into()),
        }
    }

    pub fn logout(&self) -> Result<(), ApiError> {
        self.session.clear()?;
        info!("logged out");
        self.notifications.info("Logged out", None);
        Ok(())
    }
}
