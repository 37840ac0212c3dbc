use crate::modules::config::ClientConfig;
use crate::modules::error::ApiError;
use crate::modules::progress::{progress_body, UploadProgress, DEFAULT_CHUNK_SIZE};
use crate::modules::session::SessionStore;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};
use url::Url;
use zando_protocol::{
    AnalysisExists, AnalysisRequest, AnalysisResponse, AnalysisResult, DnaUploadResponse,
    FormatsResponse, ProfileUpdate, RegisterRequest, ReportMetadata, ReportRequest,
    ReportResponse, SnpDataResponse, TokenResponse, UploadListResponse, UserProfile,
    ValidationResponse,
};

/// The remote service, one method per endpoint.
#[async_trait]
pub trait Backend: Send + Sync {
    fn base_url(&self) -> &Url;

    async fn upload_dna(
        &self,
        path: &Path,
        progress: Option<watch::Sender<UploadProgress>>,
    ) -> Result<DnaUploadResponse, ApiError>;
    async fn validate_dna(&self, path: &Path) -> Result<ValidationResponse, ApiError>;
    async fn supported_formats(&self) -> Result<FormatsResponse, ApiError>;
    async fn snp_data(&self, file_hash: &str) -> Result<SnpDataResponse, ApiError>;
    async fn list_uploads(&self, limit: u32, offset: u32) -> Result<UploadListResponse, ApiError>;

    async fn process_analysis(&self, req: &AnalysisRequest) -> Result<AnalysisResponse, ApiError>;
    async fn analysis_result(&self, analysis_id: &str) -> Result<AnalysisResult, ApiError>;
    /// Any failure reads as "does not exist".
    async fn analysis_exists(&self, file_hash: &str) -> bool;

    async fn generate_report(&self, req: &ReportRequest) -> Result<ReportResponse, ApiError>;
    async fn report_metadata(&self, report_id: &str) -> Result<ReportMetadata, ApiError>;
    async fn user_reports(&self) -> Result<Vec<ReportMetadata>, ApiError>;
    async fn download_report(&self, report_id: &str) -> Result<Vec<u8>, ApiError>;
    fn report_download_url(&self, report_id: &str) -> Result<Url, ApiError>;

    async fn login(&self, username: &str, password: &str) -> Result<TokenResponse, ApiError>;
    async fn register(&self, req: &RegisterRequest) -> Result<UserProfile, ApiError>;
    async fn profile(&self) -> Result<UserProfile, ApiError>;
    async fn update_profile(&self, update: &ProfileUpdate) -> Result<UserProfile, ApiError>;
}

pub struct DnaFile {
    pub path: PathBuf,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Reads an export from disk after the size checks the backend would
/// otherwise reject it for.
pub async fn read_dna_file(path: &Path, max_bytes: u64) -> Result<DnaFile, ApiError> {
    let meta = tokio::fs::metadata(path).await?;
    let size = meta.len();
    if size == 0 {
        return Err(ApiError::EmptyFile(path.to_path_buf()));
    }
    if size > max_bytes {
        return Err(ApiError::FileTooLarge {
            path: path.to_path_buf(),
            size,
            limit: max_bytes,
        });
    }
    let bytes = tokio::fs::read(path).await?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("dna.txt")
        .to_string();
    Ok(DnaFile {
        path: path.to_path_buf(),
        file_name,
        bytes,
    })
}

pub struct HttpBackend {
    client: reqwest::Client,
    base_url: Url,
    session: Arc<SessionStore>,
    max_upload_bytes: u64,
    chunk_size: usize,
}

impl HttpBackend {
    pub fn new(config: &ClientConfig, session: Arc<SessionStore>) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: config.api_url.clone(),
            session,
            max_upload_bytes: config.max_upload_bytes,
            chunk_size: DEFAULT_CHUNK_SIZE,
        })
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                ApiError::InvalidInput(format!("api url {} cannot take a path", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Attaches the stored bearer token, if any.
    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match self.session.access_token() {
            Some(token) => req.bearer_auth(token.as_str()),
            None => req,
        }
    }

    async fn send(&self, req: RequestBuilder) -> Result<Response, ApiError> {
        self.dispatch(req, true).await
    }

    async fn dispatch(
        &self,
        req: RequestBuilder,
        clear_on_401: bool,
    ) -> Result<Response, ApiError> {
        let resp = self
            .authorize(req)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        self.check_status(resp, clear_on_401).await
    }

    /// A 401 means the stored credentials are no good, except on the login
    /// call itself where it only means the password was wrong.
    async fn check_status(
        &self,
        resp: Response,
        clear_on_401: bool,
    ) -> Result<Response, ApiError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        if status == StatusCode::UNAUTHORIZED {
            if clear_on_401 {
                warn!(url = %resp.url(), "401 from backend; clearing stored credentials");
                if let Err(e) = self.session.clear() {
                    warn!("failed to clear session after 401: {e}");
                }
            }
            return Err(ApiError::Unauthorized);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(ApiError::BadStatus {
            status,
            detail: extract_detail(&body),
        })
    }

    fn transport_error(&self, e: reqwest::Error) -> ApiError {
        if e.is_connect() || e.is_timeout() {
            ApiError::Network {
                base_url: self.base_url.to_string(),
                source: e,
            }
        } else {
            ApiError::Http(e)
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ApiError> {
        debug!(%url, "GET");
        let resp = self.send(self.client.get(url)).await?;
        decode(resp).await
    }

    async fn multipart_file(
        &self,
        path: &Path,
        progress: Option<watch::Sender<UploadProgress>>,
    ) -> Result<Form, ApiError> {
        let file = read_dna_file(path, self.max_upload_bytes).await?;
        let len = file.bytes.len() as u64;
        let part = match progress {
            Some(tx) => {
                let body = progress_body(file.bytes, self.chunk_size, Some(tx));
                Part::stream_with_length(body, len)
            }
            None => Part::bytes(file.bytes),
        }
        .file_name(file.file_name)
        .mime_str("text/plain")?;
        Ok(Form::new().part("file", part))
    }
}

#[async_trait]
impl Backend for HttpBackend {
    fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn upload_dna(
        &self,
        path: &Path,
        progress: Option<watch::Sender<UploadProgress>>,
    ) -> Result<DnaUploadResponse, ApiError> {
        let url = self.endpoint(&["dna", "upload"])?;
        let form = self.multipart_file(path, progress).await?;
        debug!(%url, file = %path.display(), "POST upload");
        let resp = self.send(self.client.post(url).multipart(form)).await?;
        decode(resp).await
    }

    async fn validate_dna(&self, path: &Path) -> Result<ValidationResponse, ApiError> {
        let url = self.endpoint(&["dna", "validate"])?;
        let form = self.multipart_file(path, None).await?;
        debug!(%url, file = %path.display(), "POST validate");
        let resp = self.send(self.client.post(url).multipart(form)).await?;
        decode(resp).await
    }

    async fn supported_formats(&self) -> Result<FormatsResponse, ApiError> {
        self.get_json(self.endpoint(&["dna", "formats"])?).await
    }

    async fn snp_data(&self, file_hash: &str) -> Result<SnpDataResponse, ApiError> {
        self.get_json(self.endpoint(&["dna", "data", file_hash])?)
            .await
    }

    async fn list_uploads(&self, limit: u32, offset: u32) -> Result<UploadListResponse, ApiError> {
        let mut url = self.endpoint(&["dna", "uploads"])?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string())
            .append_pair("offset", &offset.to_string());
        self.get_json(url).await
    }

    async fn process_analysis(&self, req: &AnalysisRequest) -> Result<AnalysisResponse, ApiError> {
        let url = self.endpoint(&["analysis", "process"])?;
        debug!(%url, "POST analysis");
        let resp = self.send(self.client.post(url).json(req)).await?;
        decode(resp).await
    }

    async fn analysis_result(&self, analysis_id: &str) -> Result<AnalysisResult, ApiError> {
        self.get_json(self.endpoint(&["analysis", analysis_id])?)
            .await
    }

    async fn analysis_exists(&self, file_hash: &str) -> bool {
        let url = match self.endpoint(&["analysis", "exists", file_hash]) {
            Ok(u) => u,
            Err(_) => return false,
        };
        match self.get_json::<AnalysisExists>(url).await {
            Ok(r) => r.exists,
            Err(e) => {
                debug!("analysis exists check failed: {e}");
                false
            }
        }
    }

    async fn generate_report(&self, req: &ReportRequest) -> Result<ReportResponse, ApiError> {
        let url = self.endpoint(&["reports", "generate"])?;
        debug!(%url, report_type = req.report_type.as_str(), "POST report");
        let resp = self.send(self.client.post(url).json(req)).await?;
        decode(resp).await
    }

    async fn report_metadata(&self, report_id: &str) -> Result<ReportMetadata, ApiError> {
        self.get_json(self.endpoint(&["reports", report_id])?).await
    }

    async fn user_reports(&self) -> Result<Vec<ReportMetadata>, ApiError> {
        self.get_json(self.endpoint(&["reports", "user"])?).await
    }

    async fn download_report(&self, report_id: &str) -> Result<Vec<u8>, ApiError> {
        let url = self.report_download_url(report_id)?;
        debug!(%url, "GET report download");
        let resp = self.send(self.client.get(url)).await?;
        Ok(resp.bytes().await?.to_vec())
    }

    fn report_download_url(&self, report_id: &str) -> Result<Url, ApiError> {
        self.endpoint(&["reports", report_id, "download"])
    }

    async fn login(&self, username: &str, password: &str) -> Result<TokenResponse, ApiError> {
        let url = self.endpoint(&["auth", "login"])?;
        debug!(%url, %username, "POST login");
        let form = [("username", username), ("password", password)];
        let resp = self.dispatch(self.client.post(url).form(&form), false).await?;
        decode(resp).await
    }

    async fn register(&self, req: &RegisterRequest) -> Result<UserProfile, ApiError> {
        let url = self.endpoint(&["auth", "register"])?;
        debug!(%url, username = %req.username, "POST register");
        let resp = self.send(self.client.post(url).json(req)).await?;
        decode(resp).await
    }

    async fn profile(&self) -> Result<UserProfile, ApiError> {
        self.get_json(self.endpoint(&["auth", "me"])?).await
    }

    async fn update_profile(&self, update: &ProfileUpdate) -> Result<UserProfile, ApiError> {
        let url = self.endpoint(&["auth", "me"])?;
        debug!(%url, "PUT profile");
        let resp = self.send(self.client.put(url).json(update)).await?;
        decode(resp).await
    }
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, ApiError> {
    let body = resp.text().await?;
    serde_json::from_str(&body)
        .map_err(|e| ApiError::Decode(format!("{e}: {}", truncate_chars(&body, 400))))
}

/// Pulls a readable message out of an error body. Handles plain
/// `{"detail": "..."}` as well as validation errors where `detail` is a list.
pub fn extract_detail(body: &str) -> String {
    let Ok(v) = serde_json::from_str::<serde_json::Value>(body) else {
        return truncate_chars(body.trim(), 300);
    };
    match v.get("detail") {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|i| i.get("msg").and_then(|m| m.as_str()))
            .collect::<Vec<_>>()
            .join("; "),
        Some(other) => other.to_string(),
        None => truncate_chars(body.trim(), 300),
    }
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_chars).collect();
    out.push('…');
    out
}
