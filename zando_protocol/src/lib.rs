use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const DEFAULT_API_URL: &str = "http://localhost:8000/api/v1";

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DnaUploadResponse {
    pub file_hash: String,
    #[serde(alias = "filename", default)]
    pub file_name: String,
    #[serde(alias = "size", default)]
    pub file_size: u64,
    #[serde(alias = "timestamp", default)]
    pub upload_date: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub snp_count: Option<u64>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub cached: bool,
    #[serde(default)]
    pub processing_time: Option<f64>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ValidationStats {
    #[serde(default)]
    pub line_count: u64,
    #[serde(default)]
    pub valid_snps: u64,
    #[serde(default)]
    pub invalid_lines: u64,
    #[serde(default)]
    pub chromosomes: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ValidationResponse {
    pub valid: bool,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub stats: ValidationStats,
    #[serde(default)]
    pub errors: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "snake_case")]
pub enum SupportLevel {
    Full,
    Partial,
    Experimental,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FileFormat {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub example: Option<String>,
    #[serde(default)]
    pub support_level: Option<SupportLevel>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct FormatsResponse {
    #[serde(default)]
    pub formats: Vec<FileFormat>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Snp {
    pub rsid: String,
    pub chromosome: String,
    pub position: String,
    pub allele1: String,
    pub allele2: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SnpDataResponse {
    pub file_hash: String,
    #[serde(default)]
    pub snp_count: Option<u64>,
    #[serde(default)]
    pub snps: Vec<Snp>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub file_hash: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub extension: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct UploadListResponse {
    #[serde(default)]
    pub files: Vec<UploadedFile>,
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: Option<u32>,
}

/// Either `file_hash` or `analysis_id` identifies what to analyse.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct AnalysisRequest {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub file_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub analysis_id: Option<String>,
    #[serde(default)]
    pub force_refresh: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AnalysisResponse {
    pub analysis_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub snp_count: u64,
    #[serde(default)]
    pub file_hash: Option<String>,
    #[serde(default)]
    pub processing_time: Option<f64>,
    #[serde(default)]
    pub cached: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Mutation {
    pub rsid: String,
    #[serde(default)]
    pub gene_name: String,
    #[serde(default)]
    pub allele: String,
    #[serde(default)]
    pub effect: String,
    #[serde(default)]
    pub evidence_level: String,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct IngredientRecommendation {
    pub name: String,
    #[serde(default)]
    pub benefit: Option<String>,
    #[serde(default)]
    pub caution: Option<String>,
    #[serde(default)]
    pub genes: Vec<String>,
    #[serde(default)]
    pub evidence_level: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct IngredientRecommendations {
    #[serde(default)]
    pub beneficial: Vec<IngredientRecommendation>,
    #[serde(default)]
    pub cautionary: Vec<IngredientRecommendation>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct AnalysisData {
    #[serde(default)]
    pub mutations: Vec<Mutation>,
    #[serde(default)]
    pub ingredient_recommendations: IngredientRecommendations,
    #[serde(default)]
    pub summary: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AnalysisResult {
    pub analysis_id: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub file_hash: Option<String>,
    #[serde(default)]
    pub data: AnalysisData,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default)]
pub struct AnalysisExists {
    #[serde(default)]
    pub exists: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    Standard,
    #[default]
    Markdown,
}

impl ReportType {
    pub fn as_str(self) -> &'static str {
        match self {
            ReportType::Standard => "standard",
            ReportType::Markdown => "markdown",
        }
    }
}

impl std::str::FromStr for ReportType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" | "pdf" => Ok(ReportType::Standard),
            "markdown" | "md" => Ok(ReportType::Markdown),
            other => Err(format!("unknown report type {other:?} (expected standard|markdown)")),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ReportRequest {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub file_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub analysis_id: Option<String>,
    #[serde(default)]
    pub report_type: ReportType,
    #[serde(default)]
    pub include_raw_data: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ReportResponse {
    pub report_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub download_url: String,
    #[serde(default)]
    pub cached: bool,
    #[serde(default)]
    pub processing_time: Option<f64>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ReportMetadata {
    pub report_id: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub report_type: Option<ReportType>,
    #[serde(default)]
    pub file_hash: Option<String>,
    #[serde(default)]
    pub analysis_id: Option<String>,
    #[serde(default)]
    pub download_url: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Partial update for `PUT /auth/me`; unset fields are left out of the body.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub password: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.email.is_none() && self.password.is_none()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub created_at: String,
}

fn default_true() -> bool {
    true
}

/// Counts of mutations per category, used by summaries.
pub fn mutations_by_category(data: &AnalysisData) -> HashMap<String, usize> {
    let mut out: HashMap<String, usize> = HashMap::new();
    for m in &data.mutations {
        let key = m
            .category
            .clone()
            .unwrap_or_else(|| "uncategorized".to_string());
        *out.entry(key).or_default() += 1;
    }
    out
}
