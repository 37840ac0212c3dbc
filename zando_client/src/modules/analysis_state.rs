use serde::Serialize;
use std::sync::{Arc, Mutex};
use tracing::debug;
use zando_protocol::AnalysisData;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    #[default]
    Idle,
    Uploaded,
    Analyzing,
    Analyzed,
    Error,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnalysisState {
    pub file_hash: Option<String>,
    pub file_name: Option<String>,
    pub snp_count: Option<u64>,
    pub analysis_id: Option<String>,
    pub status: AnalysisStatus,
    pub error: Option<String>,
    pub data: Option<AnalysisData>,
}

/// The one analysis a session works on. Every transition swaps in a whole new
/// state; readers only ever see snapshots.
#[derive(Clone, Default)]
pub struct AnalysisStore {
    inner: Arc<Mutex<AnalysisState>>,
}

impl AnalysisStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> AnalysisState {
        self.inner.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn replace(&self, next: AnalysisState) {
        self.transition(|_| next);
    }

    /// Read, rebuild and store under one guard so concurrent transitions
    /// cannot interleave.
    fn transition(&self, f: impl FnOnce(AnalysisState) -> AnalysisState) {
        let Ok(mut g) = self.inner.lock() else {
            return;
        };
        let next = f(std::mem::take(&mut *g));
        debug!(status = ?next.status, "analysis state changed");
        *g = next;
    }

    pub fn reset(&self) {
        self.replace(AnalysisState::default());
    }

    /// A fresh upload starts a new analysis; nothing from the previous one
    /// carries over.
    pub fn set_uploaded(
        &self,
        file_name: Option<String>,
        file_hash: String,
        snp_count: Option<u64>,
    ) {
        self.replace(AnalysisState {
            file_hash: Some(file_hash),
            file_name,
            snp_count,
            status: AnalysisStatus::Uploaded,
            ..Default::default()
        });
    }

    /// Points the session at a previously uploaded file or stored analysis.
    pub fn adopt(&self, file_hash: Option<String>, analysis_id: Option<String>) {
        self.replace(AnalysisState {
            file_hash,
            analysis_id,
            status: AnalysisStatus::Uploaded,
            ..Default::default()
        });
    }

    pub fn set_analyzing(&self, file_hash: Option<String>) {
        self.transition(|prev| AnalysisState {
            file_hash: file_hash.or(prev.file_hash),
            status: AnalysisStatus::Analyzing,
            error: None,
            ..prev
        });
    }

    pub fn set_analyzed(&self, analysis_id: String, snp_count: Option<u64>, data: AnalysisData) {
        self.transition(|prev| AnalysisState {
            analysis_id: Some(analysis_id),
            snp_count: snp_count.or(prev.snp_count),
            status: AnalysisStatus::Analyzed,
            error: None,
            data: Some(data),
            ..prev
        });
    }

    pub fn set_error(&self, message: impl Into<String>) {
        let message = message.into();
        self.transition(|prev| AnalysisState {
            status: AnalysisStatus::Error,
            error: Some(message),
            ..prev
        });
    }

    /// What a report can be generated from, if anything.
    pub fn report_source(&self) -> Option<(Option<String>, Option<String>)> {
        let s = self.snapshot();
        if s.file_hash.is_none() && s.analysis_id.is_none() {
            None
        } else {
            Some((s.file_hash, s.analysis_id))
        }
    }
}
