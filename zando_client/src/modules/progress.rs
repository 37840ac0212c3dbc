use futures_util::stream::{self, Stream};
use serde::Serialize;
use tokio::sync::watch;

pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UploadProgress {
    pub sent: u64,
    pub total: u64,
}

impl UploadProgress {
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        ((self.sent.min(self.total) * 100) / self.total) as u8
    }

    pub fn is_complete(&self) -> bool {
        self.sent >= self.total
    }
}

pub fn progress_channel(
    total: u64,
) -> (watch::Sender<UploadProgress>, watch::Receiver<UploadProgress>) {
    watch::channel(UploadProgress { sent: 0, total })
}

/// Splits `bytes` into chunks and publishes how much has been handed to the
/// consumer each time it pulls the next one.
pub fn chunked_progress_stream(
    bytes: Vec<u8>,
    chunk_size: usize,
    tx: Option<watch::Sender<UploadProgress>>,
) -> impl Stream<Item = Result<Vec<u8>, std::io::Error>> + Send + 'static {
    let total = bytes.len() as u64;
    let chunk_size = chunk_size.max(1);
    if let Some(tx) = &tx {
        let _ = tx.send(UploadProgress { sent: 0, total });
    }

    stream::unfold((bytes, 0usize, tx), move |(bytes, offset, tx)| async move {
        if offset >= bytes.len() {
            return None;
        }
        let end = (offset + chunk_size).min(bytes.len());
        let chunk = bytes[offset..end].to_vec();
        if let Some(tx) = &tx {
            let _ = tx.send(UploadProgress {
                sent: end as u64,
                total,
            });
        }
        Some((Ok(chunk), (bytes, end, tx)))
    })
}

pub fn progress_body(
    bytes: Vec<u8>,
    chunk_size: usize,
    tx: Option<watch::Sender<UploadProgress>>,
) -> reqwest::Body {
    reqwest::Body::wrap_stream(chunked_progress_stream(bytes, chunk_size, tx))
}
