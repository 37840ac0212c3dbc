#![allow(dead_code)]

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use zando_client::session::SessionStore;
use zando_client::{App, ClientConfig, HttpBackend};

#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub content_type: Option<String>,
    pub authorization: Option<String>,
    pub body: Vec<u8>,
}

impl Recorded {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("request body is json")
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Clone)]
pub enum Reply {
    Json(u16, Value),
    Bytes(u16, &'static str, Vec<u8>),
}

#[derive(Clone)]
pub struct Route {
    pub method: &'static str,
    pub path: String,
    pub reply: Reply,
}

pub fn route(method: &'static str, path: &str, status: u16, body: Value) -> Route {
    Route {
        method,
        path: format!("/api/v1{path}"),
        reply: Reply::Json(status, body),
    }
}

pub fn raw_route(
    method: &'static str,
    path: &str,
    content_type: &'static str,
    bytes: Vec<u8>,
) -> Route {
    Route {
        method,
        path: format!("/api/v1{path}"),
        reply: Reply::Bytes(200, content_type, bytes),
    }
}

struct MockState {
    routes: Vec<Route>,
    requests: Mutex<Vec<Recorded>>,
}

/// In-process stand-in for the analysis backend. Records every request and
/// answers from a fixed route table; anything else is a 404.
pub struct MockServer {
    pub base_url: String,
    state: Arc<MockState>,
}

impl MockServer {
    pub async fn start(routes: Vec<Route>) -> Self {
        let state = Arc::new(MockState {
            routes,
            requests: Mutex::new(Vec::new()),
        });
        let app = Router::new().fallback(handle).with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock server");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            base_url: format!("http://{addr}/api/v1"),
            state,
        }
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn last(&self) -> Recorded {
        self.requests().pop().expect("at least one request")
    }
}

async fn handle(State(state): State<Arc<MockState>>, req: Request) -> Response {
    let (parts, body) = req.into_parts();
    let body = axum::body::to_bytes(body, usize::MAX)
        .await
        .map(|b| b.to_vec())
        .unwrap_or_default();
    let header_str = |name: header::HeaderName| {
        parts
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    let recorded = Recorded {
        method: parts.method.to_string(),
        path: parts.uri.path().to_string(),
        query: parts.uri.query().map(str::to_string),
        content_type: header_str(header::CONTENT_TYPE),
        authorization: header_str(header::AUTHORIZATION),
        body,
    };
    state.requests.lock().unwrap().push(recorded.clone());

    let found = state
        .routes
        .iter()
        .find(|r| r.method == recorded.method && r.path == recorded.path);
    match found.map(|r| r.reply.clone()) {
        Some(Reply::Json(status, v)) => (
            StatusCode::from_u16(status).unwrap(),
            [(header::CONTENT_TYPE, "application/json")],
            v.to_string(),
        )
            .into_response(),
        Some(Reply::Bytes(status, ct, bytes)) => (
            StatusCode::from_u16(status).unwrap(),
            [(header::CONTENT_TYPE, ct)],
            Body::from(bytes),
        )
            .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            [(header::CONTENT_TYPE, "application/json")],
            r#"{"detail":"Not Found"}"#.to_string(),
        )
            .into_response(),
    }
}

pub fn config_for(base_url: &str, session_dir: &Path) -> ClientConfig {
    let mut cfg = ClientConfig::new(base_url, session_dir.to_path_buf()).expect("valid config");
    cfg.http_timeout = Duration::from_secs(5);
    cfg.require_auth = false;
    cfg
}

pub fn http_backend(base_url: &str, session_dir: &Path) -> (HttpBackend, Arc<SessionStore>) {
    let cfg = config_for(base_url, session_dir);
    let session = Arc::new(SessionStore::open(session_dir).expect("open session"));
    let backend = HttpBackend::new(&cfg, Arc::clone(&session)).expect("build backend");
    (backend, session)
}

pub fn app_for(base_url: &str, session_dir: &Path) -> App {
    App::from_config(config_for(base_url, session_dir)).expect("build app")
}

pub fn write_dna_file(dir: &Path, name: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(
        &path,
        concat!(
            "# rsid\tchromosome\tposition\tgenotype\n",
            "rs4477212\t1\t82154\tAA\n",
            "rs1805007\t16\t89986117\tCT\n",
        ),
    )
    .expect("write dna fixture");
    path
}

pub fn upload_body(hash: &str) -> Value {
    serde_json::json!({
        "file_hash": hash,
        "file_name": "genome.txt",
        "file_size": 86,
        "upload_date": "2024-03-01T10:00:00",
        "status": "success",
        "snp_count": 2,
        "format": "23andMe",
        "cached": false
    })
}

pub fn analysis_result_body(id: &str) -> Value {
    serde_json::json!({
        "analysis_id": id,
        "created_at": "2024-03-01T10:01:00",
        "file_hash": "hash-1",
        "data": {
            "mutations": [
                {
                    "rsid": "rs1805007",
                    "gene_name": "MC1R",
                    "allele": "T",
                    "effect": "Increased UV sensitivity",
                    "evidence_level": "Strong",
                    "category": "Pigmentation"
                }
            ],
            "ingredient_recommendations": {
                "beneficial": [{"name": "Niacinamide", "benefit": "Reduces hyperpigmentation"}],
                "cautionary": [{"name": "Hydroquinone", "caution": "May irritate sensitive skin"}]
            },
            "summary": "One pigmentation marker found."
        }
    })
}
