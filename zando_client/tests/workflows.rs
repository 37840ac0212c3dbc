mod common;

use common::{
    analysis_result_body, app_for, config_for, raw_route, route, upload_body, write_dna_file,
    MockServer,
};
use serde_json::json;
use zando_client::analysis_state::AnalysisStatus;
use zando_client::notifications::Severity;
use zando_client::progress::progress_channel;
use zando_client::{ApiError, App};
use zando_protocol::{ProfileUpdate, RegisterRequest, ReportType};

fn last_toast(app: &App) -> zando_client::notifications::Notification {
    app.notifications.active().pop().expect("a notification was shown")
}

#[tokio::test]
async fn failed_upload_leaves_the_current_analysis_alone() {
    let server = MockServer::start(vec![route(
        "POST",
        "/dna/upload",
        500,
        json!({"detail": "disk full"}),
    )])
    .await;
    let dir = tempfile::tempdir().unwrap();
    let file = write_dna_file(dir.path(), "genome.txt");
    let app = app_for(&server.base_url, dir.path());

    app.select(Some("hash-old".into()), Some("an-old".into()));
    let before = app.analysis();

    let err = app.upload(&file, None).await.unwrap_err();
    assert_eq!(err.status().map(|s| s.as_u16()), Some(500));
    assert_eq!(app.analysis(), before);

    let toast = last_toast(&app);
    assert_eq!(toast.severity, Severity::Error);
    assert_eq!(toast.message, "Error uploading file");
    assert_eq!(toast.detail.as_deref(), Some("disk full"));
}

#[tokio::test]
async fn network_failure_toast_names_the_api() {
    let port = {
        let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        l.local_addr().unwrap().port()
    };
    let base = format!("http://127.0.0.1:{port}/api/v1");
    let dir = tempfile::tempdir().unwrap();
    let file = write_dna_file(dir.path(), "genome.txt");
    let app = app_for(&base, dir.path());

    let err = app.upload(&file, None).await.unwrap_err();
    assert!(err.is_network());
    assert_eq!(app.analysis().status, AnalysisStatus::Idle);

    let toast = last_toast(&app);
    assert_eq!(toast.message, "API connection error");
    assert!(toast.detail.unwrap().contains(&base));
}

#[tokio::test]
async fn upload_analyze_report_download() {
    let server = MockServer::start(vec![
        route("POST", "/dna/upload", 200, upload_body("hash-1")),
        route(
            "POST",
            "/analysis/process",
            200,
            json!({"analysis_id": "an-1", "status": "success", "message": "done", "snp_count": 2}),
        ),
        route("GET", "/analysis/an-1", 200, analysis_result_body("an-1")),
        route(
            "POST",
            "/reports/generate",
            200,
            json!({
                "report_id": "rep-1",
                "status": "success",
                "message": "ok",
                "download_url": "/reports/rep-1/download"
            }),
        ),
        raw_route("GET", "/reports/rep-1/download", "text/markdown", b"# Report\n".to_vec()),
    ])
    .await;
    let dir = tempfile::tempdir().unwrap();
    let file = write_dna_file(dir.path(), "genome.txt");
    let app = app_for(&server.base_url, dir.path());

    let (tx, rx) = progress_channel(0);
    let uploaded = app.upload(&file, Some(tx)).await.unwrap();
    assert_eq!(uploaded.file_hash, "hash-1");
    assert!(rx.borrow().is_complete());

    let s = app.analysis();
    assert_eq!(s.status, AnalysisStatus::Uploaded);
    assert_eq!(s.file_name.as_deref(), Some("genome.txt"));
    assert_eq!(s.snp_count, Some(2));
    assert_eq!(last_toast(&app).message, "File successfully uploaded");

    let result = app.analyze(false).await.unwrap();
    assert_eq!(result.analysis_id, "an-1");
    let process_req = server
        .requests()
        .into_iter()
        .find(|r| r.path == "/api/v1/analysis/process")
        .unwrap();
    assert_eq!(
        process_req.json(),
        json!({"file_hash": "hash-1", "force_refresh": false})
    );

    let s = app.analysis();
    assert_eq!(s.status, AnalysisStatus::Analyzed);
    assert_eq!(s.analysis_id.as_deref(), Some("an-1"));
    assert_eq!(s.data.unwrap().mutations.len(), 1);

    let report = app.generate_report(ReportType::Markdown).await.unwrap();
    assert_eq!(report.report_id, "rep-1");
    assert_eq!(
        server.last().json(),
        json!({
            "file_hash": "hash-1",
            "analysis_id": "an-1",
            "report_type": "markdown",
            "include_raw_data": false
        })
    );
    let toast = last_toast(&app);
    assert_eq!(toast.message, "Report generated successfully");
    assert_eq!(toast.detail.as_deref(), Some("New report created"));

    let out = dir.path().join("report.md");
    let written = app.download_report("rep-1", &out).await.unwrap();
    assert_eq!(written, 9);
    assert_eq!(std::fs::read_to_string(&out).unwrap(), "# Report\n");
}

#[tokio::test]
async fn cached_report_says_so() {
    let server = MockServer::start(vec![route(
        "POST",
        "/reports/generate",
        200,
        json!({
            "report_id": "rep-2",
            "status": "success",
            "message": "ok",
            "download_url": "",
            "cached": true
        }),
    )])
    .await;
    let dir = tempfile::tempdir().unwrap();
    let app = app_for(&server.base_url, dir.path());
    app.select(None, Some("an-2".into()));

    app.generate_report(ReportType::Standard).await.unwrap();
    assert_eq!(last_toast(&app).detail.as_deref(), Some("Retrieved from cache"));
}

#[tokio::test]
async fn reports_and_analysis_need_something_to_work_on() {
    let server = MockServer::start(vec![]).await;
    let dir = tempfile::tempdir().unwrap();
    let app = app_for(&server.base_url, dir.path());

    let err = app.generate_report(ReportType::Markdown).await.unwrap_err();
    assert!(matches!(err, ApiError::MissingAnalysis));
    let toast = last_toast(&app);
    assert_eq!(toast.severity, Severity::Error);
    assert_eq!(toast.message, "No analysis data available");

    let err = app.analyze(false).await.unwrap_err();
    assert!(matches!(err, ApiError::MissingAnalysis));

    assert!(server.requests().is_empty());
}

#[tokio::test]
async fn analysis_failure_is_recorded_in_state() {
    let server = MockServer::start(vec![route(
        "POST",
        "/analysis/process",
        404,
        json!({"detail": "File not found"}),
    )])
    .await;
    let dir = tempfile::tempdir().unwrap();
    let app = app_for(&server.base_url, dir.path());
    app.select(Some("hash-x".into()), None);

    app.analyze(true).await.unwrap_err();
    let s = app.analysis();
    assert_eq!(s.status, AnalysisStatus::Error);
    assert_eq!(s.error.as_deref(), Some("File not found"));
    assert_eq!(s.file_hash.as_deref(), Some("hash-x"));
    assert_eq!(last_toast(&app).message, "Analysis failed");
}

#[tokio::test]
async fn guarded_workflows_require_a_session() {
    let server =
        MockServer::start(vec![route("POST", "/dna/upload", 200, upload_body("hash-1"))]).await;
    let dir = tempfile::tempdir().unwrap();
    let file = write_dna_file(dir.path(), "genome.txt");
    let mut cfg = config_for(&server.base_url, dir.path());
    cfg.require_auth = true;
    let app = App::from_config(cfg).unwrap();

    let err = app.upload(&file, None).await.unwrap_err();
    assert!(matches!(err, ApiError::LoginRequired));
    assert!(err.requires_login());
    assert_eq!(last_toast(&app).severity, Severity::Warning);
    assert!(server.requests().is_empty());

    app.session.set_access_token("tok").unwrap();
    app.upload(&file, None).await.unwrap();
    assert_eq!(server.last().authorization.as_deref(), Some("Bearer tok"));
}

#[tokio::test]
async fn register_logs_in_and_caches_the_profile() {
    let server = MockServer::start(vec![
        route(
            "POST",
            "/auth/register",
            200,
            json!({"id": 3, "username": "ada", "email": "ada@example.com"}),
        ),
        route("POST", "/auth/login", 200, json!({"access_token": "tok-3", "token_type": "bearer"})),
        route(
            "GET",
            "/auth/me",
            200,
            json!({"id": 3, "username": "ada", "email": "ada@example.com", "is_active": true}),
        ),
    ])
    .await;
    let dir = tempfile::tempdir().unwrap();
    let app = app_for(&server.base_url, dir.path());

    let profile = app
        .register(RegisterRequest {
            username: "ada".into(),
            email: "ada@example.com".into(),
            password: "s3cret".into(),
        })
        .await
        .unwrap();
    assert_eq!(profile.id, 3);

    let paths: Vec<String> = server.requests().into_iter().map(|r| r.path).collect();
    assert_eq!(
        paths,
        vec!["/api/v1/auth/register", "/api/v1/auth/login", "/api/v1/auth/me"]
    );
    assert_eq!(server.last().authorization.as_deref(), Some("Bearer tok-3"));
    assert_eq!(app.session.user(), Some(profile));
    assert_eq!(last_toast(&app).message, "Logged in as ada");
}

#[tokio::test]
async fn bad_credentials_show_a_login_failure() {
    let server = MockServer::start(vec![route(
        "POST",
        "/auth/login",
        401,
        json!({"detail": "Incorrect username or password"}),
    )])
    .await;
    let dir = tempfile::tempdir().unwrap();
    let app = app_for(&server.base_url, dir.path());

    let err = app.login("ada", "wrong").await.unwrap_err();
    assert!(matches!(err, ApiError::Unauthorized));
    let toast = last_toast(&app);
    assert_eq!(toast.message, "Login failed");
    assert_eq!(toast.detail.as_deref(), Some("Please check your credentials."));
    assert!(!app.session.is_authenticated());
}

#[tokio::test]
async fn empty_profile_update_is_rejected_locally() {
    let server = MockServer::start(vec![]).await;
    let dir = tempfile::tempdir().unwrap();
    let app = app_for(&server.base_url, dir.path());

    let err = app.update_profile(ProfileUpdate::default()).await.unwrap_err();
    assert!(matches!(err, ApiError::InvalidInput(_)));
    assert!(server.requests().is_empty());
}

#[tokio::test]
async fn logout_forgets_the_token() {
    let server = MockServer::start(vec![]).await;
    let dir = tempfile::tempdir().unwrap();
    let app = app_for(&server.base_url, dir.path());
    app.session.set_access_token("tok").unwrap();

    app.logout().unwrap();
    assert!(!app.session.is_authenticated());
    assert_eq!(app.account().await.unwrap().map(|_| ()), None);
}
