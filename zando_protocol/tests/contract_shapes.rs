use zando_protocol::{
    mutations_by_category, AnalysisRequest, AnalysisResult, DnaUploadResponse, ProfileUpdate,
    ReportRequest, ReportType, TokenResponse, ValidationResponse,
};

#[test]
fn upload_response_accepts_backend_field_aliases() {
    let body = r#"{
        "filename": "genome.txt",
        "file_hash": "abc123",
        "status": "success",
        "size": 2048,
        "timestamp": "2024-03-01T10:00:00",
        "message": "File uploaded and cached successfully"
    }"#;
    let resp: DnaUploadResponse = serde_json::from_str(body).expect("valid upload body");
    assert_eq!(resp.file_name, "genome.txt");
    assert_eq!(resp.file_size, 2048);
    assert_eq!(resp.upload_date, "2024-03-01T10:00:00");
    assert_eq!(resp.snp_count, None);
    assert!(!resp.cached);
}

#[test]
fn validation_response_reads_nested_stats() {
    let body = r#"{
        "valid": true,
        "format": "23andMe",
        "stats": {"line_count": 10, "valid_snps": 8, "invalid_lines": 2, "chromosomes": ["1", "X"]}
    }"#;
    let resp: ValidationResponse = serde_json::from_str(body).expect("valid validation body");
    assert!(resp.valid);
    assert_eq!(resp.stats.valid_snps, 8);
    assert_eq!(resp.stats.chromosomes, vec!["1".to_string(), "X".to_string()]);
    assert!(resp.errors.is_empty());
}

#[test]
fn analysis_request_omits_unset_identifiers() {
    let req = AnalysisRequest {
        file_hash: Some("abc".to_string()),
        analysis_id: None,
        force_refresh: true,
    };
    let v = serde_json::to_value(&req).unwrap();
    assert_eq!(v["file_hash"], "abc");
    assert_eq!(v["force_refresh"], true);
    assert!(v.get("analysis_id").is_none());
}

#[test]
fn report_request_defaults_to_markdown() {
    let req = ReportRequest {
        analysis_id: Some("an-1".to_string()),
        ..Default::default()
    };
    let v = serde_json::to_value(&req).unwrap();
    assert_eq!(v["report_type"], "markdown");
    assert_eq!(v["include_raw_data"], false);
    assert!(v.get("file_hash").is_none());

    assert_eq!("PDF".parse::<ReportType>().unwrap(), ReportType::Standard);
    assert!("html".parse::<ReportType>().is_err());
}

#[test]
fn token_type_defaults_to_bearer() {
    let t: TokenResponse = serde_json::from_str(r#"{"access_token":"tok"}"#).unwrap();
    assert_eq!(t.token_type, "bearer");
}

#[test]
fn profile_update_only_sends_set_fields() {
    let update = ProfileUpdate {
        email: Some("new@example.com".to_string()),
        ..Default::default()
    };
    assert!(!update.is_empty());
    let v = serde_json::to_value(&update).unwrap();
    assert_eq!(v.as_object().unwrap().len(), 1);
    assert!(ProfileUpdate::default().is_empty());
}

#[test]
fn analysis_result_groups_mutations() {
    let body = r#"{
        "analysis_id": "an-1",
        "created_at": "2024-03-01T10:00:00",
        "data": {
            "mutations": [
                {
                    "rsid": "rs1805007",
                    "gene_name": "MC1R",
                    "allele": "T",
                    "effect": "fair skin",
                    "evidence_level": "strong",
                    "category": "pigmentation"
                },
                {
                    "rsid": "rs1800795",
                    "gene_name": "IL6",
                    "allele": "C",
                    "effect": "inflammation",
                    "evidence_level": "moderate",
                    "category": "inflammation"
                },
                {
                    "rsid": "rs2228479",
                    "gene_name": "MC1R",
                    "allele": "A",
                    "effect": "freckling",
                    "evidence_level": "moderate",
                    "category": "pigmentation"
                }
            ],
            "ingredient_recommendations": {
                "beneficial": [{"name": "Niacinamide", "benefit": "barrier support"}],
                "cautionary": [{"name": "Retinol", "caution": "irritation"}]
            },
            "summary": "Two pigmentation markers."
        }
    }"#;
    let result: AnalysisResult = serde_json::from_str(body).unwrap();
    let counts = mutations_by_category(&result.data);
    assert_eq!(counts.get("pigmentation"), Some(&2));
    assert_eq!(counts.get("inflammation"), Some(&1));
    assert_eq!(result.data.ingredient_recommendations.cautionary[0].name, "Retinol");
}
