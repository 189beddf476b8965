//! Integration tests for the API Server
//!
//! Drives the HTTP endpoints end-to-end: health checks, aggregation modes,
//! snapshot assembly, blog reads, and the passcode-gated admin console.


use axum::http::{HeaderName, HeaderValue};
use axum_test::TestRequest;
use serde_json::{json, Value};

use test_utils::{TestApiServer, TEST_PASSCODE};

fn with_auth(request: TestRequest) -> TestRequest {
    request.add_header(
        HeaderName::from_static("x-admin-passcode"),
        HeaderValue::from_static(TEST_PASSCODE),
    )
}

#[tokio::test]
async fn health_endpoint_reports_healthy_status() {
    let app = TestApiServer::new().await;
    let response = app.server.get("/health").await;
    assert_eq!(response.status_code(), 200);

    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
    assert!(body["uptime_seconds"].as_u64().is_some());
    assert_eq!(body["service"], "banggia-price-api");
}

#[tokio::test]
async fn metrics_endpoint_exposes_prometheus_metrics() {
    let app = TestApiServer::new().await;
    let _ = app.server.get("/health").await;

    let response = app.server.get("/metrics").await;
    assert_eq!(response.status_code(), 200);

    let body = response.text();
    assert!(
        body.contains("http_requests_total"),
        "Expected http_requests_total metric"
    );
    assert!(
        body.contains("http_request_duration_seconds"),
        "Expected http_request_duration_seconds metric"
    );
}

#[tokio::test]
async fn unknown_series_is_reported_as_series_not_found() {
    let app = TestApiServer::new().await;
    let response = app.server.get("/api/prices/KHONG_TON_TAI").await;
    assert_eq!(response.status_code(), 404);

    let body: Value = response.json();
    assert_eq!(body["kind"], "series_not_found");
    assert_eq!(body["code"], "KHONG_TON_TAI");
}

#[tokio::test]
async fn series_code_lookup_is_case_insensitive() {
    let app = TestApiServer::new().await;
    let series = app.seed_series("GA_TRANG_MB", "Gà trắng").await;
    app.seed_point(series.id, "MIEN_BAC", Some("CP"), (2025, 3, 12), 34000.0)
        .await;

    let response = app
        .server
        .get("/api/prices/ga_trang_mb?region=MB&company=CP&range=0")
        .await;
    assert_eq!(response.status_code(), 200);
}

#[tokio::test]
async fn empty_region_is_no_data_not_a_generic_error() {
    let app = TestApiServer::new().await;
    let series = app.seed_series("GA_TRANG_MB", "Gà trắng").await;
    app.seed_point(series.id, "MIEN_BAC", None, (2025, 3, 12), 34000.0)
        .await;

    let response = app
        .server
        .get("/api/prices/GA_TRANG_MB?region=MIEN_TRUNG&range=0")
        .await;
    assert_eq!(response.status_code(), 404);

    let body: Value = response.json();
    assert_eq!(body["kind"], "no_data");
    assert_eq!(body["region"], "MIEN_TRUNG");
    assert_eq!(body["product"], "GA_TRANG");
}

#[tokio::test]
async fn single_region_with_company_returns_flat_points() {
    let app = TestApiServer::new().await;
    let series = app.seed_series("GA_TRANG_MB", "Gà trắng").await;
    app.seed_recent_point(series.id, "MIEN_BAC", Some("CP"), 2, 33500.0)
        .await;
    app.seed_recent_point(series.id, "MIEN_BAC", Some("CP"), 1, 34000.0)
        .await;
    app.seed_recent_point(series.id, "MIEN_BAC", Some("Japfa"), 1, 33000.0)
        .await;

    let response = app
        .server
        .get("/api/prices/GA_TRANG_MB?region=MB&company=CP&range=7")
        .await;
    assert_eq!(response.status_code(), 200);

    let body: Value = response.json();
    assert_eq!(body["series"]["code"], "GA_TRANG_MB");
    assert_eq!(body["series"]["region"], "MIEN_BAC");
    assert_eq!(body["series"]["product"], "GA_TRANG");
    let points = body["points"].as_array().expect("points array");
    assert_eq!(points.len(), 2);
    // Ascending by timestamp: the 2-day-old point first.
    assert_eq!(points[0]["value"], 33500.0);
    assert_eq!(points[1]["value"], 34000.0);
    assert!(body.get("regions").is_none());
    assert!(body.get("companies").is_none());
}

#[tokio::test]
async fn single_region_without_company_groups_by_company() {
    let app = TestApiServer::new().await;
    let series = app.seed_series("GA_TRANG_MB", "Gà trắng").await;
    app.seed_point(series.id, "MIEN_BAC", Some("CP"), (2025, 3, 12), 34000.0)
        .await;
    app.seed_point(series.id, "MIEN_BAC", Some("Japfa"), (2025, 3, 12), 33800.0)
        .await;
    app.seed_point(series.id, "MIEN_BAC", None, (2025, 3, 12), 34200.0)
        .await;

    let response = app
        .server
        .get("/api/prices/GA_TRANG_MB?region=MB&range=0")
        .await;
    assert_eq!(response.status_code(), 200);

    let body: Value = response.json();
    let companies = body["companies"].as_object().expect("companies map");
    assert_eq!(companies.len(), 3);
    // The unspecified bucket keys as the literal "null".
    assert!(companies.contains_key("null"));
    assert!(companies.contains_key("CP"));
    assert!(companies.contains_key("Japfa"));
    assert_eq!(companies["null"][0]["value"], 34200.0);
}

#[tokio::test]
async fn latest_mode_returns_every_row_of_the_most_recent_day() {
    let app = TestApiServer::new().await;
    let series = app.seed_series("GA_TRANG_MB", "Gà trắng").await;
    // Three company rows on the latest day, one row the day before.
    app.seed_point(series.id, "MIEN_BAC", Some("CP"), (2025, 3, 12), 34000.0)
        .await;
    app.seed_point(series.id, "MIEN_BAC", Some("Japfa"), (2025, 3, 12), 33800.0)
        .await;
    app.seed_point(series.id, "MIEN_BAC", None, (2025, 3, 12), 34200.0)
        .await;
    app.seed_point(series.id, "MIEN_BAC", Some("CP"), (2025, 3, 11), 33000.0)
        .await;

    let response = app
        .server
        .get("/api/prices/GA_TRANG_MB?region=MB&range=0")
        .await;
    let body: Value = response.json();
    let companies = body["companies"].as_object().expect("companies map");
    let total: usize = companies.values().map(|v| v.as_array().map_or(0, |a| a.len())).sum();
    assert_eq!(total, 3, "only the latest day's rows should survive");
    assert_eq!(companies["CP"].as_array().expect("CP bucket").len(), 1);
}

#[tokio::test]
async fn company_null_filter_selects_unspecified_rows_only() {
    let app = TestApiServer::new().await;
    let series = app.seed_series("GA_TRANG_MB", "Gà trắng").await;
    app.seed_point(series.id, "MIEN_BAC", Some("CP"), (2025, 3, 12), 34000.0)
        .await;
    app.seed_point(series.id, "MIEN_BAC", None, (2025, 3, 12), 34200.0)
        .await;

    let response = app
        .server
        .get("/api/prices/GA_TRANG_MB?region=MB&company=null&range=0")
        .await;
    let body: Value = response.json();
    let points = body["points"].as_array().expect("points array");
    assert_eq!(points.len(), 1);
    assert_eq!(points[0]["value"], 34200.0);
}

#[tokio::test]
async fn unrecognized_range_falls_back_to_seven_days() {
    let app = TestApiServer::new().await;
    let series = app.seed_series("GA_TRANG_MB", "Gà trắng").await;
    app.seed_recent_point(series.id, "MIEN_BAC", None, 3, 34000.0)
        .await;
    app.seed_recent_point(series.id, "MIEN_BAC", None, 10, 30000.0)
        .await;

    let response = app
        .server
        .get("/api/prices/GA_TRANG_MB?region=MB&range=999")
        .await;
    let body: Value = response.json();
    let bucket = body["companies"]["null"].as_array().expect("null bucket");
    assert_eq!(bucket.len(), 1, "the 10-day-old point is outside the window");
    assert_eq!(bucket[0]["value"], 34000.0);
}

#[tokio::test]
async fn all_regions_range_mode_averages_per_timestamp() {
    let app = TestApiServer::new().await;
    let series = app.seed_series("GA_TRANG", "Gà trắng").await;
    app.seed_recent_point(series.id, "MIEN_BAC", None, 1, 10.0)
        .await;
    app.seed_recent_point(series.id, "MIEN_NAM", None, 1, 20.0)
        .await;

    let response = app
        .server
        .get("/api/prices/GA_TRANG?region=ALL&range=7")
        .await;
    assert_eq!(response.status_code(), 200);

    let body: Value = response.json();
    assert_eq!(body["series"]["region"], "ALL");
    let points = body["points"].as_array().expect("averaged points");
    assert_eq!(points.len(), 1);
    assert_eq!(points[0]["value"], 15.0);
    assert_eq!(points[0]["region"], "ALL");
    assert!(points[0]["source"].is_null());

    // The non-averaged per-region breakdown rides along.
    let regions = body["regions"].as_object().expect("regions map");
    assert_eq!(regions.len(), 2);
    assert_eq!(regions["MIEN_BAC"][0]["value"], 10.0);
    assert_eq!(regions["MIEN_NAM"][0]["value"], 20.0);
}

#[tokio::test]
async fn all_regions_latest_mode_is_region_local() {
    let app = TestApiServer::new().await;
    let series = app.seed_series("GA_TRANG", "Gà trắng").await;
    // MIEN_BAC's latest day is older than MIEN_NAM's.
    app.seed_point(series.id, "MIEN_BAC", None, (2025, 3, 12), 34000.0)
        .await;
    app.seed_point(series.id, "MIEN_NAM", None, (2025, 3, 13), 35000.0)
        .await;

    let response = app
        .server
        .get("/api/prices/GA_TRANG?region=ALL&range=0")
        .await;
    assert_eq!(response.status_code(), 200);

    let body: Value = response.json();
    let regions = body["regions"].as_object().expect("regions map");
    assert_eq!(regions.len(), 2);
    // Each region keeps its own latest day; nothing is averaged away.
    assert_eq!(regions["MIEN_BAC"][0]["value"], 34000.0);
    assert_eq!(regions["MIEN_NAM"][0]["value"], 35000.0);
    assert!(body["points"].as_array().expect("points").is_empty());
}

#[tokio::test]
async fn multi_region_comparison_omits_empty_regions() {
    let app = TestApiServer::new().await;
    let series = app.seed_series("GA_TRANG", "Gà trắng").await;
    app.seed_point(series.id, "MIEN_BAC", None, (2025, 3, 12), 34000.0)
        .await;

    let response = app
        .server
        .get("/api/prices/GA_TRANG?regions=MIEN_BAC,MIEN_TRUNG&range=0")
        .await;
    assert_eq!(response.status_code(), 200);

    let body: Value = response.json();
    let regions = body["regions"].as_object().expect("regions map");
    assert_eq!(regions.len(), 1);
    assert!(regions.contains_key("MIEN_BAC"));
}

#[tokio::test]
async fn multi_region_comparison_with_no_data_anywhere_fails() {
    let app = TestApiServer::new().await;
    app.seed_series("GA_TRANG", "Gà trắng").await;

    let response = app
        .server
        .get("/api/prices/GA_TRANG?regions=MIEN_BAC,MIEN_TRUNG&range=0")
        .await;
    assert_eq!(response.status_code(), 404);

    let body: Value = response.json();
    assert_eq!(body["kind"], "no_data");
    assert_eq!(body["region"], "MIEN_BAC,MIEN_TRUNG");
    assert_eq!(body["product"], "GA_TRANG");
}

#[tokio::test]
async fn failing_region_is_absorbed_as_empty() {
    let app = TestApiServer::new().await;
    let series = app.seed_series("GA_TRANG", "Gà trắng").await;
    app.seed_point(series.id, "MIEN_BAC", None, (2025, 3, 12), 34000.0)
        .await;
    app.store.fail_region("MIEN_TRUNG");

    let response = app
        .server
        .get("/api/prices/GA_TRANG?regions=MIEN_BAC,MIEN_TRUNG&range=0")
        .await;
    assert_eq!(response.status_code(), 200);

    let body: Value = response.json();
    let regions = body["regions"].as_object().expect("regions map");
    assert_eq!(regions.len(), 1);
    assert!(regions.contains_key("MIEN_BAC"));
}

#[tokio::test]
async fn all_regions_failing_is_a_storage_error_not_no_data() {
    let app = TestApiServer::new().await;
    let series = app.seed_series("GA_TRANG", "Gà trắng").await;
    app.seed_point(series.id, "MIEN_BAC", None, (2025, 3, 12), 34000.0)
        .await;
    app.store.fail_region("MIEN_BAC");
    app.store.fail_region("MIEN_TRUNG");

    let response = app
        .server
        .get("/api/prices/GA_TRANG?regions=MIEN_BAC,MIEN_TRUNG&range=0")
        .await;
    assert_eq!(response.status_code(), 500);

    let body: Value = response.json();
    assert_eq!(body["kind"], "storage");
}

#[tokio::test]
async fn csv_export_flattens_the_query_result() {
    let app = TestApiServer::new().await;
    let series = app.seed_series("GA_TRANG_MB", "Gà trắng").await;
    app.seed_point(series.id, "MIEN_BAC", Some("CP"), (2025, 3, 12), 34000.0)
        .await;

    let response = app
        .server
        .get("/api/prices/GA_TRANG_MB/export?region=MB&range=0")
        .await;
    assert_eq!(response.status_code(), 200);
    assert!(response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/csv")));

    let body = response.text();
    let mut lines = body.lines();
    assert_eq!(
        lines.next(),
        Some("ts,region,company,value,value_min,value_max,source")
    );
    let row = lines.next().expect("one data row");
    assert!(row.contains("MIEN_BAC"));
    assert!(row.contains("34000"));
}

#[tokio::test]
async fn snapshot_is_display_ordered_with_compact_values() {
    let app = TestApiServer::new().await;
    let ga = app.seed_series("GA_TRANG_MB", "Gà trắng").await;
    let heo = app.seed_series("HEO_HOI_MN", "Heo hơi").await;
    app.seed_recent_range(ga.id, "MIEN_BAC", 1, 33000.0, 36000.0)
        .await;
    app.seed_recent_point(ga.id, "MIEN_BAC", Some("CP"), 1, 34000.0)
        .await;
    app.seed_recent_point(heo.id, "MIEN_NAM", None, 1, 56000.0)
        .await;

    let response = app.server.get("/api/snapshot").await;
    assert_eq!(response.status_code(), 200);

    let body: Value = response.json();
    let rows = body["rows"].as_array().expect("snapshot rows");
    assert_eq!(rows.len(), 3);

    // Series name first, then region order, then unspecified-company first.
    assert_eq!(rows[0]["series_name"], "Gà trắng");
    assert!(rows[0]["company"].is_null());
    assert_eq!(rows[0]["display_value"], "33k - 36k");
    assert_eq!(rows[1]["company"], "CP");
    assert_eq!(rows[1]["display_value"], "34k");
    assert_eq!(rows[2]["series_name"], "Heo hơi");
    assert_eq!(rows[2]["display_value"], "56k");
}

#[tokio::test]
async fn published_posts_are_public_and_drafts_are_not() {
    let app = TestApiServer::new().await;
    let create = with_auth(app.server.post("/api/admin/posts")).json(&json!({
        "slug": "gia-ga-tuan-nay",
        "title": "Giá gà tuần này",
        "body": "Nội dung...",
        "published": false
    }));
    assert_eq!(create.await.status_code(), 200);

    let listed: Value = app.server.get("/api/posts").await.json();
    assert_eq!(listed.as_array().expect("posts array").len(), 0);
    assert_eq!(
        app.server.get("/api/posts/gia-ga-tuan-nay").await.status_code(),
        404
    );

    let publish = with_auth(app.server.put("/api/admin/posts/gia-ga-tuan-nay")).json(&json!({
        "slug": "gia-ga-tuan-nay",
        "title": "Giá gà tuần này",
        "body": "Nội dung...",
        "published": true
    }));
    assert_eq!(publish.await.status_code(), 200);

    let post: Value = app.server.get("/api/posts/gia-ga-tuan-nay").await.json();
    assert_eq!(post["title"], "Giá gà tuần này");
    assert_eq!(post["published"], true);
}

#[tokio::test]
async fn admin_routes_require_the_passcode() {
    let app = TestApiServer::new().await;
    let response = app
        .server
        .post("/api/admin/series")
        .json(&json!({ "code": "X", "name": "X", "unit": "VND/kg" }))
        .await;
    assert_eq!(response.status_code(), 401);
}

#[tokio::test]
async fn repeated_bad_passcodes_lock_the_client_out() {
    let app = TestApiServer::new().await;
    let bad_header = (
        HeaderName::from_static("x-admin-passcode"),
        HeaderValue::from_static("wrong"),
    );

    for _ in 0..2 {
        let response = app
            .server
            .get("/api/admin/series")
            .add_header(bad_header.0.clone(), bad_header.1.clone())
            .await;
        assert_eq!(response.status_code(), 401);
    }
    let locked = app
        .server
        .get("/api/admin/series")
        .add_header(bad_header.0.clone(), bad_header.1.clone())
        .await;
    assert_eq!(locked.status_code(), 429);

    // Even the right passcode is refused while locked out.
    let still_locked = with_auth(app.server.get("/api/admin/series")).await;
    assert_eq!(still_locked.status_code(), 429);
}

#[tokio::test]
async fn admin_console_is_disabled_without_a_configured_passcode() {
    let app = TestApiServer::without_passcode().await;
    let response = with_auth(app.server.get("/api/admin/series")).await;
    assert_eq!(response.status_code(), 503);
}

#[tokio::test]
async fn series_upsert_by_code_creates_then_updates() {
    let app = TestApiServer::new().await;
    let created: Value = with_auth(app.server.post("/api/admin/series"))
        .json(&json!({ "code": "ga_trang_mb", "name": "Gà trắng", "unit": "VND/kg" }))
        .await
        .json();
    assert_eq!(created["code"], "GA_TRANG_MB");

    let updated: Value = with_auth(app.server.post("/api/admin/series"))
        .json(&json!({ "code": "GA_TRANG_MB", "name": "Gà trắng miền Bắc", "unit": "VND/kg" }))
        .await
        .json();
    assert_eq!(updated["id"], created["id"]);
    assert_eq!(updated["name"], "Gà trắng miền Bắc");

    let all: Value = app.server.get("/api/series").await.json();
    assert_eq!(all.as_array().expect("series array").len(), 1);
}

#[tokio::test]
async fn invalid_price_submission_aggregates_violations() {
    let app = TestApiServer::new().await;
    let series = app.seed_series("GA_TRANG_MB", "Gà trắng").await;

    let response = with_auth(app.server.post("/api/admin/prices"))
        .json(&json!({
            "series_id": series.id,
            "region": "MB",
            "date": "not-a-date"
        }))
        .await;
    assert_eq!(response.status_code(), 422);

    let body: Value = response.json();
    assert_eq!(body["kind"], "validation");
    let violations = body["violations"].as_array().expect("violations array");
    assert_eq!(violations.len(), 2, "bad date and missing value");
}

#[tokio::test]
async fn price_range_submission_stores_the_midpoint() {
    let app = TestApiServer::new().await;
    let series = app.seed_series("GA_TRANG_MB", "Gà trắng").await;

    let stored: Value = with_auth(app.server.post("/api/admin/prices"))
        .json(&json!({
            "series_id": series.id,
            "region": "MB",
            "date": "2025-03-10",
            "value_min": 30000.0,
            "value_max": 36000.0
        }))
        .await
        .json();
    assert_eq!(stored["value"], 33000.0);
    assert_eq!(stored["value_min"], 30000.0);
    assert_eq!(stored["region"], "MIEN_BAC");
}

#[tokio::test]
async fn resubmitting_the_same_day_key_updates_in_place() {
    let app = TestApiServer::new().await;
    let series = app.seed_series("GA_TRANG_MB", "Gà trắng").await;

    for value in [33000.0, 34000.0] {
        let response = with_auth(app.server.post("/api/admin/prices"))
            .json(&json!({
                "series_id": series.id,
                "region": "MB",
                "date": "2025-03-10",
                "value": value
            }))
            .await;
        assert_eq!(response.status_code(), 200);
    }

    let body: Value = app
        .server
        .get("/api/prices/GA_TRANG_MB?region=MB&company=null&range=0")
        .await
        .json();
    let points = body["points"].as_array().expect("points array");
    assert_eq!(points.len(), 1, "second write must update, not duplicate");
    assert_eq!(points[0]["value"], 34000.0);
}

#[tokio::test]
async fn submitting_for_an_unknown_series_id_fails() {
    let app = TestApiServer::new().await;
    let response = with_auth(app.server.post("/api/admin/prices"))
        .json(&json!({
            "series_id": 9999,
            "region": "MB",
            "date": "2025-03-10",
            "value": 34000.0
        }))
        .await;
    assert_eq!(response.status_code(), 404);
}

#[tokio::test]
async fn price_delete_matches_the_exact_key() {
    let app = TestApiServer::new().await;
    let series = app.seed_series("GA_TRANG_MB", "Gà trắng").await;
    app.seed_point(series.id, "MIEN_BAC", Some("CP"), (2025, 3, 10), 33000.0)
        .await;

    let key = json!({
        "series_id": series.id,
        "region": "MB",
        "company": "CP",
        "date": "2025-03-10"
    });
    let deleted = with_auth(app.server.delete("/api/admin/prices"))
        .json(&key)
        .await;
    assert_eq!(deleted.status_code(), 204);

    let missing = with_auth(app.server.delete("/api/admin/prices"))
        .json(&key)
        .await;
    assert_eq!(missing.status_code(), 404);
}

#[tokio::test]
async fn deleting_a_series_removes_it_from_reads() {
    let app = TestApiServer::new().await;
    let series = app.seed_series("GA_TRANG_MB", "Gà trắng").await;
    app.seed_point(series.id, "MIEN_BAC", None, (2025, 3, 10), 33000.0)
        .await;

    let deleted = with_auth(app.server.delete("/api/admin/series/GA_TRANG_MB")).await;
    assert_eq!(deleted.status_code(), 204);

    let response = app.server.get("/api/prices/GA_TRANG_MB").await;
    assert_eq!(response.status_code(), 404);
    let body: Value = response.json();
    assert_eq!(body["kind"], "series_not_found");
}
