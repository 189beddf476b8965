//! HTTP endpoint server using Axum

use axum::{
    extract::{Path, Query, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};

use crate::core::admin::{admin_router, AdminGate};
use crate::error::ApiError;
use crate::metrics::Metrics;
use crate::models::BlogPost;
use crate::prices::{build_snapshot, run_query, shape, PriceQuery, QueryOutcome, SeriesPayload};
use crate::services::price_store::PriceStore;

#[derive(Clone)]
pub struct AppState {
    pub health: Arc<RwLock<HealthStatus>>,
    pub metrics: Arc<Metrics>,
    pub start_time: Arc<Instant>,
    pub store: Option<Arc<dyn PriceStore>>,
    pub admin: Arc<AdminGate>,
}

#[derive(Clone, Debug)]
pub struct HealthStatus {
    pub status: String,
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self {
            status: "healthy".to_string(),
        }
    }
}

pub(crate) fn require_store(state: &AppState) -> Result<&Arc<dyn PriceStore>, ApiError> {
    state
        .store
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("price store not configured".to_string()))
}

pub async fn health_check(State(state): State<AppState>) -> Result<Json<Value>, StatusCode> {
    let health = state.health.read().await;
    let uptime_seconds = state.start_time.elapsed().as_secs();
    Ok(Json(json!({
        "status": health.status,
        "uptime_seconds": uptime_seconds,
        "service": "banggia-price-api"
    })))
}

pub async fn metrics_handler(State(state): State<AppState>) -> Result<String, StatusCode> {
    state
        .metrics
        .export()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

/// Middleware to track HTTP request metrics
async fn metrics_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    state.metrics.http_requests_in_flight.inc();
    let response = next.run(request).await;
    let status = response.status();
    let duration = start.elapsed();
    state.metrics.http_requests_in_flight.dec();

    state.metrics.http_requests_total.inc();
    state
        .metrics
        .http_request_duration_seconds
        .observe(duration.as_secs_f64());

    if status.is_server_error() {
        tracing::error!(
            method = %method,
            path = %path,
            status = %status,
            duration_ms = duration.as_millis(),
            "HTTP request error"
        );
    }

    response
}

#[derive(Debug, Deserialize)]
struct PriceParams {
    region: Option<String>,
    /// Comma-separated comparison list; wins over `region`.
    regions: Option<String>,
    company: Option<String>,
    range: Option<String>,
}

impl PriceParams {
    fn to_query(&self) -> PriceQuery {
        PriceQuery::parse(
            self.region.as_deref(),
            self.regions.as_deref(),
            self.company.as_deref(),
            self.range.as_deref(),
        )
    }
}

/// List all known series with their derived product mnemonics.
async fn list_series(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let store = require_store(&state)?;
    let series = store.list_series().await?;
    let items: Vec<Value> = series
        .iter()
        .map(|s| {
            json!({
                "id": s.id,
                "code": s.code,
                "name": s.name,
                "unit": s.unit,
                "product": s.product(),
            })
        })
        .collect();
    Ok(Json(json!(items)))
}

/// The aggregation endpoint: chart/table data for one series.
async fn get_prices(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Query(params): Query<PriceParams>,
) -> Result<Json<SeriesPayload>, ApiError> {
    let store = require_store(&state)?;
    let code = code.trim().to_ascii_uppercase();
    let series = store
        .find_series(&code)
        .await?
        .ok_or(ApiError::SeriesNotFound { code })?;

    let query = params.to_query();
    let outcome = run_query(store.as_ref(), &series, &query).await?;
    let payload = shape(&series, &query.scope_label(), outcome);
    state
        .metrics
        .price_queries_total
        .with_label_values(&[payload.mode_label()])
        .inc();
    Ok(Json(payload))
}

/// CSV export of the same query, flattened to one row per point.
async fn export_prices_csv(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Query(params): Query<PriceParams>,
) -> Result<Response, ApiError> {
    let store = require_store(&state)?;
    let code = code.trim().to_ascii_uppercase();
    let series = store
        .find_series(&code)
        .await?
        .ok_or(ApiError::SeriesNotFound { code: code.clone() })?;

    let query = params.to_query();
    let outcome = run_query(store.as_ref(), &series, &query).await?;

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record([
            "ts",
            "region",
            "company",
            "value",
            "value_min",
            "value_max",
            "source",
        ])
        .map_err(|e| ApiError::Storage(format!("csv write failed: {e}")))?;
    for point in flatten_outcome(outcome) {
        writer
            .write_record([
                point.ts.to_rfc3339(),
                point.region.clone(),
                point.company.as_map_key(),
                point.value.to_string(),
                point.value_min.map(|v| v.to_string()).unwrap_or_default(),
                point.value_max.map(|v| v.to_string()).unwrap_or_default(),
                point.source.clone().unwrap_or_default(),
            ])
            .map_err(|e| ApiError::Storage(format!("csv write failed: {e}")))?;
    }
    let data = writer
        .into_inner()
        .map_err(|e| ApiError::Storage(format!("csv write failed: {e}")))?;
    let body = String::from_utf8_lossy(&data).into_owned();

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/csv; charset=utf-8"),
    );
    if let Ok(disposition) =
        HeaderValue::from_str(&format!("attachment; filename=\"{}.csv\"", series.code))
    {
        headers.insert(header::CONTENT_DISPOSITION, disposition);
    }
    Ok((headers, body).into_response())
}

/// Flatten any outcome into one chronological row list for export.
fn flatten_outcome(outcome: QueryOutcome) -> Vec<crate::models::PricePoint> {
    let mut rows = match outcome {
        QueryOutcome::Flat(points) => points,
        QueryOutcome::Companies(buckets) => buckets.into_values().flatten().collect(),
        QueryOutcome::Regions { points, regions } => {
            if points.is_empty() {
                regions.into_values().flatten().collect()
            } else {
                points
            }
        }
    };
    rows.sort_by_key(|p| p.ts);
    rows
}

/// The flattened latest-day snapshot across all series.
async fn get_snapshot(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let store = require_store(&state)?;
    let rows = build_snapshot(store.as_ref()).await?;
    state
        .metrics
        .price_queries_total
        .with_label_values(&["snapshot"])
        .inc();
    Ok(Json(json!({ "rows": rows })))
}

async fn list_posts(State(state): State<AppState>) -> Result<Json<Vec<BlogPost>>, ApiError> {
    let store = require_store(&state)?;
    let posts = store.list_posts(true).await?;
    Ok(Json(posts))
}

async fn get_post(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<BlogPost>, ApiError> {
    let store = require_store(&state)?;
    let post = store
        .find_post(&slug)
        .await?
        .filter(|p| p.published)
        .ok_or(ApiError::PostNotFound { slug })?;
    Ok(Json(post))
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .route("/api/series", get(list_series))
        .route("/api/prices/{code}", get(get_prices))
        .route("/api/prices/{code}/export", get(export_prices_csv))
        .route("/api/snapshot", get(get_snapshot))
        .route("/api/posts", get(list_posts))
        .route("/api/posts/{slug}", get(get_post))
        .merge(admin_router(state.clone()))
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::DEBUG))
                        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                        .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
                )
                .layer(axum::middleware::from_fn_with_state(
                    state.clone(),
                    metrics_middleware,
                ))
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

pub async fn start_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let metrics = Arc::new(Metrics::new()?);
    let start_time = Arc::new(Instant::now());

    // The API boots without a store; data endpoints answer 503 until
    // Postgres is reachable.
    let store: Option<Arc<dyn PriceStore>> = match crate::db::PriceDatabase::new().await {
        Ok(db) => {
            info!("Postgres connected for API server");
            Some(Arc::new(db))
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to connect to Postgres - data endpoints will be unavailable");
            None
        }
    };

    let state = AppState {
        health: Arc::new(RwLock::new(HealthStatus::default())),
        metrics: metrics.clone(),
        start_time: start_time.clone(),
        store,
        admin: Arc::new(AdminGate::from_env()),
    };
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!(port = port, "HTTP server listening on port {}", port);
    axum::serve(listener, app).await?;

    Ok(())
}
