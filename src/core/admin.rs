//! Passcode-gated admin console routes
//!
//! Write access is guarded by a shared passcode checked per request. Failed
//! attempts are counted in an injected fixed-capacity expiring map keyed by
//! client, with a lockout once the budget is spent.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use axum::{
    extract::{Path, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post, put},
    Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;

use crate::config;
use crate::core::http::{require_store, AppState};
use crate::error::ApiError;
use crate::models::{
    day_instant, normalize_region, BlogPost, CompanyKey, PointKey, PostInput, PricePoint,
    PriceSeries, SeriesInput,
};

const PASSCODE_HEADER: &str = "x-admin-passcode";

/// Most clients tracked at once; the map prunes expired windows and evicts
/// the oldest entry when full.
const MAX_TRACKED_CLIENTS: usize = 1024;

#[derive(Debug, Clone, Copy)]
struct AttemptWindow {
    failures: u32,
    window_start: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Allowed,
    Rejected,
    LockedOut,
    /// No passcode configured; the console is disabled.
    Unconfigured,
}

/// Admin passcode check with per-client failure tracking. The attempt map is
/// owned by the gate instance injected into `AppState`, not a module-level
/// singleton.
pub struct AdminGate {
    passcode: Option<String>,
    max_attempts: u32,
    window: Duration,
    attempts: Mutex<HashMap<String, AttemptWindow>>,
}

impl AdminGate {
    pub fn new(passcode: Option<String>, max_attempts: u32, window: Duration) -> Self {
        Self {
            passcode,
            max_attempts,
            window,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_env() -> Self {
        Self::new(
            config::get_admin_passcode(),
            config::get_admin_max_attempts(),
            Duration::from_secs(config::get_admin_lockout_seconds()),
        )
    }

    pub fn check(&self, client: &str, provided: Option<&str>) -> GateDecision {
        let Some(passcode) = &self.passcode else {
            return GateDecision::Unconfigured;
        };

        let mut attempts = match self.attempts.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let now = Instant::now();
        attempts.retain(|_, w| now.duration_since(w.window_start) < self.window);

        if let Some(window) = attempts.get(client) {
            if window.failures >= self.max_attempts {
                return GateDecision::LockedOut;
            }
        }

        if provided == Some(passcode.as_str()) {
            attempts.remove(client);
            return GateDecision::Allowed;
        }

        if attempts.len() >= MAX_TRACKED_CLIENTS && !attempts.contains_key(client) {
            let oldest = attempts
                .iter()
                .min_by_key(|(_, w)| w.window_start)
                .map(|(k, _)| k.clone());
            if let Some(key) = oldest {
                attempts.remove(&key);
            }
        }
        let entry = attempts.entry(client.to_string()).or_insert(AttemptWindow {
            failures: 0,
            window_start: now,
        });
        entry.failures += 1;
        if entry.failures >= self.max_attempts {
            GateDecision::LockedOut
        } else {
            GateDecision::Rejected
        }
    }
}

fn client_key(request: &Request) -> String {
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .or_else(|| {
            request
                .extensions()
                .get::<axum::extract::ConnectInfo<std::net::SocketAddr>>()
                .map(|info| info.0.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

async fn admin_gate_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let client = client_key(&request);
    let provided = request
        .headers()
        .get(PASSCODE_HEADER)
        .and_then(|v| v.to_str().ok());

    match state.admin.check(&client, provided) {
        GateDecision::Allowed => next.run(request).await,
        GateDecision::Unconfigured => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "admin console disabled" })),
        )
            .into_response(),
        GateDecision::LockedOut => {
            state.metrics.admin_auth_failures_total.inc();
            tracing::warn!(client = %client, "admin client locked out");
            (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({ "error": "too many failed attempts" })),
            )
                .into_response()
        }
        GateDecision::Rejected => {
            state.metrics.admin_auth_failures_total.inc();
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "invalid passcode" })),
            )
                .into_response()
        }
    }
}

/// Admin price form payload: a single value or a min/max range, one day.
#[derive(Debug, Deserialize)]
pub struct PriceSubmission {
    pub series_id: i64,
    pub region: String,
    /// Calendar day, `YYYY-MM-DD`.
    pub date: String,
    pub value: Option<f64>,
    pub value_min: Option<f64>,
    pub value_max: Option<f64>,
    pub company: Option<String>,
    pub source: Option<String>,
}

impl PriceSubmission {
    /// Validate and convert into a storable point. All violations are
    /// collected before rejecting.
    fn into_point(self) -> Result<PricePoint, ApiError> {
        let mut violations = Vec::new();

        let date = match NaiveDate::parse_from_str(self.date.trim(), "%Y-%m-%d") {
            Ok(d) => Some(d),
            Err(_) => {
                violations.push(format!("date must be YYYY-MM-DD, got {:?}", self.date));
                None
            }
        };
        if self.region.trim().is_empty() {
            violations.push("region is required".to_string());
        }

        let value = match (self.value, self.value_min, self.value_max) {
            (Some(_), Some(_), _) | (Some(_), _, Some(_)) => {
                violations.push("provide either a value or a min/max range, not both".to_string());
                None
            }
            (Some(v), None, None) => {
                if v <= 0.0 {
                    violations.push("price must be positive".to_string());
                }
                Some(v)
            }
            (None, Some(min), Some(max)) => {
                if min <= 0.0 || max <= 0.0 {
                    violations.push("price bounds must be positive".to_string());
                }
                if min > max {
                    violations.push("value_min must not exceed value_max".to_string());
                }
                // A range is stored as its midpoint for display and sorting.
                Some((min + max) / 2.0)
            }
            (None, Some(_), None) | (None, None, Some(_)) => {
                violations.push("value_min and value_max must be set together".to_string());
                None
            }
            (None, None, None) => {
                violations.push("a value or a min/max range is required".to_string());
                None
            }
        };

        if !violations.is_empty() {
            return Err(ApiError::validation(violations));
        }
        let (date, value) = match (date, value) {
            (Some(d), Some(v)) => (d, v),
            _ => return Err(ApiError::validation(vec!["invalid submission".to_string()])),
        };

        Ok(PricePoint {
            series_id: self.series_id,
            region: normalize_region(&self.region),
            company: CompanyKey::from_option(self.company),
            ts: day_instant(date),
            value,
            value_min: self.value_min,
            value_max: self.value_max,
            source: self
                .source
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
        })
    }
}

fn validate_series_input(input: &SeriesInput) -> Result<SeriesInput, ApiError> {
    let mut violations = Vec::new();
    let code = input.code.trim().to_ascii_uppercase();
    if code.is_empty() {
        violations.push("code is required".to_string());
    } else if !code.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        violations.push("code must be alphanumeric with underscores".to_string());
    }
    if input.name.trim().is_empty() {
        violations.push("name is required".to_string());
    }
    if input.unit.trim().is_empty() {
        violations.push("unit is required".to_string());
    }
    if !violations.is_empty() {
        return Err(ApiError::validation(violations));
    }
    Ok(SeriesInput {
        code,
        name: input.name.trim().to_string(),
        unit: input.unit.trim().to_string(),
    })
}

fn validate_post_input(input: &PostInput) -> Result<PostInput, ApiError> {
    let mut violations = Vec::new();
    let slug = input.slug.trim().to_ascii_lowercase();
    if slug.is_empty() {
        violations.push("slug is required".to_string());
    } else if !slug.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        violations.push("slug must be alphanumeric with dashes".to_string());
    }
    if input.title.trim().is_empty() {
        violations.push("title is required".to_string());
    }
    if input.body.trim().is_empty() {
        violations.push("body is required".to_string());
    }
    if !violations.is_empty() {
        return Err(ApiError::validation(violations));
    }
    Ok(PostInput {
        slug,
        title: input.title.trim().to_string(),
        excerpt: input.excerpt.clone(),
        body: input.body.clone(),
        published: input.published,
    })
}

async fn admin_list_series(State(state): State<AppState>) -> Result<Json<Vec<PriceSeries>>, ApiError> {
    let store = require_store(&state)?;
    Ok(Json(store.list_series().await?))
}

/// Create-or-update a series, keyed on its immutable code.
async fn upsert_series(
    State(state): State<AppState>,
    Json(input): Json<SeriesInput>,
) -> Result<Json<PriceSeries>, ApiError> {
    let store = require_store(&state)?;
    let input = validate_series_input(&input)?;
    let series = store.upsert_series(&input).await?;
    state.metrics.admin_writes_total.inc();
    Ok(Json(series))
}

async fn delete_series(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<StatusCode, ApiError> {
    let store = require_store(&state)?;
    let code = code.trim().to_ascii_uppercase();
    if !store.delete_series(&code).await? {
        return Err(ApiError::SeriesNotFound { code });
    }
    state.metrics.admin_writes_total.inc();
    Ok(StatusCode::NO_CONTENT)
}

/// Upsert one price observation, keyed on (series, region, company, day).
async fn submit_price(
    State(state): State<AppState>,
    Json(submission): Json<PriceSubmission>,
) -> Result<Json<PricePoint>, ApiError> {
    let store = require_store(&state)?;
    let point = submission.into_point()?;
    if store.find_series_by_id(point.series_id).await?.is_none() {
        return Err(ApiError::SeriesNotFound {
            code: point.series_id.to_string(),
        });
    }
    store.upsert_point(&point).await?;
    state.metrics.admin_writes_total.inc();
    Ok(Json(point))
}

async fn delete_price(
    State(state): State<AppState>,
    Json(key): Json<PointKey>,
) -> Result<StatusCode, ApiError> {
    let store = require_store(&state)?;
    if !store.delete_point(&key).await? {
        return Err(ApiError::NoData {
            product: key.series_id.to_string(),
            region: key.normalized_region(),
        });
    }
    state.metrics.admin_writes_total.inc();
    Ok(StatusCode::NO_CONTENT)
}

async fn admin_list_posts(State(state): State<AppState>) -> Result<Json<Vec<BlogPost>>, ApiError> {
    let store = require_store(&state)?;
    Ok(Json(store.list_posts(false).await?))
}

async fn create_post(
    State(state): State<AppState>,
    Json(input): Json<PostInput>,
) -> Result<Json<BlogPost>, ApiError> {
    let store = require_store(&state)?;
    let input = validate_post_input(&input)?;
    let post = store.upsert_post(&input).await?;
    state.metrics.admin_writes_total.inc();
    Ok(Json(post))
}

async fn update_post(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Json(mut input): Json<PostInput>,
) -> Result<Json<BlogPost>, ApiError> {
    let store = require_store(&state)?;
    if store.find_post(&slug).await?.is_none() {
        return Err(ApiError::PostNotFound { slug });
    }
    // The path owns the identity; the payload cannot rename a post.
    input.slug = slug;
    let input = validate_post_input(&input)?;
    let post = store.upsert_post(&input).await?;
    state.metrics.admin_writes_total.inc();
    Ok(Json(post))
}

async fn delete_post(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<StatusCode, ApiError> {
    let store = require_store(&state)?;
    if !store.delete_post(&slug).await? {
        return Err(ApiError::PostNotFound { slug });
    }
    state.metrics.admin_writes_total.inc();
    Ok(StatusCode::NO_CONTENT)
}

pub fn admin_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/api/admin/series",
            get(admin_list_series).post(upsert_series),
        )
        .route("/api/admin/series/{code}", delete(delete_series))
        .route("/api/admin/prices", post(submit_price).delete(delete_price))
        .route("/api/admin/posts", get(admin_list_posts).post(create_post))
        .route(
            "/api/admin/posts/{slug}",
            put(update_post).delete(delete_post),
        )
        .route_layer(axum::middleware::from_fn_with_state(
            state,
            admin_gate_middleware,
        ))
}
