//! Postgres operations for series, price points, and blog posts

use std::sync::Arc;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use chrono::{Duration, Utc};
use tokio::sync::RwLock;
use tokio_postgres::error::SqlState;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls, Row};

use crate::config;
use crate::error::ApiError;
use crate::models::{
    day_floor, BlogPost, CompanyKey, PointKey, PostInput, PricePoint, PriceSeries, SeriesInput,
};
use crate::services::price_store::{PointFilter, PriceStore};

pub struct PriceDatabase {
    client: Arc<RwLock<Option<Client>>>,
}

impl PriceDatabase {
    pub async fn new() -> Result<Self, ApiError> {
        let database_url = config::get_database_url();
        let (client, connection) = tokio_postgres::connect(&database_url, NoTls)
            .await
            .map_err(|e| ApiError::Storage(format!("failed to connect to Postgres: {e}")))?;

        // Spawn connection task
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(error = %e, "Postgres connection error");
            }
        });

        let db = Self {
            client: Arc::new(RwLock::new(Some(client))),
        };
        db.init_schema().await?;
        Ok(db)
    }

    async fn init_schema(&self) -> Result<(), ApiError> {
        let guard = self.client.read().await;
        let client = require_client(&guard)?;

        client
            .batch_execute(
                "CREATE TABLE IF NOT EXISTS price_series (
                    id BIGSERIAL PRIMARY KEY,
                    code TEXT NOT NULL UNIQUE,
                    name TEXT NOT NULL,
                    unit TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS price_points (
                    series_id BIGINT NOT NULL REFERENCES price_series(id) ON DELETE CASCADE,
                    region TEXT NOT NULL,
                    company TEXT NOT NULL DEFAULT '',
                    ts TIMESTAMPTZ NOT NULL,
                    value DOUBLE PRECISION NOT NULL,
                    value_min DOUBLE PRECISION,
                    value_max DOUBLE PRECISION,
                    source TEXT,
                    UNIQUE (series_id, region, company, ts)
                );
                CREATE INDEX IF NOT EXISTS price_points_series_ts
                    ON price_points (series_id, ts);
                CREATE TABLE IF NOT EXISTS blog_posts (
                    id BIGSERIAL PRIMARY KEY,
                    slug TEXT NOT NULL UNIQUE,
                    title TEXT NOT NULL,
                    excerpt TEXT,
                    body TEXT NOT NULL,
                    published BOOLEAN NOT NULL DEFAULT FALSE,
                    created_at TIMESTAMPTZ NOT NULL,
                    updated_at TIMESTAMPTZ NOT NULL
                );",
            )
            .await
            .map_err(|e| ApiError::Storage(format!("failed to initialize schema: {e}")))?;
        Ok(())
    }

    async fn try_upsert_point(&self, point: &PricePoint) -> Result<(), ApiError> {
        let guard = self.client.read().await;
        let client = require_client(&guard)?;
        let ts = day_floor(point.ts);
        client
            .execute(
                "INSERT INTO price_points (series_id, region, company, ts, value, value_min, value_max, source)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                 ON CONFLICT (series_id, region, company, ts)
                 DO UPDATE SET value = EXCLUDED.value,
                               value_min = EXCLUDED.value_min,
                               value_max = EXCLUDED.value_max,
                               source = EXCLUDED.source",
                &[
                    &point.series_id,
                    &point.region,
                    &point.company.stored(),
                    &ts,
                    &point.value,
                    &point.value_min,
                    &point.value_max,
                    &point.source,
                ],
            )
            .await
            .map_err(|e| classify_write_error(e, &upsert_key(point)))?;
        Ok(())
    }
}

fn require_client<'a>(guard: &'a Option<Client>) -> Result<&'a Client, ApiError> {
    guard
        .as_ref()
        .ok_or_else(|| ApiError::Storage("database connection unavailable".to_string()))
}

fn upsert_key(point: &PricePoint) -> String {
    format!(
        "{}/{}/{}/{}",
        point.series_id,
        point.region,
        point.company.as_map_key(),
        day_floor(point.ts).date_naive()
    )
}

/// Unique-constraint races surface as retryable conflicts; everything else
/// is a storage failure.
fn classify_write_error(e: tokio_postgres::Error, key: &str) -> ApiError {
    if let Some(db) = e.as_db_error() {
        if db.code() == &SqlState::UNIQUE_VIOLATION {
            return ApiError::Conflict {
                key: key.to_string(),
            };
        }
    }
    ApiError::Storage(e.to_string())
}

fn series_from_row(row: &Row) -> PriceSeries {
    PriceSeries {
        id: row.get(0),
        code: row.get(1),
        name: row.get(2),
        unit: row.get(3),
    }
}

fn point_from_row(series_id: i64, row: &Row) -> PricePoint {
    let company: String = row.get(1);
    PricePoint {
        series_id,
        region: row.get(0),
        company: CompanyKey::from_stored(&company),
        ts: row.get(2),
        value: row.get(3),
        value_min: row.get(4),
        value_max: row.get(5),
        source: row.get(6),
    }
}

fn post_from_row(row: &Row) -> BlogPost {
    BlogPost {
        id: row.get(0),
        slug: row.get(1),
        title: row.get(2),
        excerpt: row.get(3),
        body: row.get(4),
        published: row.get(5),
        created_at: row.get(6),
        updated_at: row.get(7),
    }
}

const POINT_COLUMNS: &str = "region, company, ts, value, value_min, value_max, source";
const POST_COLUMNS: &str = "id, slug, title, excerpt, body, published, created_at, updated_at";

#[async_trait]
impl PriceStore for PriceDatabase {
    async fn list_series(&self) -> Result<Vec<PriceSeries>, ApiError> {
        let guard = self.client.read().await;
        let client = require_client(&guard)?;
        let rows = client
            .query("SELECT id, code, name, unit FROM price_series ORDER BY code", &[])
            .await?;
        Ok(rows.iter().map(series_from_row).collect())
    }

    async fn find_series(&self, code: &str) -> Result<Option<PriceSeries>, ApiError> {
        let guard = self.client.read().await;
        let client = require_client(&guard)?;
        let row = client
            .query_opt(
                "SELECT id, code, name, unit FROM price_series WHERE code = $1",
                &[&code],
            )
            .await?;
        Ok(row.map(|r| series_from_row(&r)))
    }

    async fn find_series_by_id(&self, id: i64) -> Result<Option<PriceSeries>, ApiError> {
        let guard = self.client.read().await;
        let client = require_client(&guard)?;
        let row = client
            .query_opt(
                "SELECT id, code, name, unit FROM price_series WHERE id = $1",
                &[&id],
            )
            .await?;
        Ok(row.map(|r| series_from_row(&r)))
    }

    async fn upsert_series(&self, input: &SeriesInput) -> Result<PriceSeries, ApiError> {
        let guard = self.client.read().await;
        let client = require_client(&guard)?;
        let row = client
            .query_one(
                "INSERT INTO price_series (code, name, unit) VALUES ($1, $2, $3)
                 ON CONFLICT (code) DO UPDATE SET name = EXCLUDED.name, unit = EXCLUDED.unit
                 RETURNING id, code, name, unit",
                &[&input.code, &input.name, &input.unit],
            )
            .await?;
        Ok(series_from_row(&row))
    }

    async fn delete_series(&self, code: &str) -> Result<bool, ApiError> {
        let guard = self.client.read().await;
        let client = require_client(&guard)?;
        let deleted = client
            .execute("DELETE FROM price_series WHERE code = $1", &[&code])
            .await?;
        Ok(deleted > 0)
    }

    async fn points(&self, filter: &PointFilter) -> Result<Vec<PricePoint>, ApiError> {
        let guard = self.client.read().await;
        let client = require_client(&guard)?;

        let company = filter.company.as_ref().map(|c| c.stored().to_string());
        let mut sql = format!(
            "SELECT {POINT_COLUMNS} FROM price_points WHERE series_id = $1"
        );
        let mut params: Vec<&(dyn ToSql + Sync)> = vec![&filter.series_id];
        if let Some(region) = &filter.region {
            params.push(region);
            sql.push_str(&format!(" AND region = ${}", params.len()));
        }
        if let Some(company) = &company {
            params.push(company);
            sql.push_str(&format!(" AND company = ${}", params.len()));
        }
        if let Some(since) = &filter.since {
            params.push(since);
            sql.push_str(&format!(" AND ts >= ${}", params.len()));
        }
        sql.push_str(" ORDER BY ts ASC");

        let rows = client.query(&sql, &params).await?;
        Ok(rows
            .iter()
            .map(|r| point_from_row(filter.series_id, r))
            .collect())
    }

    async fn latest_day_points(&self, filter: &PointFilter) -> Result<Vec<PricePoint>, ApiError> {
        let guard = self.client.read().await;
        let client = require_client(&guard)?;

        let company = filter.company.as_ref().map(|c| c.stored().to_string());
        let mut sql = String::from("SELECT max(ts) FROM price_points WHERE series_id = $1");
        let mut params: Vec<&(dyn ToSql + Sync)> = vec![&filter.series_id];
        if let Some(region) = &filter.region {
            params.push(region);
            sql.push_str(&format!(" AND region = ${}", params.len()));
        }
        if let Some(company) = &company {
            params.push(company);
            sql.push_str(&format!(" AND company = ${}", params.len()));
        }

        let row = client.query_one(&sql, &params).await?;
        let max_ts: Option<chrono::DateTime<Utc>> = row.get(0);
        drop(guard);
        let Some(max_ts) = max_ts else {
            return Ok(Vec::new());
        };

        // All rows sharing the most recent UTC day, not just the newest row.
        let day_start = day_floor(max_ts);
        let day_end = day_start + Duration::days(1);
        let day_filter = PointFilter {
            since: None,
            ..filter.clone()
        };
        let points = self.points(&day_filter).await?;
        Ok(points
            .into_iter()
            .filter(|p| p.ts >= day_start && p.ts < day_end)
            .collect())
    }

    async fn upsert_point(&self, point: &PricePoint) -> Result<(), ApiError> {
        // The day-keyed upsert absorbs re-submissions; a concurrent-insert
        // race on the unique constraint is retried before surfacing.
        let attempt = || async { self.try_upsert_point(point).await };
        attempt
            .retry(ExponentialBuilder::default().with_max_times(3))
            .when(|e| matches!(e, ApiError::Conflict { .. }))
            .await
    }

    async fn delete_point(&self, key: &PointKey) -> Result<bool, ApiError> {
        let guard = self.client.read().await;
        let client = require_client(&guard)?;
        let region = key.normalized_region();
        let company = key.company_key();
        let day_start = key.day_instant();
        let day_end = day_start + Duration::days(1);
        let deleted = client
            .execute(
                "DELETE FROM price_points
                 WHERE series_id = $1 AND region = $2 AND company = $3
                   AND ts >= $4 AND ts < $5",
                &[&key.series_id, &region, &company.stored(), &day_start, &day_end],
            )
            .await?;
        Ok(deleted > 0)
    }

    async fn list_posts(&self, published_only: bool) -> Result<Vec<BlogPost>, ApiError> {
        let guard = self.client.read().await;
        let client = require_client(&guard)?;
        let sql = if published_only {
            format!(
                "SELECT {POST_COLUMNS} FROM blog_posts WHERE published ORDER BY created_at DESC"
            )
        } else {
            format!("SELECT {POST_COLUMNS} FROM blog_posts ORDER BY created_at DESC")
        };
        let rows = client.query(&sql, &[]).await?;
        Ok(rows.iter().map(post_from_row).collect())
    }

    async fn find_post(&self, slug: &str) -> Result<Option<BlogPost>, ApiError> {
        let guard = self.client.read().await;
        let client = require_client(&guard)?;
        let row = client
            .query_opt(
                &format!("SELECT {POST_COLUMNS} FROM blog_posts WHERE slug = $1"),
                &[&slug],
            )
            .await?;
        Ok(row.map(|r| post_from_row(&r)))
    }

    async fn upsert_post(&self, input: &PostInput) -> Result<BlogPost, ApiError> {
        let guard = self.client.read().await;
        let client = require_client(&guard)?;
        let now = Utc::now();
        let row = client
            .query_one(
                "INSERT INTO blog_posts (slug, title, excerpt, body, published, created_at, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $6)
                 ON CONFLICT (slug)
                 DO UPDATE SET title = EXCLUDED.title,
                               excerpt = EXCLUDED.excerpt,
                               body = EXCLUDED.body,
                               published = EXCLUDED.published,
                               updated_at = EXCLUDED.updated_at
                 RETURNING id, slug, title, excerpt, body, published, created_at, updated_at",
                &[
                    &input.slug,
                    &input.title,
                    &input.excerpt,
                    &input.body,
                    &input.published,
                    &now,
                ],
            )
            .await?;
        Ok(post_from_row(&row))
    }

    async fn delete_post(&self, slug: &str) -> Result<bool, ApiError> {
        let guard = self.client.read().await;
        let client = require_client(&guard)?;
        let deleted = client
            .execute("DELETE FROM blog_posts WHERE slug = $1", &[&slug])
            .await?;
        Ok(deleted > 0)
    }
}
