//! Price store interface and in-memory implementation
//!
//! The Postgres store in `db::postgres` is the production implementation;
//! `MemoryPriceStore` backs unit and integration tests without a database.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::ApiError;
use crate::models::{
    day_floor, BlogPost, CompanyKey, PointKey, PostInput, PricePoint, PriceSeries, SeriesInput,
};
use crate::prices::aggregation::latest_day_slice;

/// Read filter for price points. `since` bounds the window; latest-day mode
/// ignores it and resolves the most recent day for the filter set instead.
#[derive(Debug, Clone)]
pub struct PointFilter {
    pub series_id: i64,
    /// Exact normalized-region match; `None` spans all regions.
    pub region: Option<String>,
    /// Exact company bucket; `None` spans all companies.
    pub company: Option<CompanyKey>,
    pub since: Option<DateTime<Utc>>,
}

/// Persistence boundary for series, points, and posts.
#[async_trait]
pub trait PriceStore: Send + Sync {
    async fn list_series(&self) -> Result<Vec<PriceSeries>, ApiError>;
    async fn find_series(&self, code: &str) -> Result<Option<PriceSeries>, ApiError>;
    async fn find_series_by_id(&self, id: i64) -> Result<Option<PriceSeries>, ApiError>;
    /// Create-or-update keyed on the immutable series code.
    async fn upsert_series(&self, input: &SeriesInput) -> Result<PriceSeries, ApiError>;
    /// Returns false when no series matched.
    async fn delete_series(&self, code: &str) -> Result<bool, ApiError>;

    /// Matching points ordered by timestamp ascending.
    async fn points(&self, filter: &PointFilter) -> Result<Vec<PricePoint>, ApiError>;
    /// All rows whose UTC day equals the most recent day for the filter set.
    async fn latest_day_points(&self, filter: &PointFilter) -> Result<Vec<PricePoint>, ApiError>;
    /// Upsert keyed on (series_id, region, company, day); second write wins.
    async fn upsert_point(&self, point: &PricePoint) -> Result<(), ApiError>;
    /// Delete by exact key. Returns false when no row matched.
    async fn delete_point(&self, key: &PointKey) -> Result<bool, ApiError>;

    async fn list_posts(&self, published_only: bool) -> Result<Vec<BlogPost>, ApiError>;
    async fn find_post(&self, slug: &str) -> Result<Option<BlogPost>, ApiError>;
    /// Create-or-update keyed on the post slug.
    async fn upsert_post(&self, input: &PostInput) -> Result<BlogPost, ApiError>;
    async fn delete_post(&self, slug: &str) -> Result<bool, ApiError>;
}

#[derive(Default)]
struct MemoryInner {
    series: Vec<PriceSeries>,
    points: Vec<PricePoint>,
    posts: Vec<BlogPost>,
    next_series_id: i64,
    next_post_id: i64,
    /// Regions whose point queries fail, for exercising partial-failure paths.
    failing_regions: HashSet<String>,
}

/// In-memory store with the same upsert/latest-day semantics as the
/// Postgres implementation.
#[derive(Default)]
pub struct MemoryPriceStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryPriceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make point queries against `region` return a storage error.
    pub fn fail_region(&self, region: &str) {
        let mut inner = self.lock();
        inner.failing_regions.insert(region.to_string());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn filtered(inner: &MemoryInner, filter: &PointFilter) -> Result<Vec<PricePoint>, ApiError> {
        if let Some(region) = &filter.region {
            if inner.failing_regions.contains(region) {
                return Err(ApiError::Storage(format!("region {region} unavailable")));
            }
        }
        let mut points: Vec<PricePoint> = inner
            .points
            .iter()
            .filter(|p| p.series_id == filter.series_id)
            .filter(|p| filter.region.as_deref().is_none_or(|r| p.region == r))
            .filter(|p| filter.company.as_ref().is_none_or(|c| &p.company == c))
            .filter(|p| filter.since.is_none_or(|since| p.ts >= since))
            .cloned()
            .collect();
        points.sort_by_key(|p| p.ts);
        Ok(points)
    }
}

#[async_trait]
impl PriceStore for MemoryPriceStore {
    async fn list_series(&self) -> Result<Vec<PriceSeries>, ApiError> {
        let inner = self.lock();
        let mut series = inner.series.clone();
        series.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(series)
    }

    async fn find_series(&self, code: &str) -> Result<Option<PriceSeries>, ApiError> {
        let inner = self.lock();
        Ok(inner.series.iter().find(|s| s.code == code).cloned())
    }

    async fn find_series_by_id(&self, id: i64) -> Result<Option<PriceSeries>, ApiError> {
        let inner = self.lock();
        Ok(inner.series.iter().find(|s| s.id == id).cloned())
    }

    async fn upsert_series(&self, input: &SeriesInput) -> Result<PriceSeries, ApiError> {
        let mut inner = self.lock();
        if let Some(existing) = inner.series.iter_mut().find(|s| s.code == input.code) {
            existing.name = input.name.clone();
            existing.unit = input.unit.clone();
            return Ok(existing.clone());
        }
        inner.next_series_id += 1;
        let series = PriceSeries {
            id: inner.next_series_id,
            code: input.code.clone(),
            name: input.name.clone(),
            unit: input.unit.clone(),
        };
        inner.series.push(series.clone());
        Ok(series)
    }

    async fn delete_series(&self, code: &str) -> Result<bool, ApiError> {
        let mut inner = self.lock();
        let Some(pos) = inner.series.iter().position(|s| s.code == code) else {
            return Ok(false);
        };
        let id = inner.series[pos].id;
        inner.series.remove(pos);
        inner.points.retain(|p| p.series_id != id);
        Ok(true)
    }

    async fn points(&self, filter: &PointFilter) -> Result<Vec<PricePoint>, ApiError> {
        let inner = self.lock();
        Self::filtered(&inner, filter)
    }

    async fn latest_day_points(&self, filter: &PointFilter) -> Result<Vec<PricePoint>, ApiError> {
        let inner = self.lock();
        let unbounded = PointFilter {
            since: None,
            ..filter.clone()
        };
        let points = Self::filtered(&inner, &unbounded)?;
        Ok(latest_day_slice(&points))
    }

    async fn upsert_point(&self, point: &PricePoint) -> Result<(), ApiError> {
        let mut inner = self.lock();
        let day = day_floor(point.ts);
        if let Some(existing) = inner.points.iter_mut().find(|p| {
            p.series_id == point.series_id
                && p.region == point.region
                && p.company == point.company
                && day_floor(p.ts) == day
        }) {
            *existing = point.clone();
        } else {
            inner.points.push(point.clone());
        }
        Ok(())
    }

    async fn delete_point(&self, key: &PointKey) -> Result<bool, ApiError> {
        let mut inner = self.lock();
        let region = key.normalized_region();
        let company = key.company_key();
        let day = key.day_instant();
        let before = inner.points.len();
        inner.points.retain(|p| {
            !(p.series_id == key.series_id
                && p.region == region
                && p.company == company
                && day_floor(p.ts) == day)
        });
        Ok(inner.points.len() < before)
    }

    async fn list_posts(&self, published_only: bool) -> Result<Vec<BlogPost>, ApiError> {
        let inner = self.lock();
        let mut posts: Vec<BlogPost> = inner
            .posts
            .iter()
            .filter(|p| !published_only || p.published)
            .cloned()
            .collect();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(posts)
    }

    async fn find_post(&self, slug: &str) -> Result<Option<BlogPost>, ApiError> {
        let inner = self.lock();
        Ok(inner.posts.iter().find(|p| p.slug == slug).cloned())
    }

    async fn upsert_post(&self, input: &PostInput) -> Result<BlogPost, ApiError> {
        let mut inner = self.lock();
        let now = Utc::now();
        if let Some(existing) = inner.posts.iter_mut().find(|p| p.slug == input.slug) {
            existing.title = input.title.clone();
            existing.excerpt = input.excerpt.clone();
            existing.body = input.body.clone();
            existing.published = input.published;
            existing.updated_at = now;
            return Ok(existing.clone());
        }
        inner.next_post_id += 1;
        let post = BlogPost {
            id: inner.next_post_id,
            slug: input.slug.clone(),
            title: input.title.clone(),
            excerpt: input.excerpt.clone(),
            body: input.body.clone(),
            published: input.published,
            created_at: now,
            updated_at: now,
        };
        inner.posts.push(post.clone());
        Ok(post)
    }

    async fn delete_post(&self, slug: &str) -> Result<bool, ApiError> {
        let mut inner = self.lock();
        let before = inner.posts.len();
        inner.posts.retain(|p| p.slug != slug);
        Ok(inner.posts.len() < before)
    }
}
