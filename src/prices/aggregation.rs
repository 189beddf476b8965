//! Price aggregation engine
//!
//! Reshapes repository rows into the per-region / per-company structures the
//! chart, table, and snapshot views consume. Grouping and averaging are pure
//! functions over fetched point vectors; only the per-region fan-out touches
//! the store.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use futures_util::future::join_all;
use tracing::warn;

use crate::error::ApiError;
use crate::models::{day_floor, CompanyKey, PricePoint, PriceSeries, RegionKey, RegionSelector, ALL_REGIONS_KEY};
use crate::prices::query::{PriceQuery, RangeParam};
use crate::services::price_store::{PointFilter, PriceStore};

/// Resolved result of one price query, discriminated by the caller's mode.
#[derive(Debug)]
pub enum QueryOutcome {
    /// Single region, single company: the raw ordered list.
    Flat(Vec<PricePoint>),
    /// Single region, all companies: one bucket per company key.
    Companies(BTreeMap<CompanyKey, Vec<PricePoint>>),
    /// Aggregate or comparison scope. `points` holds the cross-region
    /// averaged series in range mode and stays empty in latest mode.
    Regions {
        points: Vec<PricePoint>,
        regions: BTreeMap<String, Vec<PricePoint>>,
    },
}

/// Sort a point list ascending by timestamp.
pub fn sort_by_ts(points: &mut [PricePoint]) {
    points.sort_by_key(|p| p.ts);
}

/// Group points by company key, each bucket sorted ascending by timestamp.
/// `Unspecified` is its own bucket; there is no cross-company averaging.
pub fn group_by_company(points: Vec<PricePoint>) -> BTreeMap<CompanyKey, Vec<PricePoint>> {
    let mut buckets: BTreeMap<CompanyKey, Vec<PricePoint>> = BTreeMap::new();
    for point in points {
        buckets.entry(point.company.clone()).or_default().push(point);
    }
    for bucket in buckets.values_mut() {
        sort_by_ts(bucket);
    }
    buckets
}

/// Group points by canonical region, each bucket sorted ascending.
pub fn group_by_region(points: &[PricePoint]) -> BTreeMap<String, Vec<PricePoint>> {
    let mut buckets: BTreeMap<String, Vec<PricePoint>> = BTreeMap::new();
    for point in points {
        buckets
            .entry(point.region.clone())
            .or_default()
            .push(point.clone());
    }
    for bucket in buckets.values_mut() {
        sort_by_ts(bucket);
    }
    buckets
}

/// Collapse points across regions and companies into one synthetic series:
/// group by exact timestamp and take the arithmetic mean of `value` per
/// bucket. Emitted points carry `region = "ALL"` and no source. No rounding
/// happens here; formatting is a presentation concern.
pub fn average_by_timestamp(series_id: i64, points: &[PricePoint]) -> Vec<PricePoint> {
    let mut buckets: BTreeMap<DateTime<Utc>, (f64, usize)> = BTreeMap::new();
    for point in points {
        let entry = buckets.entry(point.ts).or_insert((0.0, 0));
        entry.0 += point.value;
        entry.1 += 1;
    }
    buckets
        .into_iter()
        .map(|(ts, (sum, count))| PricePoint {
            series_id,
            region: ALL_REGIONS_KEY.to_string(),
            company: CompanyKey::Unspecified,
            ts,
            value: sum / count as f64,
            value_min: None,
            value_max: None,
            source: None,
        })
        .collect()
}

/// Keep only the rows whose UTC day equals the most recent day present.
/// Multiple company entries recorded on that day all survive.
pub fn latest_day_slice(points: &[PricePoint]) -> Vec<PricePoint> {
    let Some(max_ts) = points.iter().map(|p| p.ts).max() else {
        return Vec::new();
    };
    let latest_day = day_floor(max_ts);
    let mut latest: Vec<PricePoint> = points
        .iter()
        .filter(|p| day_floor(p.ts) == latest_day)
        .cloned()
        .collect();
    sort_by_ts(&mut latest);
    latest
}

/// Window start for a day-count range.
fn window_start(days: u32) -> DateTime<Utc> {
    Utc::now() - Duration::days(days as i64)
}

/// Fetch one region's points for the requested mode.
async fn points_for_region(
    store: &dyn PriceStore,
    series_id: i64,
    region: Option<&str>,
    company: Option<&CompanyKey>,
    range: RangeParam,
) -> Result<Vec<PricePoint>, ApiError> {
    let filter = PointFilter {
        series_id,
        region: region.map(|r| r.to_string()),
        company: company.cloned(),
        since: match range {
            RangeParam::Latest => None,
            RangeParam::Days(days) => Some(window_start(days)),
        },
    };
    match range {
        RangeParam::Latest => store.latest_day_points(&filter).await,
        RangeParam::Days(_) => store.points(&filter).await,
    }
}

/// Resolve each requested region independently and join the results.
///
/// Regions run concurrently; a region whose query fails is logged and
/// treated as "no data for that region". Only total failure across every
/// requested region propagates, so an outage is not reported as "no data".
async fn regions_map(
    store: &dyn PriceStore,
    series: &PriceSeries,
    regions: &[String],
    company: Option<&CompanyKey>,
    range: RangeParam,
    scope_label: &str,
) -> Result<BTreeMap<String, Vec<PricePoint>>, ApiError> {
    let fetches = regions.iter().map(|region| async move {
        let result =
            points_for_region(store, series.id, Some(region.as_str()), company, range).await;
        (region.clone(), result)
    });
    let results = join_all(fetches).await;

    let mut map = BTreeMap::new();
    let mut first_error = None;
    let mut failures = 0usize;
    for (region, result) in results {
        match result {
            Ok(points) if points.is_empty() => {}
            Ok(points) => {
                map.insert(region, points);
            }
            Err(e) => {
                warn!(region = %region, series = %series.code, error = %e, "region query failed, treating as empty");
                failures += 1;
                first_error.get_or_insert(e);
            }
        }
    }

    if failures == regions.len() {
        if let Some(e) = first_error {
            return Err(e);
        }
    }
    if map.is_empty() {
        return Err(ApiError::NoData {
            product: series.product(),
            region: scope_label.to_string(),
        });
    }
    Ok(map)
}

/// Run one price query against the store and reshape the rows per the
/// requested mode.
pub async fn run_query(
    store: &dyn PriceStore,
    series: &PriceSeries,
    query: &PriceQuery,
) -> Result<QueryOutcome, ApiError> {
    // Explicit comparison list wins over the region selector.
    if let Some(requested) = &query.regions {
        let regions = regions_map(
            store,
            series,
            requested,
            query.company.as_ref(),
            query.range,
            &query.scope_label(),
        )
        .await?;
        return Ok(QueryOutcome::Regions {
            points: Vec::new(),
            regions,
        });
    }

    match (&query.selector, &query.company) {
        (RegionSelector::One(region), Some(company)) => {
            let points = points_for_region(
                store,
                series.id,
                Some(region.as_str()),
                Some(company),
                query.range,
            )
            .await?;
            if points.is_empty() {
                return Err(ApiError::NoData {
                    product: series.product(),
                    region: region.clone(),
                });
            }
            Ok(QueryOutcome::Flat(points))
        }
        (RegionSelector::One(region), None) => {
            let points =
                points_for_region(store, series.id, Some(region.as_str()), None, query.range)
                    .await?;
            if points.is_empty() {
                return Err(ApiError::NoData {
                    product: series.product(),
                    region: region.clone(),
                });
            }
            Ok(QueryOutcome::Companies(group_by_company(points)))
        }
        (RegionSelector::All, company) => match query.range {
            RangeParam::Days(_) => {
                // One fetch across every region; the averaged series and the
                // per-region breakdown come from the same rows.
                let points =
                    points_for_region(store, series.id, None, company.as_ref(), query.range)
                        .await?;
                if points.is_empty() {
                    return Err(ApiError::NoData {
                        product: series.product(),
                        region: ALL_REGIONS_KEY.to_string(),
                    });
                }
                let regions = group_by_region(&points);
                Ok(QueryOutcome::Regions {
                    points: average_by_timestamp(series.id, &points),
                    regions,
                })
            }
            RangeParam::Latest => {
                // Latest is region-local here: each canonical region resolves
                // its own most recent day. No cross-region averaging.
                let canonical: Vec<String> = RegionKey::ALL
                    .iter()
                    .map(|r| r.as_str().to_string())
                    .collect();
                let regions = regions_map(
                    store,
                    series,
                    &canonical,
                    company.as_ref(),
                    RangeParam::Latest,
                    ALL_REGIONS_KEY,
                )
                .await?;
                Ok(QueryOutcome::Regions {
                    points: Vec::new(),
                    regions,
                })
            }
        },
    }
}
