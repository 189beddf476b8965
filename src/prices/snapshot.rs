//! Latest-snapshot assembly
//!
//! Flattens the most recent day's rows for every (series, region, company)
//! into a single display-ordered list for the snapshot panel.

use futures_util::future::join_all;
use serde::Serialize;
use tracing::warn;

use crate::error::ApiError;
use crate::models::{region_sort_key, CompanyKey, PricePoint, PriceSeries, RegionKey};
use crate::prices::format::format_compact_price_range;
use crate::services::price_store::{PointFilter, PriceStore};

/// One snapshot line: the latest observation for a series/region/company.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotRow {
    pub series_code: String,
    pub series_name: String,
    pub unit: String,
    pub product: String,
    pub region: String,
    pub company: CompanyKey,
    pub ts: chrono::DateTime<chrono::Utc>,
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_max: Option<f64>,
    /// Compact rendering, e.g. "34k" or "34k - 36k".
    pub display_value: String,
}

impl SnapshotRow {
    fn from_point(series: &PriceSeries, point: PricePoint) -> SnapshotRow {
        let display_value =
            format_compact_price_range(point.value, point.value_min, point.value_max);
        SnapshotRow {
            series_code: series.code.clone(),
            series_name: series.name.clone(),
            unit: series.unit.clone(),
            product: series.product(),
            region: point.region,
            company: point.company,
            ts: point.ts,
            value: point.value,
            value_min: point.value_min,
            value_max: point.value_max,
            display_value,
        }
    }
}

/// Display ordering: series name, then canonical region order (North,
/// Central, South), then company (unspecified first, then by name). This is
/// a user-facing contract, not incidental.
pub fn sort_snapshot(rows: &mut [SnapshotRow]) {
    rows.sort_by(|a, b| {
        a.series_name
            .cmp(&b.series_name)
            .then_with(|| region_sort_key(&a.region).cmp(&region_sort_key(&b.region)))
            .then_with(|| a.company.cmp(&b.company))
    });
}

/// Build the snapshot across every series and canonical region. Each
/// series/region pair resolves its own latest day independently and
/// concurrently; a pair that errors is logged and skipped.
pub async fn build_snapshot(store: &dyn PriceStore) -> Result<Vec<SnapshotRow>, ApiError> {
    let series_list = store.list_series().await?;

    let fetches = series_list.iter().flat_map(|series| {
        RegionKey::ALL.into_iter().map(move |region| async move {
            let filter = PointFilter {
                series_id: series.id,
                region: Some(region.as_str().to_string()),
                company: None,
                since: None,
            };
            (series, store.latest_day_points(&filter).await)
        })
    });

    let mut rows = Vec::new();
    for (series, result) in join_all(fetches).await {
        match result {
            Ok(points) => {
                rows.extend(points.into_iter().map(|p| SnapshotRow::from_point(series, p)));
            }
            Err(e) => {
                warn!(series = %series.code, error = %e, "snapshot fetch failed, skipping");
            }
        }
    }

    sort_snapshot(&mut rows);
    Ok(rows)
}
