//! Response shaping for the price API
//!
//! Converts aggregation outcomes into the three payload shapes the UI
//! consumes. The shape is a tagged union resolved by the requested mode,
//! never an untyped object with optional fields.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{PricePoint, PriceSeries};
use crate::prices::aggregation::QueryOutcome;

/// Series header common to every payload shape.
#[derive(Debug, Clone, Serialize)]
pub struct SeriesHeader {
    pub code: String,
    pub name: String,
    pub unit: String,
    /// Requested region scope (canonical key, `ALL`, or a comparison list).
    pub region: String,
    /// Logical product mnemonic shared by per-region series codes.
    pub product: String,
}

impl SeriesHeader {
    pub fn new(series: &PriceSeries, scope: &str) -> SeriesHeader {
        SeriesHeader {
            code: series.code.clone(),
            name: series.name.clone(),
            unit: series.unit.clone(),
            region: scope.to_string(),
            product: series.product(),
        }
    }
}

/// One point on the wire. `region` appears only when multiple regions were
/// flattened into the same list.
#[derive(Debug, Clone, Serialize)]
pub struct PointDto {
    pub ts: DateTime<Utc>,
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_max: Option<f64>,
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

impl PointDto {
    fn from_point(point: PricePoint, with_region: bool) -> PointDto {
        PointDto {
            ts: point.ts,
            value: point.value,
            value_min: point.value_min,
            value_max: point.value_max,
            source: point.source,
            region: with_region.then_some(point.region),
        }
    }
}

/// The three output shapes of the price endpoint.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum SeriesPayload {
    /// Single-region time series.
    Flat {
        series: SeriesHeader,
        points: Vec<PointDto>,
    },
    /// Per-region comparison map. `points` carries the cross-region averaged
    /// series in range mode and is empty otherwise.
    Regions {
        series: SeriesHeader,
        regions: BTreeMap<String, Vec<PointDto>>,
        points: Vec<PointDto>,
    },
    /// Company-segmented map; the unspecified bucket keys as `"null"`.
    Companies {
        series: SeriesHeader,
        companies: BTreeMap<String, Vec<PointDto>>,
    },
}

impl SeriesPayload {
    /// Metrics label for the resolved shape.
    pub fn mode_label(&self) -> &'static str {
        match self {
            SeriesPayload::Flat { .. } => "flat",
            SeriesPayload::Regions { .. } => "regions",
            SeriesPayload::Companies { .. } => "companies",
        }
    }
}

/// Assemble the wire payload for one resolved query.
pub fn shape(series: &PriceSeries, scope: &str, outcome: QueryOutcome) -> SeriesPayload {
    let header = SeriesHeader::new(series, scope);
    match outcome {
        QueryOutcome::Flat(points) => SeriesPayload::Flat {
            series: header,
            points: points
                .into_iter()
                .map(|p| PointDto::from_point(p, false))
                .collect(),
        },
        QueryOutcome::Companies(buckets) => SeriesPayload::Companies {
            series: header,
            companies: buckets
                .into_iter()
                .map(|(company, points)| {
                    (
                        company.as_map_key(),
                        points
                            .into_iter()
                            .map(|p| PointDto::from_point(p, false))
                            .collect(),
                    )
                })
                .collect(),
        },
        QueryOutcome::Regions { points, regions } => SeriesPayload::Regions {
            series: header,
            regions: regions
                .into_iter()
                .map(|(region, points)| {
                    (
                        region,
                        points
                            .into_iter()
                            .map(|p| PointDto::from_point(p, false))
                            .collect(),
                    )
                })
                .collect(),
            points: points
                .into_iter()
                .map(|p| PointDto::from_point(p, true))
                .collect(),
        },
    }
}
