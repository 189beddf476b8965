//! Price series and price point data models

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::models::region::{derive_product_from_code, RegionKey};

/// A named, unit-tagged commodity price track (e.g. "Gà trắng").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSeries {
    pub id: i64,
    /// Unique uppercase underscore-delimited mnemonic, e.g. `GA_TRANG_MB`.
    /// Immutable after creation; natural key for admin upsert.
    pub code: String,
    pub name: String,
    /// Display unit, e.g. "VND/kg".
    pub unit: String,
}

impl PriceSeries {
    /// Logical product mnemonic shared by per-region series codes.
    pub fn product(&self) -> String {
        derive_product_from_code(&self.code, None)
    }

    /// Region encoded in the series code suffix, if any.
    pub fn code_region(&self) -> Option<RegionKey> {
        crate::models::region::infer_region_from_code(&self.code)
    }
}

/// Admin payload for creating or updating a series, keyed by `code`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesInput {
    pub code: String,
    pub name: String,
    pub unit: String,
}

/// Company bucket key. `Unspecified` is a first-class variant rather than a
/// sentinel string, so a company literally named "null" cannot collide with
/// the no-company bucket.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CompanyKey {
    Unspecified,
    Named(String),
}

impl CompanyKey {
    /// The literal query-parameter value selecting the no-company bucket.
    pub const NULL_PARAM: &'static str = "null";

    pub fn from_option(company: Option<String>) -> CompanyKey {
        match company {
            Some(name) if !name.trim().is_empty() => CompanyKey::Named(name.trim().to_string()),
            _ => CompanyKey::Unspecified,
        }
    }

    /// Storage representation: companies are persisted as non-null text with
    /// `""` meaning "unspecified" so the uniqueness key covers the
    /// no-company bucket.
    pub fn from_stored(stored: &str) -> CompanyKey {
        if stored.is_empty() {
            CompanyKey::Unspecified
        } else {
            CompanyKey::Named(stored.to_string())
        }
    }

    pub fn stored(&self) -> &str {
        match self {
            CompanyKey::Unspecified => "",
            CompanyKey::Named(name) => name,
        }
    }

    /// JSON map key: the literal `"null"` for the unspecified bucket.
    pub fn as_map_key(&self) -> String {
        match self {
            CompanyKey::Unspecified => CompanyKey::NULL_PARAM.to_string(),
            CompanyKey::Named(name) => name.clone(),
        }
    }

    pub fn as_option(&self) -> Option<&str> {
        match self {
            CompanyKey::Unspecified => None,
            CompanyKey::Named(name) => Some(name),
        }
    }

    /// Parse the `company` query parameter: absent means "no filter", the
    /// literal `"null"` means "rows with no company".
    pub fn parse_filter(raw: Option<&str>) -> Option<CompanyKey> {
        match raw {
            None => None,
            Some(s) if s.trim().is_empty() => None,
            Some(s) if s.trim() == CompanyKey::NULL_PARAM => Some(CompanyKey::Unspecified),
            Some(s) => Some(CompanyKey::Named(s.trim().to_string())),
        }
    }
}

impl Serialize for CompanyKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CompanyKey::Unspecified => serializer.serialize_none(),
            CompanyKey::Named(name) => serializer.serialize_some(name),
        }
    }
}

/// One observed price. The tuple (series_id, region, company, ts) is unique;
/// ts is truncated to a UTC day boundary.
#[derive(Debug, Clone, Serialize)]
pub struct PricePoint {
    pub series_id: i64,
    /// Normalized region key (canonical, or lenient pass-through).
    pub region: String,
    pub company: CompanyKey,
    pub ts: DateTime<Utc>,
    /// Midpoint when a min/max range was entered.
    pub value: f64,
    pub value_min: Option<f64>,
    pub value_max: Option<f64>,
    pub source: Option<String>,
}

/// Exact identity of a stored price point, used for deletes.
#[derive(Debug, Clone, Deserialize)]
pub struct PointKey {
    pub series_id: i64,
    pub region: String,
    pub company: Option<String>,
    /// Day, not instant.
    pub date: NaiveDate,
}

impl PointKey {
    pub fn normalized_region(&self) -> String {
        crate::models::region::normalize_region(&self.region)
    }

    pub fn company_key(&self) -> CompanyKey {
        CompanyKey::from_option(self.company.clone())
    }

    pub fn day_instant(&self) -> DateTime<Utc> {
        day_instant(self.date)
    }
}

/// UTC midnight instant for a calendar day.
pub fn day_instant(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

/// Truncate an instant to its UTC day boundary.
pub fn day_floor(ts: DateTime<Utc>) -> DateTime<Utc> {
    day_instant(ts.date_naive())
}
