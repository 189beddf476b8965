//! Canonical region keys and series-code/product derivation

use serde::{Deserialize, Serialize};

/// The three canonical geographic buckets, in display order North, Central, South.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegionKey {
    MienBac,
    MienTrung,
    MienNam,
}

/// Synthetic aggregate selector used in query parameters, never stored.
pub const ALL_REGIONS_KEY: &str = "ALL";

impl RegionKey {
    /// All canonical regions in display order.
    pub const ALL: [RegionKey; 3] = [RegionKey::MienBac, RegionKey::MienTrung, RegionKey::MienNam];

    pub fn as_str(&self) -> &'static str {
        match self {
            RegionKey::MienBac => "MIEN_BAC",
            RegionKey::MienTrung => "MIEN_TRUNG",
            RegionKey::MienNam => "MIEN_NAM",
        }
    }

    /// Short suffix used in series codes (e.g. `GA_TRANG_MB`).
    pub fn suffix(&self) -> &'static str {
        match self {
            RegionKey::MienBac => "MB",
            RegionKey::MienTrung => "MT",
            RegionKey::MienNam => "MN",
        }
    }

    /// Position in the canonical display order (North, Central, South).
    pub fn display_order(&self) -> usize {
        match self {
            RegionKey::MienBac => 0,
            RegionKey::MienTrung => 1,
            RegionKey::MienNam => 2,
        }
    }

    /// Parse a canonical key or a short suffix. Case-insensitive, trimmed.
    pub fn parse(input: &str) -> Option<RegionKey> {
        let upper = input.trim().to_ascii_uppercase();
        match upper.as_str() {
            "MIEN_BAC" | "MB" => Some(RegionKey::MienBac),
            "MIEN_TRUNG" | "MT" => Some(RegionKey::MienTrung),
            "MIEN_NAM" | "MN" => Some(RegionKey::MienNam),
            _ => None,
        }
    }
}

impl std::fmt::Display for RegionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalize a free-form region code or label to a canonical key.
///
/// Uppercases and trims; canonical keys and known short suffixes map to the
/// canonical key. Anything else passes through uppercased — data-entry typos
/// degrade to pass-through values instead of failing reads. Idempotent.
pub fn normalize_region(input: &str) -> String {
    let upper = input.trim().to_ascii_uppercase();
    match RegionKey::parse(&upper) {
        Some(key) => key.as_str().to_string(),
        None => upper,
    }
}

/// Sort key for region strings: canonical regions in display order, anything
/// else after them in lexical order.
pub fn region_sort_key(region: &str) -> (usize, String) {
    match RegionKey::parse(region) {
        Some(key) => (key.display_order(), String::new()),
        None => (RegionKey::ALL.len(), region.to_string()),
    }
}

/// Recover the bare product mnemonic from a series code by stripping one
/// trailing `_<regionSuffix>`.
///
/// One product can carry per-region series codes (`GA_TRANG_MB`,
/// `GA_TRANG_MN`) that the UI treats as a single logical product. When no
/// region is supplied the suffix is inferred from the code itself; a code
/// without a region suffix is returned unchanged.
pub fn derive_product_from_code(code: &str, region: Option<RegionKey>) -> String {
    let upper = code.trim().to_ascii_uppercase();
    let region = region.or_else(|| infer_region_from_code(&upper));
    if let Some(region) = region {
        let tail = format!("_{}", region.suffix());
        if let Some(stripped) = upper.strip_suffix(&tail) {
            return stripped.to_string();
        }
    }
    upper
}

/// Infer the region from a series code's trailing suffix, if any.
pub fn infer_region_from_code(code: &str) -> Option<RegionKey> {
    let upper = code.trim().to_ascii_uppercase();
    RegionKey::ALL
        .into_iter()
        .find(|r| upper.ends_with(&format!("_{}", r.suffix())))
}

/// Requested region scope for a price query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionSelector {
    /// The synthetic `ALL` aggregate.
    All,
    /// A single normalized region (canonical key, or pass-through).
    One(String),
}

impl RegionSelector {
    /// Parse the `region` query parameter. Absent or `ALL` selects the
    /// aggregate scope.
    pub fn parse(raw: Option<&str>) -> RegionSelector {
        match raw {
            None => RegionSelector::All,
            Some(s) if s.trim().eq_ignore_ascii_case(ALL_REGIONS_KEY) || s.trim().is_empty() => {
                RegionSelector::All
            }
            Some(s) => RegionSelector::One(normalize_region(s)),
        }
    }

    /// Label used in "no data" messages.
    pub fn label(&self) -> &str {
        match self {
            RegionSelector::All => ALL_REGIONS_KEY,
            RegionSelector::One(region) => region,
        }
    }
}
