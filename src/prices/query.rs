//! Query-parameter model for the price endpoints

use crate::models::{normalize_region, CompanyKey, RegionSelector};

/// Day-count window or latest-day mode, from the `range` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeParam {
    /// `range=0`: only the most recent day's rows.
    Latest,
    Days(u32),
}

impl RangeParam {
    /// Windows the UI offers. Anything else falls back to the default.
    pub const ALLOWED_DAYS: [u32; 3] = [1, 7, 30];
    pub const DEFAULT_DAYS: u32 = 7;

    pub fn parse(raw: Option<&str>) -> RangeParam {
        let parsed = raw.and_then(|s| s.trim().parse::<i64>().ok());
        match parsed {
            Some(0) => RangeParam::Latest,
            Some(n) if n > 0 && Self::ALLOWED_DAYS.contains(&(n as u32)) => {
                RangeParam::Days(n as u32)
            }
            _ => RangeParam::Days(Self::DEFAULT_DAYS),
        }
    }

    pub fn is_latest(&self) -> bool {
        matches!(self, RangeParam::Latest)
    }
}

/// Fully-parsed query for one series.
#[derive(Debug, Clone)]
pub struct PriceQuery {
    /// `regions=` comparison list; wins over `region` when present.
    pub regions: Option<Vec<String>>,
    pub selector: RegionSelector,
    pub company: Option<CompanyKey>,
    pub range: RangeParam,
}

impl PriceQuery {
    pub fn parse(
        region: Option<&str>,
        regions: Option<&str>,
        company: Option<&str>,
        range: Option<&str>,
    ) -> PriceQuery {
        let regions = regions.map(parse_region_list).filter(|r| !r.is_empty());
        PriceQuery {
            regions,
            selector: RegionSelector::parse(region),
            company: CompanyKey::parse_filter(company),
            range: RangeParam::parse(range),
        }
    }

    /// Scope label for "no data" messages.
    pub fn scope_label(&self) -> String {
        match &self.regions {
            Some(list) => list.join(","),
            None => self.selector.label().to_string(),
        }
    }
}

/// Parse the comma-separated `regions=` parameter into normalized,
/// deduplicated region keys, preserving request order.
pub fn parse_region_list(raw: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for part in raw.split(',') {
        let trimmed = part.trim();
        if trimmed.is_empty() {
            continue;
        }
        let normalized = normalize_region(trimmed);
        if !out.contains(&normalized) {
            out.push(normalized);
        }
    }
    out
}
