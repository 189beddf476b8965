//! Compact price formatting for snapshot and table views

/// Min/max pairs closer than this collapse to a single value. Prices are
/// VND-scale, so this is far below one đồng.
const RANGE_EPSILON: f64 = 1e-6;

/// Render a price (or range) in compact "thousands" notation.
///
/// `34000 → "34k"`, `34500 → "34.5k"`. A min/max pair renders as
/// `"34k - 36k"` unless the bounds are numerically equal, in which case it
/// collapses to the single compact value.
pub fn format_compact_price_range(value: f64, min: Option<f64>, max: Option<f64>) -> String {
    match (min, max) {
        (Some(min), Some(max)) if (max - min).abs() > RANGE_EPSILON => {
            format!("{} - {}", compact_thousands(min), compact_thousands(max))
        }
        (Some(min), Some(_)) => compact_thousands(min),
        _ => compact_thousands(value),
    }
}

/// `34000 → "34k"`, `34500 → "34.5k"`; one decimal at most.
pub fn compact_thousands(value: f64) -> String {
    let thousands = value / 1000.0;
    let rounded = (thousands * 10.0).round() / 10.0;
    if (rounded - rounded.trunc()).abs() < RANGE_EPSILON {
        format!("{}k", rounded.trunc() as i64)
    } else {
        format!("{:.1}k", rounded)
    }
}
