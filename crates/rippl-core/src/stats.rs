//! Small numeric helpers shared by the trending and impact engines.

/// Exponential decay with the given half-life. Negative elapsed time is
/// treated as zero.
pub fn decay(value: f64, elapsed_secs: f64, half_life_secs: f64) -> f64 {
  if elapsed_secs <= 0.0 || half_life_secs <= 0.0 {
    return value;
  }
  value * 0.5_f64.powf(elapsed_secs / half_life_secs)
}

/// Median of `values`; 0 for an empty slice.
pub fn median(values: &[f64]) -> f64 {
  if values.is_empty() {
    return 0.0;
  }
  let mut sorted = values.to_vec();
  sorted.sort_by(f64::total_cmp);
  let mid = sorted.len() / 2;
  if sorted.len() % 2 == 0 {
    (sorted[mid - 1] + sorted[mid]) / 2.0
  } else {
    sorted[mid]
  }
}

pub const INDEX_MIN: f64 = 0.5;
pub const INDEX_MAX: f64 = 3.0;

/// An entity's value relative to its group median, clamped to
/// `[INDEX_MIN, INDEX_MAX]`. A zero (or non-positive) median is neutral.
pub fn relative_index(value: f64, median: f64) -> f64 {
  if median.is_nan() || median <= 0.0 {
    return 1.0;
  }
  let raw = value / median;
  if raw.is_nan() {
    return 1.0;
  }
  raw.clamp(INDEX_MIN, INDEX_MAX)
}
