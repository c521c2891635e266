//! Binary searches over ascending sequences of m/z values.
//!
//! Every function here assumes its input slice is sorted in ascending order. This is
//! a precondition, not something that is checked.
use std::ops::Range;

use thiserror::Error;

/// A search over a sorted sequence that found nothing in the requested range.
///
/// Callers generally treat this as "no match" rather than as a hard failure.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum SearchError {
    #[error("No value greater than or equal to {0}")]
    NoValueAtLeast(f64),
    #[error("No value less than or equal to {0}")]
    NoValueAtMost(f64),
}

/// The absolute width of a `window_ppm` tolerance at `mz`
#[inline]
pub fn ppm_tolerance(mz: f64, window_ppm: f64) -> f64 {
    mz * window_ppm / 1e6
}

/// The inclusive bounds `[center - tol, center + tol]` of a ppm window centered on `center`
#[inline]
pub fn ppm_error_window(center: f64, window_ppm: f64) -> (f64, f64) {
    let tol = ppm_tolerance(center, window_ppm);
    (center - tol, center + tol)
}

/// Find the smallest index `i` such that `values[i] >= threshold`
pub fn lower_bound_at_least(values: &[f64], threshold: f64) -> Result<usize, SearchError> {
    let i = values.partition_point(|v| *v < threshold);
    if i == values.len() {
        Err(SearchError::NoValueAtLeast(threshold))
    } else {
        Ok(i)
    }
}

/// Find the largest index `i` such that `values[i] <= threshold`
pub fn upper_bound_at_most(values: &[f64], threshold: f64) -> Result<usize, SearchError> {
    let i = values.partition_point(|v| *v <= threshold);
    if i == 0 {
        Err(SearchError::NoValueAtMost(threshold))
    } else {
        Ok(i - 1)
    }
}

/// Find the index range of `values` that lies within `window_ppm` of `center`, inclusive
/// of both edges.
///
/// The range may be empty when the window falls between two consecutive values.
pub fn ppm_window_range(
    values: &[f64],
    center: f64,
    window_ppm: f64,
) -> Result<Range<usize>, SearchError> {
    let (lo, hi) = ppm_error_window(center, window_ppm);
    let end = upper_bound_at_most(values, hi)?;
    let start = lower_bound_at_least(values, lo)?;
    // Everything before `start` is below `lo`, so `end + 1 >= start`.
    Ok(start..(end + 1).max(start))
}

/// As [`ppm_window_range`], but return the values themselves
pub fn ppm_window_slice(values: &[f64], center: f64, window_ppm: f64) -> Result<&[f64], SearchError> {
    ppm_window_range(values, center, window_ppm).map(|range| &values[range])
}

/// Find the value in `values` closest to `target`, along with its index.
///
/// When `target` is equidistant from two values, the smaller one wins. Returns
/// [`None`] if `values` is empty.
pub fn nearest(values: &[f64], target: f64) -> Option<(f64, usize)> {
    nearest_from(values, target, 0)
}

/// As [`nearest`], but only search from index `lo` onwards.
///
/// The index returned is a valid `lo` for any later call with a `target` at least as
/// large as this one, so a scan over increasing targets can carry it forward as a
/// cursor instead of restarting from the beginning each time.
pub fn nearest_from(values: &[f64], target: f64, lo: usize) -> Option<(f64, usize)> {
    if values.is_empty() {
        return None;
    }
    let lo = lo.min(values.len());
    let pos = lo + values[lo..].partition_point(|v| *v < target);
    if pos == 0 {
        return Some((values[0], 0));
    }
    if pos == values.len() {
        return Some((values[pos - 1], pos - 1));
    }
    let before = values[pos - 1];
    let after = values[pos];
    if after - target < target - before {
        Some((after, pos))
    } else {
        Some((before, pos - 1))
    }
}

/// Drop every point in sorted `points` whose `window_ppm` window overlaps the window of
/// one of its neighbors. Both members of an overlapping pair are dropped.
pub fn discard_overlapping(points: &[f64], window_ppm: f64) -> Vec<f64> {
    let mut overlapping = vec![false; points.len()];
    for i in 1..points.len() {
        let (_, previous_end) = ppm_error_window(points[i - 1], window_ppm);
        let (start, _) = ppm_error_window(points[i], window_ppm);
        if start <= previous_end {
            overlapping[i - 1] = true;
            overlapping[i] = true;
        }
    }
    points
        .iter()
        .zip(overlapping)
        .filter_map(|(point, overlaps)| (!overlaps).then_some(*point))
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    const VALUES: [f64; 6] = [100.0, 200.0, 200.0, 300.0, 400.0, 500.0];

    #[test]
    fn test_lower_bound() {
        assert_eq!(lower_bound_at_least(&VALUES, 50.0), Ok(0));
        assert_eq!(lower_bound_at_least(&VALUES, 200.0), Ok(1));
        assert_eq!(lower_bound_at_least(&VALUES, 250.0), Ok(3));
        assert_eq!(lower_bound_at_least(&VALUES, 500.0), Ok(5));
        assert_eq!(
            lower_bound_at_least(&VALUES, 500.1),
            Err(SearchError::NoValueAtLeast(500.1))
        );
        assert!(lower_bound_at_least(&[], 1.0).is_err());
    }

    #[test]
    fn test_upper_bound() {
        assert_eq!(upper_bound_at_most(&VALUES, 600.0), Ok(5));
        assert_eq!(upper_bound_at_most(&VALUES, 200.0), Ok(2));
        assert_eq!(upper_bound_at_most(&VALUES, 250.0), Ok(2));
        assert_eq!(upper_bound_at_most(&VALUES, 100.0), Ok(0));
        assert_eq!(
            upper_bound_at_most(&VALUES, 99.0),
            Err(SearchError::NoValueAtMost(99.0))
        );
        assert!(upper_bound_at_most(&[], 1.0).is_err());
    }

    #[test]
    fn test_window_includes_edges() {
        let (lo, hi) = ppm_error_window(1000.0, 10.0);
        let values = [lo - 1e-6, lo, 1000.0, hi, hi + 1e-6];
        let hits = ppm_window_slice(&values, 1000.0, 10.0).unwrap();
        assert_eq!(hits, &[lo, 1000.0, hi]);
        assert_eq!(ppm_window_range(&values, 1000.0, 10.0).unwrap(), 1..4);
    }

    #[test]
    fn test_window_between_values() {
        let values = [100.0, 200.0];
        let hits = ppm_window_slice(&values, 150.0, 10.0).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_window_out_of_range() {
        let values = [100.0, 200.0];
        assert!(matches!(
            ppm_window_slice(&values, 50.0, 10.0),
            Err(SearchError::NoValueAtMost(_))
        ));
        assert!(matches!(
            ppm_window_slice(&values, 250.0, 10.0),
            Err(SearchError::NoValueAtLeast(_))
        ));
        assert!(ppm_window_slice(&[], 250.0, 10.0).is_err());
    }

    #[test]
    fn test_nearest() {
        assert_eq!(nearest(&VALUES, 0.0), Some((100.0, 0)));
        assert_eq!(nearest(&VALUES, 1000.0), Some((500.0, 5)));
        assert_eq!(nearest(&VALUES, 290.0), Some((300.0, 3)));
        assert_eq!(nearest(&VALUES, 310.0), Some((300.0, 3)));
        assert_eq!(nearest(&[], 310.0), None);
    }

    #[test]
    fn test_nearest_tie_prefers_smaller() {
        assert_eq!(nearest(&[1.0, 3.0], 2.0), Some((1.0, 0)));
        assert_eq!(nearest(&VALUES, 350.0), Some((300.0, 3)));
    }

    #[test]
    fn test_nearest_with_cursor() {
        let targets = [95.0, 210.0, 260.0, 420.0, 700.0];
        let mut cursor = 0;
        let mut found = Vec::new();
        for t in targets {
            let (value, idx) = nearest_from(&VALUES, t, cursor).unwrap();
            assert!(idx >= cursor);
            assert_eq!(Some(value), nearest(&VALUES, t).map(|(v, _)| v));
            cursor = idx;
            found.push(value);
        }
        assert_eq!(found, vec![100.0, 200.0, 300.0, 400.0, 500.0]);
        assert_eq!(nearest_from(&VALUES, 700.0, 100), Some((500.0, 5)));
    }

    #[test]
    fn test_discard_overlapping() {
        let points = [100.0, 100.001, 200.0, 300.0, 300.002, 300.004, 400.0];
        let kept = discard_overlapping(&points, 10.0);
        assert_eq!(kept, vec![200.0, 400.0]);
        assert!(discard_overlapping(&[], 10.0).is_empty());
        assert_eq!(discard_overlapping(&[5.0], 10.0), vec![5.0]);
    }
}
