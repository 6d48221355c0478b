//! Time-weighted average over a feed's resolved history.
//!
//! ```text
//! TWAP = sum(value_i * duration_i) / sum(duration_i)
//! ```
//!
//! `duration_i` is the time between consecutive resolutions and `value_i` is
//! the value that held during that interval. The last point only closes the
//! final interval.

use crate::feeds::ResolvedPoint;
use crate::{OracleError, Result};

/// Minimum number of points for a valid TWAP.
pub const MIN_POINTS: usize = 2;

/// Compute the TWAP of `points`, which must be sorted by timestamp.
///
/// The result truncates toward zero.
///
/// # Errors
///
/// - [`OracleError::InsufficientHistory`] if fewer than [`MIN_POINTS`] points
/// - [`OracleError::NonMonotonicHistory`] if timestamps are not strictly increasing
/// - [`OracleError::Overflow`] if the weighted sum leaves `i128`
pub fn compute_twap(points: &[ResolvedPoint]) -> Result<i64> {
    if points.len() < MIN_POINTS {
        return Err(OracleError::InsufficientHistory {
            required: MIN_POINTS,
            available: points.len(),
        });
    }

    for pair in points.windows(2) {
        if pair[1].timestamp <= pair[0].timestamp {
            return Err(OracleError::NonMonotonicHistory {
                new: pair[1].timestamp,
                last: pair[0].timestamp,
            });
        }
    }

    let mut weighted_sum: i128 = 0;
    let mut total_duration: i128 = 0;
    for pair in points.windows(2) {
        let duration = i128::from(pair[1].timestamp - pair[0].timestamp);
        let term = i128::from(pair[0].value)
            .checked_mul(duration)
            .ok_or(OracleError::Overflow("twap"))?;
        weighted_sum = weighted_sum
            .checked_add(term)
            .ok_or(OracleError::Overflow("twap"))?;
        total_duration += duration;
    }

    // Strict monotonicity guarantees total_duration > 0, and a weighted mean
    // of i64 values stays within i64.
    i64::try_from(weighted_sum / total_duration).map_err(|_| OracleError::Overflow("twap"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pts(raw: &[(u64, i64)]) -> Vec<ResolvedPoint> {
        raw.iter()
            .map(|&(timestamp, value)| ResolvedPoint { timestamp, value })
            .collect()
    }

    #[test]
    fn test_constant_value() {
        let twap = compute_twap(&pts(&[(1000, 100), (2000, 100), (3000, 100)])).expect("twap");
        assert_eq!(twap, 100);
    }

    #[test]
    fn test_two_points_suffice() {
        let twap = compute_twap(&pts(&[(0, 42), (10, 7)])).expect("twap");
        assert_eq!(twap, 42);
    }

    #[test]
    fn test_unequal_durations() {
        // 100 for 3000s, then 200 for 1000s
        let twap = compute_twap(&pts(&[(0, 100), (3000, 200), (4000, 200)])).expect("twap");
        assert_eq!(twap, 125);
    }

    #[test]
    fn test_negative_values_truncate_toward_zero() {
        // (-10 * 1 + -11 * 1) / 2 = -10.5 -> -10
        let twap = compute_twap(&pts(&[(0, -10), (1, -11), (2, 0)])).expect("twap");
        assert_eq!(twap, -10);
    }

    #[test]
    fn test_insufficient_history() {
        let err = compute_twap(&pts(&[(1000, 100)])).expect_err("one point");
        assert!(matches!(
            err,
            OracleError::InsufficientHistory { required: 2, available: 1 }
        ));
    }

    #[test]
    fn test_non_monotonic_rejected() {
        let err = compute_twap(&pts(&[(3000, 100), (3000, 200)])).expect_err("dup ts");
        assert!(matches!(
            err,
            OracleError::NonMonotonicHistory { new: 3000, last: 3000 }
        ));
    }

    #[test]
    fn test_extreme_values() {
        let twap = compute_twap(&pts(&[(0, i64::MAX), (1, i64::MAX), (2, i64::MIN)]))
            .expect("twap");
        assert_eq!(twap, i64::MAX);
    }
}
