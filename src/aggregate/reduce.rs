//! Per-period reductions over the leaf values under a node.

use serde::{Deserialize, Serialize};

use crate::math::{mean, median, std_dev};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reduction {
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    pub count: usize,
    /// Population standard deviation.
    pub std: f64,
}

/// Reduce a non-empty set of values.
///
/// `None` when there is nothing to reduce or when a moment overflows, so a
/// stored reduction never carries `inf` or `NaN`.
pub fn reduce(values: &[f64]) -> Option<Reduction> {
    let reduction = Reduction {
        mean: mean(values)?,
        median: median(values)?,
        min: values.iter().copied().fold(f64::INFINITY, f64::min),
        max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        count: values.len(),
        std: std_dev(values)?,
    };
    reduction.is_finite().then_some(reduction)
}

impl Reduction {
    pub fn is_finite(&self) -> bool {
        [self.mean, self.median, self.min, self.max, self.std]
            .iter()
            .all(|v| v.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reduces_values() {
        let r = reduce(&[300.0, 100.0, 200.0]).unwrap();
        assert_eq!(r.mean, 200.0);
        assert_eq!(r.median, 200.0);
        assert_eq!((r.min, r.max, r.count), (100.0, 300.0, 3));
        assert!((r.std - (20_000.0f64 / 3.0).sqrt()).abs() < 1e-9);
        assert_eq!(reduce(&[]), None);
    }

    #[test]
    fn overflowing_sum_is_not_a_reduction() {
        // Each value is finite; their sum is not.
        assert_eq!(reduce(&[1.5e308, 1.6e308]), None);
        assert!(reduce(&[1.5e308]).is_some());
    }
}
