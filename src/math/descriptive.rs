//! Descriptive statistics over plain `f64` slices.
//!
//! Conventions:
//! - variance and standard deviation are population (divide by `n`)
//! - percentiles interpolate linearly at rank `p/100 · (n-1)`
//! - skewness and kurtosis use biased population moments; kurtosis is excess

/// Arithmetic mean; `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Ascending copy of `values`.
pub fn sorted(values: &[f64]) -> Vec<f64> {
    let mut out = values.to_vec();
    out.sort_by(|a, b| a.total_cmp(b));
    out
}

pub fn median(values: &[f64]) -> Option<f64> {
    percentile_sorted(&sorted(values), 50.0)
}

/// Linear-interpolated percentile of an ascending slice, `p` in `[0, 100]`.
pub fn percentile_sorted(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() || !(0.0..=100.0).contains(&p) {
        return None;
    }
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

pub fn percentile(values: &[f64], p: f64) -> Option<f64> {
    percentile_sorted(&sorted(values), p)
}

/// Population variance.
pub fn variance(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    Some(values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64)
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> Option<f64> {
    variance(values).map(f64::sqrt)
}

/// Second, third and fourth central moments.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CentralMoments {
    pub m2: f64,
    pub m3: f64,
    pub m4: f64,
}

pub fn central_moments(values: &[f64]) -> Option<CentralMoments> {
    let m = mean(values)?;
    let n = values.len() as f64;
    let (mut m2, mut m3, mut m4) = (0.0, 0.0, 0.0);
    for v in values {
        let d = v - m;
        let d2 = d * d;
        m2 += d2;
        m3 += d2 * d;
        m4 += d2 * d2;
    }
    Some(CentralMoments {
        m2: m2 / n,
        m3: m3 / n,
        m4: m4 / n,
    })
}

/// Biased skewness `m3 / m2^1.5`; `None` for zero variance.
pub fn skewness(values: &[f64]) -> Option<f64> {
    let cm = central_moments(values)?;
    (cm.m2 > 0.0).then(|| cm.m3 / cm.m2.powf(1.5))
}

/// Biased excess kurtosis `m4 / m2² - 3`; `None` for zero variance.
pub fn excess_kurtosis(values: &[f64]) -> Option<f64> {
    let cm = central_moments(values)?;
    (cm.m2 > 0.0).then(|| cm.m4 / (cm.m2 * cm.m2) - 3.0)
}

/// Unscaled median absolute deviation.
pub fn median_abs_deviation(values: &[f64]) -> Option<f64> {
    let med = median(values)?;
    let deviations: Vec<f64> = values.iter().map(|v| (v - med).abs()).collect();
    median(&deviations)
}

/// Fractional changes between consecutive values, skipping zero bases.
pub fn simple_returns(values: &[f64]) -> Vec<f64> {
    values
        .windows(2)
        .filter(|w| w[0] != 0.0)
        .map(|w| (w[1] - w[0]) / w[0])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn basic_moments() {
        let v = [100.0, 105.0, 110.0, 95.0];
        assert!(close(mean(&v).unwrap(), 102.5));
        assert!(close(median(&v).unwrap(), 102.5));
        assert!(close(variance(&v).unwrap(), 31.25));
        assert_eq!(mean(&[]), None);
    }

    #[test]
    fn percentile_interpolates_between_ranks() {
        let v = [1.0, 2.0, 3.0, 4.0];
        assert!(close(percentile(&v, 50.0).unwrap(), 2.5));
        assert!(close(percentile(&v, 25.0).unwrap(), 1.75));
        assert!(close(percentile(&v, 100.0).unwrap(), 4.0));
        assert_eq!(percentile(&v, 101.0), None);
    }

    #[test]
    fn shape_of_uniform_four_points() {
        let v = [1.0, 2.0, 3.0, 4.0];
        assert!(close(skewness(&v).unwrap(), 0.0));
        assert!(close(excess_kurtosis(&v).unwrap(), -1.36));
        assert_eq!(skewness(&[5.0, 5.0]), None);
    }

    #[test]
    fn mad_and_returns() {
        assert!(close(median_abs_deviation(&[1.0, 1.0, 2.0, 2.0, 4.0, 6.0, 9.0]).unwrap(), 1.0));
        let r = simple_returns(&[0.0, 100.0, 110.0, 99.0]);
        assert_eq!(r.len(), 2);
        assert!(close(r[0], 0.1));
        assert!(close(r[1], -0.1));
    }
}
