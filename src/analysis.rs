//! Distribution statistics shared by the scenario summary and the pricer.

/// Summary statistics for a sample of annual losses.
#[derive(Debug, Clone, PartialEq)]
pub struct DistStats {
    pub n: usize,
    pub min: f64,
    pub p5: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p95: f64,
    pub max: f64,
    pub mean: f64,
    /// Sample standard deviation (n − 1 denominator); 0 for a single value.
    pub std_dev: f64,
}

/// Ascending copy of `values`.
pub fn sorted(values: &[f64]) -> Vec<f64> {
    let mut out = values.to_vec();
    out.sort_by(|a, b| a.total_cmp(b));
    out
}

/// Linear-interpolated quantile of an ascending slice, `p` in [0, 1].
pub fn interp(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    let h = p.clamp(0.0, 1.0) * (n - 1) as f64;
    let lo = h.floor() as usize;
    let hi = (lo + 1).min(n - 1);
    let frac = h - lo as f64;
    sorted[lo] * (1.0 - frac) + sorted[hi] * frac
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Sample standard deviation. Fewer than two values give 0.
pub fn sample_std(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (n - 1) as f64;
    variance.sqrt()
}

/// Central moments m2, m3, m4 with population denominators.
fn central_moments(values: &[f64]) -> (f64, f64, f64) {
    let n = values.len() as f64;
    let m = mean(values);
    let (mut m2, mut m3, mut m4) = (0.0, 0.0, 0.0);
    for x in values {
        let d = x - m;
        let d2 = d * d;
        m2 += d2;
        m3 += d2 * d;
        m4 += d2 * d2;
    }
    (m2 / n, m3 / n, m4 / n)
}

/// Biased sample skewness m3 / m2^1.5. Constant or empty samples give 0.
pub fn skewness(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let (m2, m3, _) = central_moments(values);
    if m2 <= 0.0 { 0.0 } else { m3 / m2.powf(1.5) }
}

/// Excess kurtosis m4 / m2² − 3. Constant or empty samples give 0.
pub fn excess_kurtosis(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let (m2, _, m4) = central_moments(values);
    if m2 <= 0.0 { 0.0 } else { m4 / (m2 * m2) - 3.0 }
}

pub fn dist_stats(values: &[f64]) -> Option<DistStats> {
    if values.is_empty() {
        return None;
    }
    let s = sorted(values);
    let n = s.len();
    Some(DistStats {
        n,
        min: s[0],
        p5: interp(&s, 0.05),
        p25: interp(&s, 0.25),
        p50: interp(&s, 0.50),
        p75: interp(&s, 0.75),
        p95: interp(&s, 0.95),
        max: s[n - 1],
        mean: mean(&s),
        std_dev: sample_std(&s),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dist_stats_known_values() {
        let values = vec![5.0, 1.0, 4.0, 2.0, 3.0];
        let s = dist_stats(&values).unwrap();
        assert_eq!(s.n, 5);
        assert_eq!(s.min, 1.0);
        assert_eq!(s.max, 5.0);
        assert_eq!(s.p50, 3.0);
        assert_eq!(s.p25, 2.0);
        assert!((s.p95 - 4.8).abs() < 1e-12);
        assert!((s.mean - 3.0).abs() < 1e-12);
        // sample variance 2.5
        assert!((s.std_dev - 2.5f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn dist_stats_empty_returns_none() {
        assert!(dist_stats(&[]).is_none());
    }

    #[test]
    fn single_value_has_zero_spread() {
        assert_eq!(sample_std(&[7.0]), 0.0);
        assert_eq!(skewness(&[7.0]), 0.0);
        assert_eq!(excess_kurtosis(&[7.0, 7.0]), 0.0);
    }

    #[test]
    fn skewness_sign_follows_tail() {
        assert!(skewness(&[0.0, 0.0, 0.0, 0.0, 10.0]) > 0.0);
        assert!(skewness(&[10.0, 10.0, 10.0, 10.0, 0.0]) < 0.0);
        assert!(skewness(&[1.0, 2.0, 3.0]).abs() < 1e-12);
    }

    /// Two-point symmetric sample: m4 / m2² = 1, excess = −2.
    #[test]
    fn kurtosis_of_two_point_sample() {
        assert!((excess_kurtosis(&[-1.0, 1.0]) + 2.0).abs() < 1e-12);
    }
}
