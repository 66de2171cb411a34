//! Order statistics and smoothing used by the robust estimators.
//!
//! All functions discard NaN inputs. An input with no finite values yields
//! NaN rather than an error, so missing data keeps flowing as missing data.

/// Finite values of `values`, sorted ascending.
fn sorted_finite(values: impl IntoIterator<Item = f64>) -> Vec<f64> {
    let mut finite: Vec<f64> = values.into_iter().filter(|x| !x.is_nan()).collect();
    finite.sort_by(|a, b| a.total_cmp(b));
    finite
}

/// Percentile `q` in `[0, 100]` with linear interpolation between order
/// statistics, ignoring NaN.
pub fn nan_percentile(values: impl IntoIterator<Item = f64>, q: f64) -> f64 {
    let sorted = sorted_finite(values);
    percentile_of_sorted(&sorted, q)
}

fn percentile_of_sorted(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let pos = (q.clamp(0.0, 100.0) / 100.0) * (n - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = (lo + 1).min(n - 1);
            let frac = pos - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    }
}

/// Median ignoring NaN.
pub fn nan_median(values: impl IntoIterator<Item = f64>) -> f64 {
    nan_percentile(values, 50.0)
}

/// Centered circular moving mean ignoring NaN.
///
/// Output `k` averages inputs `k - (w - 1 - w/2) ..= k + w/2` with indices
/// wrapped around the sequence; `w` is clamped to the sequence length. For
/// `w = 10` that is `k-4 ..= k+5`.
pub fn circular_moving_mean(values: &[f64], window: usize) -> Vec<f64> {
    let n = values.len();
    if n == 0 {
        return Vec::new();
    }
    let w = window.clamp(1, n);
    let back = w - 1 - w / 2;

    (0..n)
        .map(|k| {
            let mut sum = 0.0;
            let mut count = 0usize;
            for t in 0..w {
                let idx = (k + n - back + t) % n;
                let x = values[idx];
                if !x.is_nan() {
                    sum += x;
                    count += 1;
                }
            }
            if count == 0 {
                f64::NAN
            } else {
                sum / count as f64
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_percentile_interpolation() {
        let v = vec![4.0, 1.0, 3.0, 2.0];
        assert_relative_eq!(nan_percentile(v.clone(), 0.0), 1.0);
        assert_relative_eq!(nan_percentile(v.clone(), 100.0), 4.0);
        assert_relative_eq!(nan_percentile(v.clone(), 50.0), 2.5);
        // position 0.34 * 3 = 1.02
        assert_relative_eq!(nan_percentile(v, 34.0), 2.02, epsilon = 1e-12);
    }

    #[test]
    fn test_median_ignores_nan() {
        let v = vec![f64::NAN, 5.0, 1.0, f64::NAN, 3.0];
        assert_relative_eq!(nan_median(v), 3.0);
        assert!(nan_median(vec![f64::NAN, f64::NAN]).is_nan());
        assert!(nan_median(Vec::<f64>::new()).is_nan());
    }

    #[test]
    fn test_moving_mean_constant() {
        let out = circular_moving_mean(&[2.0; 25], 10);
        assert_eq!(out.len(), 25);
        for x in out {
            assert_relative_eq!(x, 2.0);
        }
    }

    #[test]
    fn test_moving_mean_is_centered() {
        // Spike at 12 reaches outputs 7 ..= 16 for w = 10
        let mut v = vec![0.0; 30];
        v[12] = 10.0;
        let out = circular_moving_mean(&v, 10);
        for (k, x) in out.iter().enumerate() {
            if (7..=16).contains(&k) {
                assert_relative_eq!(*x, 1.0);
            } else {
                assert_relative_eq!(*x, 0.0);
            }
        }
    }

    #[test]
    fn test_moving_mean_wraps() {
        let mut v = vec![0.0; 20];
        v[0] = 10.0;
        let out = circular_moving_mean(&v, 10);
        assert_relative_eq!(out[19], 1.0);
        assert_relative_eq!(out[15], 1.0);
        assert_relative_eq!(out[14], 0.0);
    }

    #[test]
    fn test_moving_mean_short_sequence() {
        let out = circular_moving_mean(&[1.0, 3.0, f64::NAN], 10);
        for x in out {
            assert_relative_eq!(x, 2.0);
        }
    }
}
