/// Pearson correlation of two equally long series
///
/// Returns None for fewer than 2 points, mismatched lengths, or a series
/// with zero variance.
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    let n = xs.len();
    if n < 2 || n != ys.len() {
        return None;
    }

    let mean_x = xs.iter().sum::<f64>() / n as f64;
    let mean_y = ys.iter().sum::<f64>() / n as f64;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x <= f64::EPSILON || var_y <= f64::EPSILON {
        return None;
    }

    let r = cov / (var_x.sqrt() * var_y.sqrt());
    if r.is_finite() {
        Some(r.clamp(-1.0, 1.0))
    } else {
        None
    }
}

/// Correlation of the most recent samples both series have in common
pub fn tail_correlation(xs: &[f64], ys: &[f64]) -> Option<f64> {
    let n = xs.len().min(ys.len());
    pearson(&xs[xs.len() - n..], &ys[ys.len() - n..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_positive_correlation() {
        let a: Vec<f64> = (0..10).map(|i| 100.0 + i as f64).collect();
        let b: Vec<f64> = (0..10).map(|i| 10.0 + i as f64).collect();

        let r = pearson(&a, &b).unwrap();
        assert!((r - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_perfect_negative_correlation() {
        let a = [1.0, 2.0, 3.0, 4.0];
        let b = [8.0, 6.0, 4.0, 2.0];

        let r = pearson(&a, &b).unwrap();
        assert!((r + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_flat_series_has_no_correlation() {
        assert_eq!(pearson(&[5.0, 5.0, 5.0], &[1.0, 2.0, 3.0]), None);
    }

    #[test]
    fn test_needs_two_points() {
        assert_eq!(pearson(&[1.0], &[2.0]), None);
        assert_eq!(tail_correlation(&[1.0, 2.0, 3.0], &[4.0]), None);
    }

    #[test]
    fn test_tail_alignment_uses_latest_samples() {
        // Older samples of `a` trend down, the overlapping tail trends up
        let a = [9.0, 8.0, 7.0, 1.0, 2.0, 3.0];
        let b = [10.0, 20.0, 30.0];

        let r = tail_correlation(&a, &b).unwrap();
        assert!((r - 1.0).abs() < 1e-12);
    }
}
