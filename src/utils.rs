use crate::config::SCREEN_WIDTH;
use crate::types::Point;
use ndarray::Array2;

/// Mean and sample standard deviation (n - 1 denominator).
/// A single value has a standard deviation of zero.
pub fn mean_and_std(values: &[f32]) -> (f32, f32) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f32;
    let mean = values.iter().sum::<f32>() / n;
    if values.len() < 2 {
        return (mean, 0.0);
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / (n - 1.0);
    (mean, variance.sqrt())
}

/// Center distance scaled by the arena width.
pub fn normalized_distance(a: Point, b: Point) -> f32 {
    a.distance(&b) / SCREEN_WIDTH
}

/// Numerically stable softmax over each row, in place.
pub fn softmax_rows(logits: &mut Array2<f32>) {
    for mut row in logits.rows_mut() {
        let max = row.fold(f32::NEG_INFINITY, |a, &b| a.max(b));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row /= sum;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use ndarray::array;

    #[test]
    fn test_mean_and_sample_std() {
        let (mean, std) = mean_and_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert_approx_eq!(mean, 5.0);
        assert_approx_eq!(std, 2.13809, 1e-4);
        assert_eq!(mean_and_std(&[3.0]), (3.0, 0.0));
        assert_eq!(mean_and_std(&[]), (0.0, 0.0));
    }

    #[test]
    fn test_normalized_distance() {
        let d = normalized_distance(Point::new(0.0, 0.0), Point::new(0.0, 416.0));
        assert_approx_eq!(d, 0.5);
    }

    #[test]
    fn test_softmax_rows() {
        let mut logits = array![[1000.0, 1000.0, 1000.0], [0.0, 1.0, 2.0]];
        softmax_rows(&mut logits);
        assert_approx_eq!(logits[[0, 0]], 1.0 / 3.0);
        let q = logits.row(1);
        assert_approx_eq!(q.sum(), 1.0, 1e-6);
        assert!(q[2] > q[1] && q[1] > q[0]);
    }
}
