//! Per-dimension z-score feature scaling, fitted once at store load time.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Fitted per-dimension mean/stddev, applied to prototypes at load and to
/// every query vector at classify time. Absent when the store's expected
/// dimensionality is 2048 (embedding mode bypasses scaling entirely).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureScaler {
    mean: Vec<f64>,
    stddev: Vec<f64>,
}

impl FeatureScaler {
    /// Fit mean/sample-stddev per dimension across `vectors`. Dimensions with
    /// `stddev < 1e-10` are neutralised to `1.0` so they pass through
    /// untouched rather than dividing by (near-)zero.
    pub fn fit(vectors: &[Vec<f64>]) -> Option<Self> {
        let dim = vectors.first()?.len();
        if dim == 0 {
            return None;
        }
        let n = vectors.len() as f64;

        let mut mean = vec![0.0f64; dim];
        for v in vectors {
            for (m, &x) in mean.iter_mut().zip(v.iter()) {
                *m += x;
            }
        }
        for m in mean.iter_mut() {
            *m /= n;
        }

        let mut stddev = vec![0.0f64; dim];
        for v in vectors {
            for (s, (&x, &m)) in stddev.iter_mut().zip(v.iter().zip(mean.iter())) {
                *s += (x - m).powi(2);
            }
        }
        for s in stddev.iter_mut() {
            *s = (*s / n).sqrt();
            if *s < 1e-10 {
                *s = 1.0;
            }
        }

        Some(Self { mean, stddev })
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    /// `x'[i] = (x[i] - mean[i]) / stddev[i]`. On dimension mismatch, logs a
    /// warning and returns the input unchanged rather than erroring.
    pub fn transform(&self, x: &[f64]) -> Vec<f64> {
        if x.len() != self.mean.len() {
            warn!(
                expected = self.mean.len(),
                got = x.len(),
                "feature scaler dimension mismatch, bypassing scaling"
            );
            return x.to_vec();
        }
        x.iter()
            .zip(self.mean.iter())
            .zip(self.stddev.iter())
            .map(|((&v, &m), &s)| (v - m) / s)
            .collect()
    }
}

/// L2-normalise a vector in place. No-op if the norm is (near-)zero.
pub fn l2_normalize(v: &mut [f64]) {
    let norm: f64 = v.iter().map(|&x| x * x).sum::<f64>().sqrt();
    if norm < 1e-12 {
        return;
    }
    for x in v.iter_mut() {
        *x /= norm;
    }
}

pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    assert_eq!(a.len(), b.len());
    let dot: f64 = a.iter().zip(b.iter()).map(|(&x, &y)| x * y).sum();
    let na: f64 = a.iter().map(|&x| x * x).sum::<f64>().sqrt();
    let nb: f64 = b.iter().map(|&x| x * x).sum::<f64>().sqrt();
    if na < 1e-12 || nb < 1e-12 {
        return 0.0;
    }
    dot / (na * nb)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_computes_mean_and_stddev() {
        let vectors = vec![vec![1.0, 2.0], vec![3.0, 2.0], vec![5.0, 2.0]];
        let scaler = FeatureScaler::fit(&vectors).unwrap();
        assert_eq!(scaler.dim(), 2);
        let transformed = scaler.transform(&[3.0, 2.0]);
        assert!((transformed[0]).abs() < 1e-9);
        // constant dimension (all 2.0) gets stddev neutralised to 1.0
        assert!((transformed[1]).abs() < 1e-9);
    }

    #[test]
    fn fit_empty_returns_none() {
        assert!(FeatureScaler::fit(&[]).is_none());
    }

    #[test]
    fn transform_dimension_mismatch_passes_through() {
        let vectors = vec![vec![1.0, 2.0], vec![3.0, 4.0]];
        let scaler = FeatureScaler::fit(&vectors).unwrap();
        let input = vec![1.0, 2.0, 3.0];
        let out = scaler.transform(&input);
        assert_eq!(out, input);
    }

    #[test]
    fn l2_normalize_produces_unit_vector() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        let norm: f64 = v.iter().map(|&x| x * x).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-9);
    }

    #[test]
    fn l2_normalize_zero_vector_is_noop() {
        let mut v = vec![0.0, 0.0];
        l2_normalize(&mut v);
        assert_eq!(v, vec![0.0, 0.0]);
    }

    #[test]
    fn cosine_similarity_identical_is_one() {
        let a = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn cosine_similarity_orthogonal_is_zero() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-9);
    }
}
