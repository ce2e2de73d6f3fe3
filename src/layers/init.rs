//! Parameter initializers.
//!
//! Recurrent kernels use orthogonal initialization (Saxe et al., 2014): a
//! Gaussian matrix is orthonormalised with modified Gram-Schmidt so that
//! repeated multiplication by it neither shrinks nor blows up the hidden
//! state at the start of training.

use rand::Rng;
use rand_distr::{Distribution, StandardNormal, Uniform};

/// `size` values drawn uniformly from `[-limit, limit)`
pub fn uniform_init(size: usize, limit: f32, rng: &mut impl Rng) -> Vec<f32> {
    if limit <= 0.0 {
        return vec![0.0; size];
    }
    let dist = Uniform::new(-limit, limit);
    (0..size).map(|_| dist.sample(rng)).collect()
}

/// A `[rows, cols]` matrix with orthonormal rows (if `rows <= cols`) or
/// orthonormal columns (otherwise), flattened row-major
pub fn orthogonal_init(rows: usize, cols: usize, rng: &mut impl Rng) -> Vec<f32> {
    // Work on the "short" side so vectors being orthonormalised are the long ones
    let (n_vecs, dim) = if rows <= cols { (rows, cols) } else { (cols, rows) };

    let mut basis: Vec<Vec<f64>> = Vec::with_capacity(n_vecs);

    while basis.len() < n_vecs {
        let mut v: Vec<f64> = (0..dim).map(|_| StandardNormal.sample(rng)).collect();
        for b in &basis {
            let proj: f64 = v.iter().zip(b).map(|(x, y)| x * y).sum();
            for (x, y) in v.iter_mut().zip(b) {
                *x -= proj * y;
            }
        }
        let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
        // Degenerate draw (numerically dependent), try again
        if norm < 1e-8 {
            continue;
        }
        v.iter_mut().for_each(|x| *x /= norm);
        basis.push(v);
    }

    let mut out = vec![0.0f32; rows * cols];
    for (k, v) in basis.iter().enumerate() {
        for (d, &val) in v.iter().enumerate() {
            let (r, c) = if rows <= cols { (k, d) } else { (d, k) };
            out[r * cols + c] = val as f32;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_orthogonal_square_is_orthonormal() {
        let mut rng = StdRng::seed_from_u64(7);
        let n = 6;
        let w = orthogonal_init(n, n, &mut rng);
        for i in 0..n {
            for j in 0..n {
                let dot: f32 = (0..n).map(|k| w[i * n + k] * w[j * n + k]).sum();
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((dot - expected).abs() < 1e-4, "row {} . row {} = {}", i, j, dot);
            }
        }
    }

    #[test]
    fn test_orthogonal_tall_has_orthonormal_columns() {
        let mut rng = StdRng::seed_from_u64(11);
        let (rows, cols) = (8, 3);
        let w = orthogonal_init(rows, cols, &mut rng);
        for i in 0..cols {
            for j in 0..cols {
                let dot: f32 = (0..rows).map(|k| w[k * cols + i] * w[k * cols + j]).sum();
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((dot - expected).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn test_uniform_within_limit() {
        let mut rng = StdRng::seed_from_u64(3);
        let v = uniform_init(1000, 0.25, &mut rng);
        assert!(v.iter().all(|&x| (-0.25..0.25).contains(&x)));
    }
}
