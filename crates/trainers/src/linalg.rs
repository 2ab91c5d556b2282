//! Dense linear-algebra kernels backing the truncated SVD.
//!
//! Randomized range finder with power iterations, then an exact
//! eigendecomposition of the small projected Gram matrix via cyclic Jacobi
//! rotations. Seeded, so factorization is deterministic for a given input.

use ndarray::{Array1, Array2, ArrayView2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Orthonormalize the columns of `q` in place (modified Gram-Schmidt).
/// Columns that collapse to numerical zero are left as zero vectors.
fn orthonormalize(q: &mut Array2<f32>) {
    let cols = q.ncols();
    for j in 0..cols {
        for i in 0..j {
            let proj = q.column(i).dot(&q.column(j));
            let qi = q.column(i).to_owned();
            let mut qj = q.column_mut(j);
            qj.scaled_add(-proj, &qi);
        }
        let norm = q.column(j).dot(&q.column(j)).sqrt();
        if norm > 1e-10 {
            q.column_mut(j).mapv_inplace(|v| v / norm);
        } else {
            q.column_mut(j).fill(0.0);
        }
    }
}

/// Eigendecomposition of a symmetric matrix by cyclic Jacobi sweeps.
/// Returns (eigenvalues, eigenvectors-as-columns), unsorted.
fn jacobi_eigh(a: &Array2<f32>, max_sweeps: usize) -> (Array1<f32>, Array2<f32>) {
    let n = a.nrows();
    let mut a = a.clone();
    let mut v = Array2::<f32>::eye(n);

    for _ in 0..max_sweeps {
        let mut off = 0.0f32;
        for p in 0..n {
            for q in (p + 1)..n {
                off += a[[p, q]] * a[[p, q]];
            }
        }
        if off < 1e-12 {
            break;
        }

        for p in 0..n {
            for q in (p + 1)..n {
                let apq = a[[p, q]];
                if apq.abs() < 1e-12 {
                    continue;
                }
                let tau = (a[[q, q]] - a[[p, p]]) / (2.0 * apq);
                let t = tau.signum() / (tau.abs() + (1.0 + tau * tau).sqrt());
                let c = 1.0 / (1.0 + t * t).sqrt();
                let s = t * c;

                for i in 0..n {
                    let aip = a[[i, p]];
                    let aiq = a[[i, q]];
                    a[[i, p]] = c * aip - s * aiq;
                    a[[i, q]] = s * aip + c * aiq;
                }
                for i in 0..n {
                    let api = a[[p, i]];
                    let aqi = a[[q, i]];
                    a[[p, i]] = c * api - s * aqi;
                    a[[q, i]] = s * api + c * aqi;
                }
                for i in 0..n {
                    let vip = v[[i, p]];
                    let viq = v[[i, q]];
                    v[[i, p]] = c * vip - s * viq;
                    v[[i, q]] = s * vip + c * viq;
                }
            }
        }
    }

    let eigenvalues = Array1::from_iter((0..n).map(|i| a[[i, i]]));
    (eigenvalues, v)
}

/// Truncated SVD of `a` (n x m) keeping `k` components.
///
/// Returns `(u, sigma, vt)` with `u`: (n x k), `sigma`: (k), `vt`: (k x m),
/// singular values sorted descending. `k` must satisfy
/// `1 <= k <= min(n, m)`; callers bound it against the matrix shape.
pub fn truncated_svd(
    a: &ArrayView2<f32>,
    k: usize,
    power_iterations: usize,
    seed: u64,
) -> (Array2<f32>, Array1<f32>, Array2<f32>) {
    let (n, m) = a.dim();
    debug_assert!(k >= 1 && k <= n.min(m));

    let mut rng = StdRng::seed_from_u64(seed);
    let omega = Array2::from_shape_fn((m, k), |_| rng.gen_range(-1.0f32..1.0));

    let mut q = a.dot(&omega);
    orthonormalize(&mut q);
    for _ in 0..power_iterations {
        let mut z = a.t().dot(&q);
        orthonormalize(&mut z);
        q = a.dot(&z);
        orthonormalize(&mut q);
    }

    // Project and decompose the small k x k Gram matrix.
    let b = q.t().dot(a);
    let bbt = b.dot(&b.t());
    let (eigenvalues, eigenvectors) = jacobi_eigh(&bbt, 30);

    let mut order: Vec<usize> = (0..k).collect();
    order.sort_by(|&i, &j| {
        eigenvalues[j]
            .partial_cmp(&eigenvalues[i])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut sigma = Array1::<f32>::zeros(k);
    let mut w = Array2::<f32>::zeros((k, k));
    for (rank, &idx) in order.iter().enumerate() {
        sigma[rank] = eigenvalues[idx].max(0.0).sqrt();
        w.column_mut(rank).assign(&eigenvectors.column(idx));
    }

    let u = q.dot(&w);
    let mut vt = w.t().dot(&b);
    for i in 0..k {
        if sigma[i] > 1e-8 {
            let s = sigma[i];
            vt.row_mut(i).mapv_inplace(|x| x / s);
        } else {
            vt.row_mut(i).fill(0.0);
        }
    }

    (u, sigma, vt)
}

/// Fraction of the matrix's squared Frobenius norm captured by `sigma`.
pub fn energy_captured(a: &ArrayView2<f32>, sigma: &Array1<f32>) -> f32 {
    let total: f32 = a.iter().map(|x| x * x).sum();
    if total <= 0.0 {
        return 0.0;
    }
    (sigma.iter().map(|s| s * s).sum::<f32>() / total).min(1.0)
}

/// Cosine similarity between two vectors, 0.0 when either has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na <= 0.0 || nb <= 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_svd_reconstructs_low_rank_matrix() {
        // Rank-2 matrix: outer products of two independent vectors.
        let a = array![
            [2.0f32, 4.0, 0.0, 2.0],
            [1.0, 2.0, 0.0, 1.0],
            [0.0, 0.0, 3.0, 3.0],
            [0.0, 0.0, 1.0, 1.0],
        ];
        let (u, sigma, vt) = truncated_svd(&a.view(), 3, 7, 42);

        let approx = u.dot(&Array2::from_diag(&sigma)).dot(&vt);
        for (x, y) in a.iter().zip(approx.iter()) {
            assert!((x - y).abs() < 1e-3, "reconstruction off: {x} vs {y}");
        }
    }

    #[test]
    fn test_svd_singular_values_sorted_descending() {
        let a = array![
            [5.0f32, 0.0, 0.0],
            [0.0, 3.0, 0.0],
            [0.0, 0.0, 1.0],
        ];
        let (_, sigma, _) = truncated_svd(&a.view(), 3, 7, 1);
        assert!(sigma[0] >= sigma[1] && sigma[1] >= sigma[2]);
        assert!((sigma[0] - 5.0).abs() < 1e-3);
    }

    #[test]
    fn test_svd_is_deterministic_for_a_seed() {
        let a = array![[1.0f32, 2.0], [3.0, 4.0], [5.0, 6.0]];
        let (u1, s1, v1) = truncated_svd(&a.view(), 1, 7, 9);
        let (u2, s2, v2) = truncated_svd(&a.view(), 1, 7, 9);
        assert_eq!(u1, u2);
        assert_eq!(s1, s2);
        assert_eq!(v1, v2);
    }

    #[test]
    fn test_energy_captured_bounds() {
        let a = array![[3.0f32, 0.0], [0.0, 4.0]];
        let (_, sigma, _) = truncated_svd(&a.view(), 2, 7, 0);
        let energy = energy_captured(&a.view(), &sigma);
        assert!(energy > 0.99 && energy <= 1.0);
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[0.0, 1.0])).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }
}
