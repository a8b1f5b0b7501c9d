//! Multiple-testing correction.
//!
//! ```
//! use u_assoc::correction::benjamini_hochberg;
//!
//! let adjusted = benjamini_hochberg(&[0.01, 0.04, 0.03, 0.20]);
//! assert!((adjusted[0] - 0.04).abs() < 1e-12);
//! assert!((adjusted[1] - 0.0533333).abs() < 1e-6);
//! assert!((adjusted[3] - 0.20).abs() < 1e-12);
//! ```

/// Benjamini-Hochberg step-up FDR adjustment.
///
/// Returns adjusted p-values in input order, clipped at 1. NaN inputs
/// stay NaN and are excluded from the number of tests.
pub fn benjamini_hochberg(p_values: &[f64]) -> Vec<f64> {
    adjust_finite(p_values, u_analytics::testing::benjamini_hochberg)
}

/// Bonferroni adjustment: `min(p · m, 1)`, with NaN handled as above.
pub fn bonferroni(p_values: &[f64]) -> Vec<f64> {
    adjust_finite(p_values, u_analytics::testing::bonferroni_correction)
}

/// Applies `adjust` to the finite p-values and scatters the result back.
fn adjust_finite(p_values: &[f64], adjust: fn(&[f64]) -> Option<Vec<f64>>) -> Vec<f64> {
    let kept: Vec<usize> = (0..p_values.len())
        .filter(|&i| p_values[i].is_finite())
        .collect();
    let finite: Vec<f64> = kept.iter().map(|&i| p_values[i]).collect();

    let mut adjusted = vec![f64::NAN; p_values.len()];
    if let Some(values) = adjust(&finite) {
        for (&idx, value) in kept.iter().zip(values) {
            adjusted[idx] = value;
        }
    }
    adjusted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bh_is_monotone_in_sorted_order() {
        let p = [0.001, 0.008, 0.039, 0.041, 0.042, 0.06, 0.074, 0.205];
        let adj = benjamini_hochberg(&p);
        for w in adj.windows(2) {
            assert!(w[0] <= w[1] + 1e-15);
        }
        // 0.042 * 8 / 5 dominates ranks 3..5
        assert!((adj[2] - 0.0672).abs() < 1e-12);
        assert!((adj[4] - 0.0672).abs() < 1e-12);
        assert!((adj[7] - 0.205).abs() < 1e-12);
    }

    #[test]
    fn bh_clips_at_one_and_keeps_order() {
        let adj = benjamini_hochberg(&[0.9, 0.5]);
        assert!((adj[0] - 0.9).abs() < 1e-12);
        assert!((adj[1] - 0.9).abs() < 1e-12);
        assert!(benjamini_hochberg(&[]).is_empty());
    }

    #[test]
    fn bh_skips_nan() {
        let adj = benjamini_hochberg(&[0.01, f64::NAN, 0.02]);
        assert!(adj[1].is_nan());
        assert!((adj[0] - 0.02).abs() < 1e-12);
        assert!((adj[2] - 0.02).abs() < 1e-12);
    }

    #[test]
    fn bonferroni_caps() {
        assert_eq!(bonferroni(&[0.01, 0.5]), vec![0.02, 1.0]);
        assert!(bonferroni(&[]).is_empty());
        let adj = bonferroni(&[0.01, f64::NAN]);
        assert!((adj[0] - 0.01).abs() < 1e-12);
        assert!(adj[1].is_nan());
    }
}
