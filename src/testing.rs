//! Hypothesis tests used by the association pipeline.
//!
//! Pearson, Spearman and Fisher's exact test delegate to `u_analytics`.
//! The rank tests, Yates-corrected chi-square, Dunn and Lilliefors are
//! computed here against `statrs` distributions. Degenerate input gives
//! `None` instead of a NaN result, except where noted.
//!
//! # Example
//!
//! ```
//! use u_assoc::testing::{kruskal_wallis, mann_whitney_u, MannWhitneyMethod};
//!
//! let a = [1.1, 2.3, 1.9, 2.2, 1.4, 1.8];
//! let b = [3.4, 4.1, 3.9, 4.4, 3.6, 5.0];
//! let mw = mann_whitney_u(&a, &b, MannWhitneyMethod::Asymptotic).unwrap();
//! assert!(mw.p_value < 0.01);
//!
//! let kw = kruskal_wallis(&[&a[..], &b[..]]).unwrap();
//! assert!(kw.p_value < 0.01);
//! ```

use statrs::distribution::{ChiSquared, ContinuousCDF, Normal};
use std::cmp::Ordering;

/// Statistic and two-sided p-value of a test.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TestResult {
    pub statistic: f64,
    pub p_value: f64,
}

// ── Ranking ─────────────────────────────────────────────────────────

/// Sorted index permutation plus the `[start, end)` spans of equal values.
fn tie_spans(data: &[f64]) -> (Vec<usize>, Vec<(usize, usize)>) {
    let mut order: Vec<usize> = (0..data.len()).collect();
    order.sort_by(|&a, &b| data[a].partial_cmp(&data[b]).unwrap_or(Ordering::Equal));

    let mut spans = Vec::new();
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && data[order[end]] == data[order[start]] {
            end += 1;
        }
        spans.push((start, end));
        start = end;
    }
    (order, spans)
}

/// 1-based ranks; tied values share their average rank.
///
/// ```
/// use u_assoc::testing::rank_average;
///
/// assert_eq!(rank_average(&[10.0, 20.0, 10.0, 30.0]), vec![1.5, 3.0, 1.5, 4.0]);
/// ```
pub fn rank_average(data: &[f64]) -> Vec<f64> {
    let (order, spans) = tie_spans(data);
    let mut ranks = vec![0.0; data.len()];
    for (start, end) in spans {
        let avg = (start + 1 + end) as f64 / 2.0;
        for &idx in &order[start..end] {
            ranks[idx] = avg;
        }
    }
    ranks
}

/// Σ (t³ − t) over tie groups of size t.
fn tie_term(data: &[f64]) -> f64 {
    let (_, spans) = tie_spans(data);
    spans
        .iter()
        .map(|(s, e)| {
            let t = (e - s) as f64;
            t * t * t - t
        })
        .sum()
}

fn has_ties(data: &[f64]) -> bool {
    let (_, spans) = tie_spans(data);
    spans.len() < data.len()
}

fn standard_normal() -> Option<Normal> {
    Normal::new(0.0, 1.0).ok()
}

// ── Correlation ─────────────────────────────────────────────────────

/// Pearson product-moment correlation with a two-sided t-test p-value.
///
/// Returns `None` for fewer than 3 pairs, unequal lengths or a constant input.
pub fn pearson(x: &[f64], y: &[f64]) -> Option<TestResult> {
    u_analytics::correlation::pearson(x, y).map(|c| TestResult {
        statistic: c.r,
        p_value: c.p_value,
    })
}

/// Spearman rank correlation (Pearson on average ranks).
///
/// ```
/// use u_assoc::testing::spearman;
///
/// let x = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
/// let y = [1.0, 8.0, 27.0, 64.0, 125.0, 216.0];
/// let r = spearman(&x, &y).unwrap();
/// assert!((r.statistic - 1.0).abs() < 1e-12);
/// ```
pub fn spearman(x: &[f64], y: &[f64]) -> Option<TestResult> {
    u_analytics::correlation::spearman(x, y).map(|c| TestResult {
        statistic: c.r,
        p_value: c.p_value,
    })
}

// ── Rank tests ──────────────────────────────────────────────────────

/// How the Mann-Whitney U p-value is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MannWhitneyMethod {
    /// Normal approximation with tie and continuity correction.
    Asymptotic,
    /// Exact null distribution when a sample has at most 8 observations
    /// and there are no ties; asymptotic otherwise.
    Auto,
}

/// Two-sided Mann-Whitney U test. The statistic is U of `x`.
///
/// When every pooled value is tied the p-value is 1.
pub fn mann_whitney_u(x: &[f64], y: &[f64], method: MannWhitneyMethod) -> Option<TestResult> {
    let (n1, n2) = (x.len(), y.len());
    if n1 == 0 || n2 == 0 {
        return None;
    }

    let pooled: Vec<f64> = x.iter().chain(y).copied().collect();
    let ranks = rank_average(&pooled);
    let r1: f64 = ranks[..n1].iter().sum();
    let (n1f, n2f) = (n1 as f64, n2 as f64);
    let u1 = r1 - n1f * (n1f + 1.0) / 2.0;
    let u2 = n1f * n2f - u1;
    let u = u1.max(u2);

    let exact = method == MannWhitneyMethod::Auto
        && (n1 <= 8 || n2 <= 8)
        && !has_ties(&pooled);

    let p_value = if exact {
        2.0 * mann_whitney_exact_sf(u, n1, n2)
    } else {
        let n = n1f + n2f;
        let ties = tie_term(&pooled);
        let sigma = (n1f * n2f / 12.0 * ((n + 1.0) - ties / (n * (n - 1.0)))).sqrt();
        if sigma > 0.0 {
            let z = (u - n1f * n2f / 2.0 - 0.5) / sigma;
            2.0 * standard_normal()?.sf(z)
        } else {
            // every value tied
            1.0
        }
    };

    Some(TestResult {
        statistic: u1,
        p_value: p_value.clamp(0.0, 1.0),
    })
}

/// P(U ≥ u) under the null for sample sizes `n1`, `n2` without ties.
///
/// The count of arrangements with U = k is the k-th coefficient of the
/// Gaussian binomial coefficient `[n1 + n2, n1]_q`.
fn mann_whitney_exact_sf(u: f64, n1: usize, n2: usize) -> f64 {
    let (m, n) = if n1 <= n2 { (n1, n2) } else { (n2, n1) };
    let max_u = m * n;
    let mut coeffs = vec![0.0f64; max_u + 1];
    coeffs[0] = 1.0;

    for i in 1..=m {
        // multiply by (1 - q^(n+i))
        let shift = n + i;
        for k in (shift..=max_u).rev() {
            coeffs[k] -= coeffs[k - shift];
        }
        // divide by (1 - q^i)
        for k in i..=max_u {
            coeffs[k] += coeffs[k - i];
        }
    }

    let total: f64 = coeffs.iter().sum();
    let from = u.ceil().max(0.0) as usize;
    if from > max_u {
        return 0.0;
    }
    coeffs[from..].iter().sum::<f64>() / total
}

/// Kruskal-Wallis H test (tie-corrected, chi-squared with k − 1 df).
///
/// Requires at least two non-empty groups and some variation.
pub fn kruskal_wallis(groups: &[&[f64]]) -> Option<TestResult> {
    if groups.len() < 2 || groups.iter().any(|g| g.is_empty()) {
        return None;
    }

    let pooled: Vec<f64> = groups.iter().flat_map(|g| g.iter().copied()).collect();
    let n = pooled.len() as f64;
    let ranks = rank_average(&pooled);

    let mut offset = 0;
    let mut sum_term = 0.0;
    for g in groups {
        let rank_sum: f64 = ranks[offset..offset + g.len()].iter().sum();
        sum_term += rank_sum * rank_sum / g.len() as f64;
        offset += g.len();
    }

    let correction = 1.0 - tie_term(&pooled) / (n * n * n - n);
    if correction <= 0.0 {
        return None;
    }
    let h = (12.0 / (n * (n + 1.0)) * sum_term - 3.0 * (n + 1.0)) / correction;

    let dist = ChiSquared::new((groups.len() - 1) as f64).ok()?;
    Some(TestResult {
        statistic: h,
        p_value: dist.sf(h),
    })
}

// ── Contingency tests ───────────────────────────────────────────────

/// Result of a chi-squared test of independence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChiSquareResult {
    pub statistic: f64,
    pub p_value: f64,
    pub dof: usize,
}

/// Chi-squared test of independence on a row-major table.
///
/// With `yates` set, Yates' continuity correction is applied when the
/// table has one degree of freedom. Returns `None` if any expected
/// frequency is zero or the shape is inconsistent.
///
/// ```
/// use u_assoc::testing::chi_square_independence;
///
/// let table = [30.0, 10.0, 10.0, 30.0];
/// let res = chi_square_independence(&table, 2, 2, true).unwrap();
/// assert_eq!(res.dof, 1);
/// assert!((res.statistic - 18.05).abs() < 1e-9);
/// ```
pub fn chi_square_independence(
    table: &[f64],
    n_rows: usize,
    n_cols: usize,
    yates: bool,
) -> Option<ChiSquareResult> {
    if n_rows == 0 || n_cols == 0 || table.len() != n_rows * n_cols {
        return None;
    }
    let total: f64 = table.iter().sum();
    if total <= 0.0 {
        return None;
    }

    let row_totals: Vec<f64> = (0..n_rows)
        .map(|r| table[r * n_cols..(r + 1) * n_cols].iter().sum())
        .collect();
    let col_totals: Vec<f64> = (0..n_cols)
        .map(|c| (0..n_rows).map(|r| table[r * n_cols + c]).sum())
        .collect();

    let dof = (n_rows - 1) * (n_cols - 1);
    let mut statistic = 0.0;
    for r in 0..n_rows {
        for c in 0..n_cols {
            let expected = row_totals[r] * col_totals[c] / total;
            if expected <= 0.0 {
                return None;
            }
            let mut observed = table[r * n_cols + c];
            if yates && dof == 1 {
                let diff = expected - observed;
                observed += diff.signum() * diff.abs().min(0.5);
            }
            statistic += (observed - expected).powi(2) / expected;
        }
    }

    if dof == 0 {
        return Some(ChiSquareResult {
            statistic: 0.0,
            p_value: 1.0,
            dof,
        });
    }

    let dist = ChiSquared::new(dof as f64).ok()?;
    Some(ChiSquareResult {
        statistic,
        p_value: dist.sf(statistic),
        dof,
    })
}

/// Fisher's exact test on a 2×2 table `[[a, b], [c, d]]`.
///
/// The statistic is the sample odds ratio `ad / bc` (infinite when
/// `bc = 0`). The two-sided p-value sums the probabilities of all tables
/// with the same margins that are no more likely than the observed one.
/// A zero row or column total gives a NaN statistic with p = 1.
///
/// ```
/// use u_assoc::testing::fisher_exact;
///
/// let res = fisher_exact([8, 2, 1, 5]).unwrap();
/// assert!((res.statistic - 20.0).abs() < 1e-12);
/// assert!((res.p_value - 0.034965).abs() < 1e-5);
/// ```
pub fn fisher_exact(table: [u64; 4]) -> Option<TestResult> {
    let [a, b, c, d] = table;
    if a + b == 0 || c + d == 0 || a + c == 0 || b + d == 0 {
        return Some(TestResult {
            statistic: f64::NAN,
            p_value: 1.0,
        });
    }
    u_analytics::testing::fisher_exact_test(a, b, c, d).map(|r| TestResult {
        statistic: r.statistic,
        p_value: r.p_value,
    })
}

// ── Post-hoc ────────────────────────────────────────────────────────

/// One pairwise comparison from Dunn's test.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DunnComparison {
    /// Index of the first group.
    pub i: usize,
    /// Index of the second group (`j > i`).
    pub j: usize,
    pub z: f64,
    /// Bonferroni-adjusted two-sided p-value.
    pub p_value: f64,
}

/// Dunn's multiple comparison test with tie correction and Bonferroni
/// adjustment over all k(k − 1)/2 pairs.
pub fn dunn(groups: &[&[f64]]) -> Option<Vec<DunnComparison>> {
    if groups.len() < 2 || groups.iter().any(|g| g.is_empty()) {
        return None;
    }

    let pooled: Vec<f64> = groups.iter().flat_map(|g| g.iter().copied()).collect();
    let n = pooled.len() as f64;
    let ranks = rank_average(&pooled);

    let mut mean_ranks = Vec::with_capacity(groups.len());
    let mut offset = 0;
    for g in groups {
        let sum: f64 = ranks[offset..offset + g.len()].iter().sum();
        mean_ranks.push(sum / g.len() as f64);
        offset += g.len();
    }

    let ties = tie_term(&pooled) / (12.0 * (n - 1.0));
    let spread = n * (n + 1.0) / 12.0 - ties;
    if !(spread > 0.0) {
        return None;
    }
    let normal = standard_normal()?;

    let mut raw = Vec::new();
    for i in 0..groups.len() {
        for j in (i + 1)..groups.len() {
            let se = (spread * (1.0 / groups[i].len() as f64 + 1.0 / groups[j].len() as f64)).sqrt();
            let z = (mean_ranks[i] - mean_ranks[j]).abs() / se;
            raw.push((i, j, z, 2.0 * normal.sf(z)));
        }
    }

    let adjusted = crate::correction::bonferroni(&raw.iter().map(|r| r.3).collect::<Vec<_>>());
    Some(
        raw.into_iter()
            .zip(adjusted)
            .map(|((i, j, z, _), p_value)| DunnComparison { i, j, z, p_value })
            .collect(),
    )
}

// ── Normality ───────────────────────────────────────────────────────

/// Lilliefors test for normality with estimated mean and variance.
///
/// The statistic is the Kolmogorov-Smirnov distance to the fitted normal.
/// P-values follow Dallal & Wilkinson (1986), switching to Stephens'
/// polynomial approximation when the first estimate exceeds 0.1.
/// Requires at least 5 observations and nonzero variance.
pub fn lilliefors(data: &[f64]) -> Option<TestResult> {
    let n = data.len();
    if n < 5 || data.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let mean = u_numflow::stats::mean(data)?;
    let sd = u_numflow::stats::std_dev(data)?;
    if !(sd > 0.0) {
        return None;
    }

    let normal = standard_normal()?;
    let mut sorted = data.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

    let nf = n as f64;
    let mut d = 0.0f64;
    for (i, x) in sorted.iter().enumerate() {
        let cdf = normal.cdf((x - mean) / sd);
        let upper = (i + 1) as f64 / nf - cdf;
        let lower = cdf - i as f64 / nf;
        d = d.max(upper).max(lower);
    }

    Some(TestResult {
        statistic: d,
        p_value: lilliefors_p_value(d, n),
    })
}

fn lilliefors_p_value(d: f64, n: usize) -> f64 {
    let nf = n as f64;
    let (kd, nd) = if n <= 100 {
        (d, nf)
    } else {
        (d * (nf / 100.0).powf(0.49), 100.0)
    };

    let p = (-7.01256 * kd * kd * (nd + 2.78019) + 2.99587 * kd * (nd + 2.78019).sqrt()
        - 0.122119
        + 0.974598 / nd.sqrt()
        + 1.67997 / nd)
        .exp();
    if p <= 0.1 {
        return p;
    }

    let kk = (nf.sqrt() - 0.01 + 0.85 / nf.sqrt()) * d;
    let p = if kk <= 0.302 {
        1.0
    } else if kk <= 0.5 {
        2.76773 - 19.828315 * kk + 80.709644 * kk.powi(2) - 138.55152 * kk.powi(3)
            + 81.218052 * kk.powi(4)
    } else if kk <= 0.9 {
        -4.901232 + 40.662806 * kk - 97.490286 * kk.powi(2) + 94.029866 * kk.powi(3)
            - 32.355711 * kk.powi(4)
    } else if kk <= 1.31 {
        6.198765 - 19.558097 * kk + 23.186922 * kk.powi(2) - 12.234627 * kk.powi(3)
            + 2.423045 * kk.powi(4)
    } else {
        0.0
    };
    p.clamp(0.0, 1.0)
}

// ── Tests ───────────────────────────────────────────────────────────
