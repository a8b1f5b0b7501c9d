//! Post-hoc pairwise comparisons for significant associations.
//!
//! | Omnibus | Post-hoc |
//! |---------|----------|
//! | Chi-square Test | Pairwise Chi-square on collapsed 2×2 tables |
//! | Mann-Whitney U | Pairwise Mann-Whitney U over all levels |
//! | Kruskal-Wallis | Dunn's test, Bonferroni-adjusted |
//!
//! Other omnibus tests have no post-hoc procedure.
//!
//! ```
//! use u_assoc::posthoc::{PostHocComparison, PostHocTest};
//!
//! let c = PostHocComparison {
//!     metadata: "medium_CAT".into(),
//!     phenotype: "growth".into(),
//!     group1: "LB".into(),
//!     group2: "M9".into(),
//!     test: PostHocTest::PairwiseMannWhitneyU,
//!     p_value: 0.004,
//!     group1_median: Some(1.8),
//!     group2_median: Some(0.9),
//!     group1_count: None,
//!     group2_count: None,
//! };
//! assert_eq!(c.comparison(), "LB vs M9");
//! assert_eq!(c.test.to_string(), "Pairwise Mann-Whitney U");
//! ```

use crate::config::AnalysisConfig;
use crate::dataset::{Crosstab, Dataset, Group};
use crate::error::AssocError;
use crate::selection::Association;
use crate::testing::{chi_square_independence, dunn, mann_whitney_u, MannWhitneyMethod};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Post-hoc procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PostHocTest {
    #[serde(rename = "Pairwise Chi-square")]
    PairwiseChiSquare,
    #[serde(rename = "Pairwise Mann-Whitney U")]
    PairwiseMannWhitneyU,
    #[serde(rename = "Dunn's Test")]
    Dunn,
}

impl std::fmt::Display for PostHocTest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PairwiseChiSquare => write!(f, "Pairwise Chi-square"),
            Self::PairwiseMannWhitneyU => write!(f, "Pairwise Mann-Whitney U"),
            Self::Dunn => write!(f, "Dunn's Test"),
        }
    }
}

/// One pairwise comparison.
///
/// Rank-based procedures fill the medians; the pairwise chi-square fills
/// the counts.
#[derive(Debug, Clone, PartialEq)]
pub struct PostHocComparison {
    pub metadata: String,
    pub phenotype: String,
    pub group1: String,
    pub group2: String,
    pub test: PostHocTest,
    pub p_value: f64,
    pub group1_median: Option<f64>,
    pub group2_median: Option<f64>,
    pub group1_count: Option<u64>,
    pub group2_count: Option<u64>,
}

impl PostHocComparison {
    /// `"group1 vs group2"`.
    pub fn comparison(&self) -> String {
        format!("{} vs {}", self.group1, self.group2)
    }
}

// ── Procedures ──────────────────────────────────────────────────────

fn degenerate(test: PostHocTest, message: String) -> AssocError {
    AssocError::Degenerate {
        test: test.to_string(),
        message,
    }
}

fn median_of(values: &[f64]) -> Option<f64> {
    u_numflow::stats::median(values)
}

/// Pairwise chi-square between row level `r` and column level `c` of a
/// metadata × phenotype table.
///
/// Each comparison collapses the table to
/// `[[n_rc, R_r − n_rc], [C_c − n_rc, N − R_r − C_c + n_rc]]` and applies
/// the Yates-corrected chi-square test. Pairs with `r == c` are skipped
/// and `{r, c}` is tested once. Comparisons are pushed to `out` as they
/// complete; the first failing one stops the procedure.
pub fn pairwise_chi_square(
    metadata: &str,
    phenotype: &str,
    table: &Crosstab,
    out: &mut Vec<PostHocComparison>,
) -> Result<(), AssocError> {
    let total = table.total();
    let mut done: Vec<(&str, &str)> = Vec::new();

    for (r, row_label) in table.row_labels.iter().enumerate() {
        let row_total = table.row_total(r);
        for (c, col_label) in table.col_labels.iter().enumerate() {
            if row_label == col_label {
                continue;
            }
            let key = if row_label <= col_label {
                (row_label.as_str(), col_label.as_str())
            } else {
                (col_label.as_str(), row_label.as_str())
            };
            if done.contains(&key) {
                continue;
            }
            done.push(key);

            let n = table.get(r, c);
            let col_total = table.col_total(c);
            let collapsed = [
                n as f64,
                (row_total - n) as f64,
                (col_total - n) as f64,
                (total + n - row_total - col_total) as f64,
            ];
            let res = chi_square_independence(&collapsed, 2, 2, true).ok_or_else(|| {
                degenerate(
                    PostHocTest::PairwiseChiSquare,
                    format!("zero expected frequency for '{row_label}' vs '{col_label}'"),
                )
            })?;

            out.push(PostHocComparison {
                metadata: metadata.to_string(),
                phenotype: phenotype.to_string(),
                group1: row_label.clone(),
                group2: col_label.clone(),
                test: PostHocTest::PairwiseChiSquare,
                p_value: res.p_value,
                group1_median: None,
                group2_median: None,
                group1_count: Some(row_total),
                group2_count: Some(total - row_total),
            });
        }
    }
    Ok(())
}

/// Mann-Whitney U test for every pair of groups, in group order.
pub fn pairwise_mann_whitney(
    metadata: &str,
    phenotype: &str,
    groups: &[Group],
    out: &mut Vec<PostHocComparison>,
) -> Result<(), AssocError> {
    for (i, g1) in groups.iter().enumerate() {
        for g2 in &groups[i + 1..] {
            let res = mann_whitney_u(&g1.values, &g2.values, MannWhitneyMethod::Auto)
                .ok_or_else(|| {
                    degenerate(
                        PostHocTest::PairwiseMannWhitneyU,
                        format!("'{}' vs '{}'", g1.label, g2.label),
                    )
                })?;
            out.push(PostHocComparison {
                metadata: metadata.to_string(),
                phenotype: phenotype.to_string(),
                group1: g1.label.clone(),
                group2: g2.label.clone(),
                test: PostHocTest::PairwiseMannWhitneyU,
                p_value: res.p_value,
                group1_median: median_of(&g1.values),
                group2_median: median_of(&g2.values),
                group1_count: None,
                group2_count: None,
            });
        }
    }
    Ok(())
}

/// Dunn's test over groups sorted by label text.
pub fn dunn_comparisons(
    metadata: &str,
    phenotype: &str,
    groups: &[Group],
    out: &mut Vec<PostHocComparison>,
) -> Result<(), AssocError> {
    let mut sorted: Vec<&Group> = groups.iter().collect();
    sorted.sort_by(|a, b| a.label.cmp(&b.label));

    let slices: Vec<&[f64]> = sorted.iter().map(|g| g.values.as_slice()).collect();
    let comparisons = dunn(&slices).ok_or_else(|| {
        degenerate(
            PostHocTest::Dunn,
            format!("{} groups with no rank variation", sorted.len()),
        )
    })?;

    for c in comparisons {
        let (g1, g2) = (sorted[c.i], sorted[c.j]);
        out.push(PostHocComparison {
            metadata: metadata.to_string(),
            phenotype: phenotype.to_string(),
            group1: g1.label.clone(),
            group2: g2.label.clone(),
            test: PostHocTest::Dunn,
            p_value: c.p_value,
            group1_median: median_of(&g1.values),
            group2_median: median_of(&g2.values),
            group1_count: None,
            group2_count: None,
        });
    }
    Ok(())
}

// ── Dispatch ────────────────────────────────────────────────────────

/// Runs the post-hoc procedure of one association, appending to `out`.
///
/// Associations whose test has no post-hoc procedure add nothing.
pub fn post_hoc_for(
    dataset: &Dataset,
    association: &Association,
    out: &mut Vec<PostHocComparison>,
) -> Result<(), AssocError> {
    let (m, p) = (association.metadata.as_str(), association.phenotype.as_str());
    match association.test.post_hoc() {
        Some(PostHocTest::PairwiseChiSquare) => {
            let table = dataset.crosstab(m, p)?.with_text_row_order();
            pairwise_chi_square(m, p, &table, out)
        }
        Some(PostHocTest::PairwiseMannWhitneyU) => {
            pairwise_mann_whitney(m, p, &dataset.groups(m, p)?, out)
        }
        Some(PostHocTest::Dunn) => dunn_comparisons(m, p, &dataset.groups(m, p)?, out),
        None => Ok(()),
    }
}

/// Runs post-hoc procedures for every association with a corrected
/// p-value below [`AnalysisConfig::fdr_alpha`].
///
/// A failing association is logged and skipped; comparisons it produced
/// before failing are kept.
pub fn post_hoc_all(
    dataset: &Dataset,
    associations: &[Association],
    config: &AnalysisConfig,
) -> Vec<PostHocComparison> {
    let mut out = Vec::new();
    let mut significant = 0usize;

    for a in associations {
        if !a.corrected_p_value.is_some_and(|q| q < config.fdr_alpha) {
            continue;
        }
        significant += 1;
        let before = out.len();
        match post_hoc_for(dataset, a, &mut out) {
            Ok(()) => debug!(
                metadata = a.metadata.as_str(),
                phenotype = a.phenotype.as_str(),
                comparisons = out.len() - before,
                "post-hoc done"
            ),
            Err(e) => warn!(
                metadata = a.metadata.as_str(),
                phenotype = a.phenotype.as_str(),
                kept = out.len() - before,
                error = %e,
                "skipping rest of post-hoc"
            ),
        }
    }

    info!(
        significant,
        comparisons = out.len(),
        "post-hoc comparisons complete"
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Variable;
    use crate::selection::AssociationTest;

    fn group(label: &str, values: &[f64]) -> Group {
        Group {
            label: label.to_string(),
            values: values.to_vec(),
        }
    }

    fn association(m: &str, p: &str, test: AssociationTest, q: f64) -> Association {
        Association {
            metadata: m.into(),
            phenotype: p.into(),
            test,
            statistic: 1.0,
            p_value: q,
            corrected_p_value: Some(q),
        }
    }

    #[test]
    fn chi_square_collapses_and_dedupes() {
        // rows: metadata levels, cols: phenotype levels
        let table = Crosstab {
            row_labels: vec!["a".into(), "b".into()],
            col_labels: vec!["a".into(), "b".into(), "c".into()],
            counts: vec![10, 20, 5, 15, 5, 25],
        };
        let mut out = Vec::new();
        pairwise_chi_square("m", "p", &table, &mut out).unwrap();

        let pairs: Vec<String> = out.iter().map(|c| c.comparison()).collect();
        // (a,a) and (b,b) skipped; (b,a) duplicates (a,b)
        assert_eq!(pairs, vec!["a vs b", "a vs c", "b vs c"]);

        // a vs b: [[20, 15], [5, 40]], N = 80
        assert_eq!(out[0].group1_count, Some(35));
        assert_eq!(out[0].group2_count, Some(45));
        let expected = chi_square_independence(&[20.0, 15.0, 5.0, 40.0], 2, 2, true)
            .unwrap()
            .p_value;
        assert!((out[0].p_value - expected).abs() < 1e-12);
        assert!(out[0].group1_median.is_none());
    }

    #[test]
    fn mann_whitney_pairs_in_group_order() {
        let groups = vec![
            group("z", &[1.0, 2.0, 3.0]),
            group("a", &[4.0, 5.0, 6.0]),
            group("m", &[7.0, 8.0, 9.5]),
        ];
        let mut out = Vec::new();
        pairwise_mann_whitney("m", "p", &groups, &mut out).unwrap();
        let pairs: Vec<String> = out.iter().map(|c| c.comparison()).collect();
        assert_eq!(pairs, vec!["z vs a", "z vs m", "a vs m"]);

        // exact two-sided p for complete separation of 3 vs 3: 2/20
        assert!((out[0].p_value - 0.1).abs() < 1e-12);
        assert_eq!(out[0].group1_median, Some(2.0));
        assert_eq!(out[2].group2_median, Some(8.0));
    }

    #[test]
    fn dunn_sorts_labels() {
        let groups = vec![
            group("c", &[7.0, 8.0, 9.0, 10.0]),
            group("a", &[1.0, 2.0, 3.0, 4.0]),
            group("b", &[4.5, 5.0, 5.5, 6.0]),
        ];
        let mut out = Vec::new();
        dunn_comparisons("m", "p", &groups, &mut out).unwrap();
        let pairs: Vec<String> = out.iter().map(|c| c.comparison()).collect();
        assert_eq!(pairs, vec!["a vs b", "a vs c", "b vs c"]);
        assert!(out.iter().all(|c| c.test == PostHocTest::Dunn));
        assert_eq!(out[1].group1_median, Some(2.5));
        assert_eq!(out[1].group2_median, Some(8.5));
        // the extreme groups differ most
        assert!(out[1].p_value < out[0].p_value);
    }

    #[test]
    fn mann_whitney_continues_past_tied_pair() {
        let groups = vec![
            group("A", &[1.0, 1.0, 1.0]),
            group("B", &[1.0, 1.0]),
            group("C", &[5.0, 6.0, 7.0]),
        ];
        let mut out = Vec::new();
        pairwise_mann_whitney("m", "p", &groups, &mut out).unwrap();
        let pairs: Vec<String> = out.iter().map(|c| c.comparison()).collect();
        assert_eq!(pairs, vec!["A vs B", "A vs C", "B vs C"]);
        assert_eq!(out[0].p_value, 1.0);
        assert!(out[1].p_value < 1.0);
    }

    #[test]
    fn dunn_orders_numeric_labels_as_text() {
        let groups = vec![
            group("2", &[1.0, 2.0, 3.0, 4.0]),
            group("10", &[7.0, 8.0, 9.0, 10.0]),
            group("3", &[4.5, 5.0, 5.5, 6.0]),
        ];
        let mut out = Vec::new();
        dunn_comparisons("m", "p", &groups, &mut out).unwrap();
        let pairs: Vec<String> = out.iter().map(|c| c.comparison()).collect();
        assert_eq!(pairs, vec!["10 vs 2", "10 vs 3", "2 vs 3"]);
    }

    #[test]
    fn chi_square_dispatch_orders_metadata_as_text() {
        let mut ds = Dataset::new();
        let sizes: Vec<Option<&str>> = (0..12)
            .map(|i| Some(if i % 2 == 0 { "2" } else { "10" }))
            .collect();
        let kinds: Vec<Option<&str>> = (0..12)
            .map(|i| Some(if i % 3 == 0 { "x" } else { "y" }))
            .collect();
        ds.add_variable(Variable::categorical("size_CAT", &sizes)).unwrap();
        ds.add_variable(Variable::categorical("kind_CAT", &kinds)).unwrap();

        let results = vec![association("size_CAT", "kind_CAT", AssociationTest::ChiSquare, 0.01)];
        let out = post_hoc_all(&ds, &results, &AnalysisConfig::default());
        let pairs: Vec<String> = out.iter().map(|c| c.comparison()).collect();
        assert_eq!(pairs, vec!["10 vs x", "10 vs y", "2 vs x", "2 vs y"]);
        assert_eq!(out[0].group1_count, Some(6));
    }

    #[test]
    fn dispatch_filters_on_corrected_p() {
        let mut ds = Dataset::new();
        let labels: Vec<Option<&str>> = (0..12)
            .map(|i| Some(if i % 2 == 0 { "x" } else { "y" }))
            .collect();
        ds.add_variable(Variable::categorical("g_CAT", &labels)).unwrap();
        ds.add_variable(Variable::numerical(
            "v",
            (0..12).map(|i| Some(i as f64)).collect(),
        ))
        .unwrap();

        let results = vec![
            association("g_CAT", "v", AssociationTest::MannWhitneyU, 0.01),
            association("g_CAT", "v", AssociationTest::MannWhitneyU, 0.2),
            association("g_CAT", "v", AssociationTest::Spearman, 0.001),
        ];
        let out = post_hoc_all(&ds, &results, &AnalysisConfig::default());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].comparison(), "x vs y");
    }

    #[test]
    fn failure_keeps_earlier_results() {
        let mut ds = Dataset::new();
        ds.add_variable(Variable::numerical(
            "v",
            (0..6).map(|i| Some(i as f64)).collect(),
        ))
        .unwrap();
        let results = vec![
            // wrong kind: metadata must be categorical
            association("v", "v", AssociationTest::KruskalWallis, 0.001),
            association("missing", "v", AssociationTest::MannWhitneyU, 0.001),
        ];
        let out = post_hoc_all(&ds, &results, &AnalysisConfig::default());
        assert!(out.is_empty());

        let table = Crosstab {
            row_labels: vec!["a".into(), "b".into()],
            col_labels: vec!["c".into(), "d".into()],
            // column "d" is empty, so every collapsed table with it has a zero margin
            counts: vec![4, 0, 6, 0],
        };
        let mut out = Vec::new();
        let err = pairwise_chi_square("m", "p", &table, &mut out);
        assert!(err.is_err());
    }
}
