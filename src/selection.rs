//! Association test selection and execution.
//!
//! Every unordered pair of variables gets at most one omnibus test, chosen
//! by the pair's types and data-quality conditions:
//!
//! | Pair | Condition | Test |
//! |------|-----------|------|
//! | num-num | both normality p > α | Pearson |
//! | num-num | otherwise | Spearman |
//! | cat-num | 2 groups with enough rows | Mann-Whitney U |
//! | cat-num | 3+ groups with enough rows | Kruskal-Wallis |
//! | cat-cat | 2×2 with a cell below the threshold | Fisher's exact |
//! | cat-cat | otherwise | chi-square (Yates when df = 1) |
//!
//! All p-values are then adjusted with Benjamini-Hochberg.

use crate::config::AnalysisConfig;
use crate::correction::benjamini_hochberg;
use crate::dataset::{Crosstab, Dataset, Variable, VariableKind};
use crate::error::AssocError;
use crate::normality::{verdict, NormalityRecord, NormalityVerdict};
use crate::posthoc::PostHocTest;
use crate::testing::{
    chi_square_independence, fisher_exact, kruskal_wallis, mann_whitney_u, pearson, spearman,
    MannWhitneyMethod, TestResult,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info, warn};

// ── Tests ───────────────────────────────────────────────────────────

/// Omnibus association test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssociationTest {
    #[serde(rename = "Pearson")]
    Pearson,
    #[serde(rename = "Spearman")]
    Spearman,
    #[serde(rename = "Mann-Whitney U")]
    MannWhitneyU,
    #[serde(rename = "Kruskal-Wallis")]
    KruskalWallis,
    #[serde(rename = "Chi-square Test")]
    ChiSquare,
    #[serde(rename = "Fisher's Exact Test")]
    FisherExact,
}

impl AssociationTest {
    /// Post-hoc procedure run when this test is significant.
    pub fn post_hoc(self) -> Option<PostHocTest> {
        match self {
            Self::ChiSquare => Some(PostHocTest::PairwiseChiSquare),
            Self::MannWhitneyU => Some(PostHocTest::PairwiseMannWhitneyU),
            Self::KruskalWallis => Some(PostHocTest::Dunn),
            Self::Pearson | Self::Spearman | Self::FisherExact => None,
        }
    }
}

impl std::fmt::Display for AssociationTest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Pearson => "Pearson",
            Self::Spearman => "Spearman",
            Self::MannWhitneyU => "Mann-Whitney U",
            Self::KruskalWallis => "Kruskal-Wallis",
            Self::ChiSquare => "Chi-square Test",
            Self::FisherExact => "Fisher's Exact Test",
        };
        f.write_str(name)
    }
}

/// Result of one omnibus test.
#[derive(Debug, Clone, PartialEq)]
pub struct Association {
    pub metadata: String,
    pub phenotype: String,
    pub test: AssociationTest,
    pub statistic: f64,
    pub p_value: f64,
    /// Benjamini-Hochberg adjusted p-value over all associations.
    pub corrected_p_value: Option<f64>,
}

/// Why a pair produced no association.
#[derive(Debug, Clone, PartialEq)]
pub enum Skip {
    /// Not more complete rows than the configured minimum.
    TooFewRows(usize),
    /// Fewer than two groups with enough rows.
    TooFewGroups(usize),
    /// Contingency table smaller than 2×2.
    TableTooSmall { rows: usize, cols: usize },
    /// The normality test of this column failed.
    NormalityUnavailable(String),
    /// The statistic could not be computed.
    Degenerate(AssociationTest),
    /// Lookup or kind error.
    Invalid(AssocError),
}

impl From<AssocError> for Skip {
    fn from(e: AssocError) -> Self {
        Skip::Invalid(e)
    }
}

// ── Decision table ──────────────────────────────────────────────────

/// Pearson when both variables read as normal, Spearman otherwise.
/// `None` when either normality test failed.
pub fn select_numeric_test(
    a: NormalityVerdict,
    b: NormalityVerdict,
    alpha: f64,
) -> Option<AssociationTest> {
    match (a, b) {
        (NormalityVerdict::PValue(pa), NormalityVerdict::PValue(pb)) => {
            if pa > alpha && pb > alpha {
                Some(AssociationTest::Pearson)
            } else {
                Some(AssociationTest::Spearman)
            }
        }
        _ => None,
    }
}

/// Mann-Whitney U for two groups, Kruskal-Wallis for more.
pub fn select_group_test(n_groups: usize) -> Option<AssociationTest> {
    match n_groups {
        0 | 1 => None,
        2 => Some(AssociationTest::MannWhitneyU),
        _ => Some(AssociationTest::KruskalWallis),
    }
}

/// Fisher's exact test for a sparse 2×2 table, chi-square otherwise.
pub fn select_contingency_test(table: &Crosstab, cell_threshold: u64) -> Option<AssociationTest> {
    if table.n_rows() < 2 || table.n_cols() < 2 {
        return None;
    }
    let sparse = table.counts.iter().any(|&c| c < cell_threshold);
    if sparse && table.counts.len() == 4 {
        Some(AssociationTest::FisherExact)
    } else {
        Some(AssociationTest::ChiSquare)
    }
}

// ── Pair evaluation ─────────────────────────────────────────────────

fn finish(
    metadata: &Variable,
    phenotype: &Variable,
    test: AssociationTest,
    result: Option<TestResult>,
) -> Result<Association, Skip> {
    match result {
        Some(r) if !r.statistic.is_nan() && !r.p_value.is_nan() => Ok(Association {
            metadata: metadata.name().to_string(),
            phenotype: phenotype.name().to_string(),
            test,
            statistic: r.statistic,
            p_value: r.p_value,
            corrected_p_value: None,
        }),
        _ => Err(Skip::Degenerate(test)),
    }
}

/// Tests a numerical phenotype against a numerical or categorical metadata variable.
pub fn evaluate_with_phenotype(
    dataset: &Dataset,
    screen: &[NormalityRecord],
    metadata: &Variable,
    phenotype: &Variable,
    config: &AnalysisConfig,
) -> Result<Association, Skip> {
    let complete = dataset.complete_count(metadata.name(), phenotype.name())?;
    if complete <= config.min_complete_rows {
        return Err(Skip::TooFewRows(complete));
    }

    match metadata.kind() {
        VariableKind::Numerical => {
            let pv = verdict(screen, phenotype.name());
            let mv = verdict(screen, metadata.name());
            let test = select_numeric_test(pv, mv, config.normality_alpha).ok_or_else(|| {
                let failed = if pv == NormalityVerdict::Unavailable {
                    phenotype.name()
                } else {
                    metadata.name()
                };
                Skip::NormalityUnavailable(failed.to_string())
            })?;
            let (m, p) = dataset.paired_values(metadata.name(), phenotype.name())?;
            let result = match test {
                AssociationTest::Pearson => pearson(&m, &p),
                _ => spearman(&m, &p),
            };
            finish(metadata, phenotype, test, result)
        }
        VariableKind::Categorical => {
            let groups: Vec<_> = dataset
                .groups(metadata.name(), phenotype.name())?
                .into_iter()
                .filter(|g| g.values.len() > config.min_group_size)
                .collect();
            let test =
                select_group_test(groups.len()).ok_or(Skip::TooFewGroups(groups.len()))?;
            let slices: Vec<&[f64]> = groups.iter().map(|g| g.values.as_slice()).collect();
            let result = match test {
                AssociationTest::MannWhitneyU => {
                    mann_whitney_u(slices[0], slices[1], MannWhitneyMethod::Asymptotic)
                }
                _ => kruskal_wallis(&slices),
            };
            finish(metadata, phenotype, test, result)
        }
    }
}

/// Tests two categorical variables.
pub fn evaluate_categorical_pair(
    dataset: &Dataset,
    first: &Variable,
    second: &Variable,
    config: &AnalysisConfig,
) -> Result<Association, Skip> {
    let complete = dataset.complete_count(first.name(), second.name())?;
    if complete <= config.min_complete_rows {
        return Err(Skip::TooFewRows(complete));
    }

    let table = dataset.crosstab(first.name(), second.name())?;
    let test = select_contingency_test(&table, config.fisher_cell_threshold).ok_or(
        Skip::TableTooSmall {
            rows: table.n_rows(),
            cols: table.n_cols(),
        },
    )?;

    let result = match test {
        AssociationTest::FisherExact => fisher_exact([
            table.get(0, 0),
            table.get(0, 1),
            table.get(1, 0),
            table.get(1, 1),
        ]),
        _ => chi_square_independence(&table.as_f64(), table.n_rows(), table.n_cols(), true).map(
            |r| TestResult {
                statistic: r.statistic,
                p_value: r.p_value,
            },
        ),
    };

    // The odds ratio may be NaN or infinite.
    match (test, result) {
        (AssociationTest::FisherExact, Some(r)) if !r.p_value.is_nan() => Ok(Association {
            metadata: first.name().to_string(),
            phenotype: second.name().to_string(),
            test,
            statistic: r.statistic,
            p_value: r.p_value,
            corrected_p_value: None,
        }),
        (_, result) => finish(first, second, test, result),
    }
}

// ── Stage driver ────────────────────────────────────────────────────

fn log_skip(metadata: &str, phenotype: &str, skip: &Skip) {
    match skip {
        Skip::NormalityUnavailable(column) => {
            warn!(metadata, phenotype, column = column.as_str(), "skipped: normality test failed")
        }
        Skip::Invalid(e) => warn!(metadata, phenotype, error = %e, "skipped"),
        other => debug!(metadata, phenotype, reason = ?other, "skipped"),
    }
}

/// Runs the omnibus test for every eligible pair and applies FDR correction.
///
/// Numerical phenotypes are paired with categorical and then numerical
/// metadata (each unordered pair once), followed by every pair of
/// categorical variables.
pub fn associate(
    dataset: &Dataset,
    screen: &[NormalityRecord],
    config: &AnalysisConfig,
) -> Vec<Association> {
    let numerical: Vec<&Variable> = dataset.variables_of(VariableKind::Numerical).collect();
    let categorical: Vec<&Variable> = dataset.variables_of(VariableKind::Categorical).collect();

    let mut results = Vec::new();
    let mut processed: HashSet<(&str, &str)> = HashSet::new();

    for &phenotype in &numerical {
        for &metadata in categorical.iter().chain(numerical.iter()) {
            if metadata.name() == phenotype.name()
                || processed.contains(&(metadata.name(), phenotype.name()))
            {
                continue;
            }
            processed.insert((phenotype.name(), metadata.name()));

            match evaluate_with_phenotype(dataset, screen, metadata, phenotype, config) {
                Ok(a) => {
                    debug!(
                        metadata = a.metadata.as_str(),
                        phenotype = a.phenotype.as_str(),
                        test = %a.test,
                        p_value = a.p_value,
                        "association tested"
                    );
                    results.push(a);
                }
                Err(skip) => log_skip(metadata.name(), phenotype.name(), &skip),
            }
        }
    }

    for (i, &first) in categorical.iter().enumerate() {
        for &second in &categorical[i + 1..] {
            match evaluate_categorical_pair(dataset, first, second, config) {
                Ok(a) => {
                    debug!(
                        metadata = a.metadata.as_str(),
                        phenotype = a.phenotype.as_str(),
                        test = %a.test,
                        p_value = a.p_value,
                        "association tested"
                    );
                    results.push(a);
                }
                Err(skip) => log_skip(first.name(), second.name(), &skip),
            }
        }
    }

    apply_fdr(&mut results);
    info!(
        associations = results.len(),
        significant = results
            .iter()
            .filter(|a| a.corrected_p_value.is_some_and(|q| q < config.fdr_alpha))
            .count(),
        "association tests complete"
    );
    results
}

/// Fills `corrected_p_value` with Benjamini-Hochberg adjusted values.
pub fn apply_fdr(results: &mut [Association]) {
    let p: Vec<f64> = results.iter().map(|a| a.p_value).collect();
    for (a, q) in results.iter_mut().zip(benjamini_hochberg(&p)) {
        a.corrected_p_value = Some(q);
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Variable;
    use crate::normality::{NormalityOutcome, NormalityTest};

    fn numeric(name: &str, values: &[f64]) -> Variable {
        Variable::numerical(name, values.iter().map(|v| Some(*v)).collect())
    }

    fn categorical(name: &str, labels: &[&str]) -> Variable {
        let labels: Vec<Option<&str>> = labels.iter().map(|l| Some(*l)).collect();
        Variable::categorical(name, &labels)
    }

    fn tested(column: &str, p_value: f64) -> NormalityRecord {
        NormalityRecord {
            column: column.to_string(),
            outcome: NormalityOutcome::Tested {
                test: NormalityTest::ShapiroWilk,
                statistic: 0.95,
                p_value,
            },
        }
    }

    // ── Decision table ──────────────────────────────────────────

    #[test]
    fn numeric_selection() {
        let normal = NormalityVerdict::PValue(0.3);
        let skewed = NormalityVerdict::PValue(0.01);
        assert_eq!(
            select_numeric_test(normal, normal, 0.05),
            Some(AssociationTest::Pearson)
        );
        assert_eq!(
            select_numeric_test(normal, skewed, 0.05),
            Some(AssociationTest::Spearman)
        );
        // p exactly at alpha is not "normal"
        assert_eq!(
            select_numeric_test(NormalityVerdict::PValue(0.05), normal, 0.05),
            Some(AssociationTest::Spearman)
        );
        assert_eq!(
            select_numeric_test(NormalityVerdict::Unavailable, normal, 0.05),
            None
        );
    }

    #[test]
    fn group_selection() {
        assert_eq!(select_group_test(1), None);
        assert_eq!(select_group_test(2), Some(AssociationTest::MannWhitneyU));
        assert_eq!(select_group_test(4), Some(AssociationTest::KruskalWallis));
    }

    #[test]
    fn contingency_selection() {
        let sparse = Crosstab {
            row_labels: vec!["a".into(), "b".into()],
            col_labels: vec!["x".into(), "y".into()],
            counts: vec![10, 4, 6, 12],
        };
        assert_eq!(
            select_contingency_test(&sparse, 5),
            Some(AssociationTest::FisherExact)
        );

        let dense = Crosstab {
            counts: vec![10, 7, 6, 12],
            ..sparse.clone()
        };
        assert_eq!(select_contingency_test(&dense, 5), Some(AssociationTest::ChiSquare));

        // sparse but larger than 2x2 stays chi-square
        let wide = Crosstab {
            row_labels: vec!["a".into(), "b".into()],
            col_labels: vec!["x".into(), "y".into(), "z".into()],
            counts: vec![1, 2, 3, 4, 5, 6],
        };
        assert_eq!(select_contingency_test(&wide, 5), Some(AssociationTest::ChiSquare));

        let narrow = Crosstab {
            row_labels: vec!["a".into()],
            col_labels: vec!["x".into(), "y".into()],
            counts: vec![3, 4],
        };
        assert_eq!(select_contingency_test(&narrow, 5), None);
    }

    #[test]
    fn post_hoc_dispatch() {
        use crate::posthoc::PostHocTest;
        assert_eq!(
            AssociationTest::ChiSquare.post_hoc(),
            Some(PostHocTest::PairwiseChiSquare)
        );
        assert_eq!(
            AssociationTest::MannWhitneyU.post_hoc(),
            Some(PostHocTest::PairwiseMannWhitneyU)
        );
        assert_eq!(AssociationTest::KruskalWallis.post_hoc(), Some(PostHocTest::Dunn));
        assert_eq!(AssociationTest::Pearson.post_hoc(), None);
        assert_eq!(AssociationTest::FisherExact.post_hoc(), None);
    }

    // ── Pair evaluation ─────────────────────────────────────────

    #[test]
    fn too_few_rows_skipped() {
        let mut ds = Dataset::new();
        ds.add_variable(numeric("a", &[1.0, 2.0, 3.0, 4.0, 5.0])).unwrap();
        ds.add_variable(numeric("b", &[2.0, 1.0, 4.0, 3.0, 5.0])).unwrap();
        let a = ds.variable("a").unwrap();
        let b = ds.variable("b").unwrap();
        let res = evaluate_with_phenotype(&ds, &[], b, a, &AnalysisConfig::default());
        assert_eq!(res.unwrap_err(), Skip::TooFewRows(5));
    }

    #[test]
    fn normal_pair_uses_pearson() {
        let mut ds = Dataset::new();
        ds.add_variable(numeric("a", &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0])).unwrap();
        ds.add_variable(numeric("b", &[1.2, 1.9, 3.1, 4.2, 4.8, 6.1])).unwrap();
        let screen = vec![tested("a", 0.6), tested("b", 0.4)];
        let a = ds.variable("a").unwrap();
        let b = ds.variable("b").unwrap();
        let res = evaluate_with_phenotype(&ds, &screen, b, a, &AnalysisConfig::default()).unwrap();
        assert_eq!(res.test, AssociationTest::Pearson);
        assert_eq!(res.metadata, "b");
        assert_eq!(res.phenotype, "a");
        assert!(res.statistic > 0.99);
    }

    #[test]
    fn failed_normality_skips_numeric_pair() {
        let mut ds = Dataset::new();
        ds.add_variable(numeric("a", &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0])).unwrap();
        ds.add_variable(numeric("b", &[1.0, 3.0, 2.0, 5.0, 4.0, 6.0])).unwrap();
        let screen = vec![NormalityRecord {
            column: "b".into(),
            outcome: NormalityOutcome::Failed,
        }];
        let a = ds.variable("a").unwrap();
        let b = ds.variable("b").unwrap();
        let res = evaluate_with_phenotype(&ds, &screen, b, a, &AnalysisConfig::default());
        assert_eq!(res.unwrap_err(), Skip::NormalityUnavailable("b".into()));
    }

    #[test]
    fn small_groups_are_dropped_before_selection() {
        let mut ds = Dataset::new();
        let labels = [
            "a", "a", "a", "a", "a", "a", "b", "b", "b", "b", "b", "b", "c", "c",
        ];
        let values: Vec<f64> = (0..14).map(|i| i as f64).collect();
        ds.add_variable(categorical("g_CAT", &labels)).unwrap();
        ds.add_variable(numeric("v", &values)).unwrap();
        let g = ds.variable("g_CAT").unwrap();
        let v = ds.variable("v").unwrap();
        let res = evaluate_with_phenotype(&ds, &[], g, v, &AnalysisConfig::default()).unwrap();
        // "c" has only 2 rows, leaving two groups
        assert_eq!(res.test, AssociationTest::MannWhitneyU);
        assert_eq!(res.statistic, 0.0);
    }

    #[test]
    fn single_large_group_is_skipped() {
        let mut ds = Dataset::new();
        let labels = ["a", "a", "a", "a", "a", "a", "b", "b"];
        ds.add_variable(categorical("g_CAT", &labels)).unwrap();
        ds.add_variable(numeric("v", &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]))
            .unwrap();
        let g = ds.variable("g_CAT").unwrap();
        let v = ds.variable("v").unwrap();
        let res = evaluate_with_phenotype(&ds, &[], g, v, &AnalysisConfig::default());
        assert_eq!(res.unwrap_err(), Skip::TooFewGroups(1));
    }

    #[test]
    fn sparse_categorical_pair_uses_fisher() {
        let mut ds = Dataset::new();
        ds.add_variable(categorical(
            "x_CAT",
            &["a", "a", "a", "a", "a", "a", "a", "a", "b", "b", "b", "b"],
        ))
        .unwrap();
        ds.add_variable(categorical(
            "y_CAT",
            &["p", "p", "p", "p", "p", "p", "p", "q", "q", "q", "q", "q"],
        ))
        .unwrap();
        let x = ds.variable("x_CAT").unwrap();
        let y = ds.variable("y_CAT").unwrap();
        let res = evaluate_categorical_pair(&ds, x, y, &AnalysisConfig::default()).unwrap();
        assert_eq!(res.test, AssociationTest::FisherExact);
        assert!(res.statistic.is_infinite());
        assert!(res.p_value < 0.05);
    }

    #[test]
    fn fully_tied_groups_are_recorded_with_unit_p() {
        let mut ds = Dataset::new();
        let group: Vec<&str> = (0..12).map(|i| if i < 6 { "lo" } else { "hi" }).collect();
        ds.add_variable(categorical("grp_CAT", &group)).unwrap();
        ds.add_variable(numeric("p1", &(0..12).map(|i| i as f64).collect::<Vec<_>>()))
            .unwrap();
        ds.add_variable(numeric("flat", &[3.0; 12])).unwrap();

        let results = associate(&ds, &[], &AnalysisConfig::default());
        // flat vs p1 has no correlation and is skipped
        assert_eq!(results.len(), 2);

        let flat = results.iter().find(|a| a.phenotype == "flat").unwrap();
        assert_eq!(flat.test, AssociationTest::MannWhitneyU);
        assert_eq!(flat.statistic, 18.0);
        assert_eq!(flat.p_value, 1.0);
        assert_eq!(flat.corrected_p_value, Some(1.0));

        // the tied pair counts towards m = 2
        let p1 = results.iter().find(|a| a.phenotype == "p1").unwrap();
        let q = p1.corrected_p_value.unwrap();
        assert!((q - 2.0 * p1.p_value).abs() < 1e-12, "q = {q}");
    }

    // ── Stage driver ────────────────────────────────────────────

    #[test]
    fn associate_orders_and_corrects() {
        let mut ds = Dataset::new();
        let group: Vec<&str> = (0..12).map(|i| if i < 6 { "lo" } else { "hi" }).collect();
        ds.add_variable(categorical("grp_CAT", &group)).unwrap();
        ds.add_variable(numeric("p1", &(0..12).map(|i| i as f64).collect::<Vec<_>>()))
            .unwrap();
        ds.add_variable(numeric(
            "p2",
            &(0..12).map(|i| ((i * 7) % 12) as f64).collect::<Vec<_>>(),
        ))
        .unwrap();

        let results = associate(&ds, &[], &AnalysisConfig::default());
        let keys: Vec<(&str, &str)> = results
            .iter()
            .map(|a| (a.metadata.as_str(), a.phenotype.as_str()))
            .collect();
        assert_eq!(
            keys,
            vec![("grp_CAT", "p1"), ("p2", "p1"), ("grp_CAT", "p2")]
        );
        // untested columns read as normal
        assert_eq!(results[1].test, AssociationTest::Pearson);
        for a in &results {
            let q = a.corrected_p_value.unwrap();
            assert!(q >= a.p_value - 1e-15);
        }
    }
}
