//! Normality screen for numerical variables.
//!
//! Small samples (fewer than [`AnalysisConfig::shapiro_max_n`] values) use
//! Shapiro-Wilk from `u-analytics`; larger samples use the Lilliefors test.
//! Variables with at most one distinct value are not tested.
//!
//! ```
//! use u_assoc::config::AnalysisConfig;
//! use u_assoc::dataset::{Dataset, Variable};
//! use u_assoc::normality::{normality_screen, NormalityTest};
//!
//! let mut ds = Dataset::new();
//! let values = [2.1, 2.5, 1.9, 2.2, 2.8, 2.4, 2.0, 2.6, 2.3, 2.7];
//! ds.add_variable(Variable::numerical("od600", values.iter().map(|v| Some(*v)).collect()))
//!     .unwrap();
//!
//! let screen = normality_screen(&ds, &AnalysisConfig::default());
//! assert_eq!(screen.len(), 1);
//! assert_eq!(screen[0].test(), Some(NormalityTest::ShapiroWilk));
//! ```

use crate::config::AnalysisConfig;
use crate::dataset::{Dataset, VariableKind};
use crate::testing::lilliefors;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Which normality test was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NormalityTest {
    #[serde(rename = "Shapiro-Wilk")]
    ShapiroWilk,
    #[serde(rename = "Lilliefors")]
    Lilliefors,
}

impl std::fmt::Display for NormalityTest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ShapiroWilk => write!(f, "Shapiro-Wilk"),
            Self::Lilliefors => write!(f, "Lilliefors"),
        }
    }
}

/// Outcome of the normality screen for one variable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NormalityOutcome {
    /// The test ran.
    Tested {
        test: NormalityTest,
        statistic: f64,
        p_value: f64,
    },
    /// The test was attempted but could not be computed.
    Failed,
}

/// Normality outcome of one numerical variable.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalityRecord {
    pub column: String,
    pub outcome: NormalityOutcome,
}

impl NormalityRecord {
    /// The test that was applied, if it succeeded.
    pub fn test(&self) -> Option<NormalityTest> {
        match self.outcome {
            NormalityOutcome::Tested { test, .. } => Some(test),
            NormalityOutcome::Failed => None,
        }
    }
}

/// How a variable's normality reads to the test-selection table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NormalityVerdict {
    /// P-value to compare against the normality significance level.
    /// Untested variables read as `1.0`.
    PValue(f64),
    /// The test failed; pairs involving this variable are not evaluated.
    Unavailable,
}

/// Looks up the verdict for `column`.
pub fn verdict(screen: &[NormalityRecord], column: &str) -> NormalityVerdict {
    match screen.iter().find(|r| r.column == column) {
        None => NormalityVerdict::PValue(1.0),
        Some(NormalityRecord {
            outcome: NormalityOutcome::Tested { p_value, .. },
            ..
        }) => NormalityVerdict::PValue(*p_value),
        Some(_) => NormalityVerdict::Unavailable,
    }
}

/// Tests one sample, choosing the test by sample size.
pub fn test_normality(values: &[f64], config: &AnalysisConfig) -> NormalityOutcome {
    if values.len() < config.shapiro_max_n {
        match u_analytics::testing::shapiro_wilk_test(values) {
            Some(r) => NormalityOutcome::Tested {
                test: NormalityTest::ShapiroWilk,
                statistic: r.w,
                p_value: r.p_value,
            },
            None => NormalityOutcome::Failed,
        }
    } else {
        match lilliefors(values) {
            Some(r) => NormalityOutcome::Tested {
                test: NormalityTest::Lilliefors,
                statistic: r.statistic,
                p_value: r.p_value,
            },
            None => NormalityOutcome::Failed,
        }
    }
}

/// Screens every numerical variable with more than one distinct value.
pub fn normality_screen(dataset: &Dataset, config: &AnalysisConfig) -> Vec<NormalityRecord> {
    dataset
        .variables_of(VariableKind::Numerical)
        .filter(|v| v.distinct_count() > 1)
        .map(|v| {
            let outcome = test_normality(&v.present_values(), config);
            match outcome {
                NormalityOutcome::Tested {
                    test, p_value, ..
                } => debug!(column = v.name(), %test, p_value, "normality tested"),
                NormalityOutcome::Failed => {
                    warn!(column = v.name(), "normality test could not be computed")
                }
            }
            NormalityRecord {
                column: v.name().to_string(),
                outcome,
            }
        })
        .collect()
}
