//! Thresholds for the association pipeline.

use serde::{Deserialize, Serialize};

/// Configuration shared by all three stages.
///
/// ```
/// use u_assoc::config::AnalysisConfig;
///
/// let config = AnalysisConfig::default();
/// assert_eq!(config.min_complete_rows, 5);
/// assert_eq!(config.fdr_alpha, 0.05);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Normality p-values above this count as normal. Default: 0.05.
    pub normality_alpha: f64,
    /// Samples smaller than this use Shapiro-Wilk, larger ones Lilliefors. Default: 500.
    pub shapiro_max_n: usize,
    /// A pair needs strictly more complete rows than this. Default: 5.
    pub min_complete_rows: usize,
    /// A group enters a rank test only with strictly more rows than this. Default: 5.
    pub min_group_size: usize,
    /// A 2×2 table with any cell below this uses Fisher's exact test. Default: 5.
    pub fisher_cell_threshold: u64,
    /// Corrected p-values below this trigger post-hoc tests. Default: 0.05.
    pub fdr_alpha: f64,
    /// Post-hoc p-values below this are interpreted. Default: 0.05.
    pub posthoc_alpha: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            normality_alpha: 0.05,
            shapiro_max_n: 500,
            min_complete_rows: 5,
            min_group_size: 5,
            fisher_cell_threshold: 5,
            fdr_alpha: 0.05,
            posthoc_alpha: 0.05,
        }
    }
}
