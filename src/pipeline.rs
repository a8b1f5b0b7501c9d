//! Three-stage pipeline over an output directory.
//!
//! | Stage | Reads | Writes |
//! |-------|-------|--------|
//! | correlation | dataset | `norm_res/normality_results.csv`, `corr_res/correlation_results_with_fdr.csv`, `corr_res/numerical_spearman_matrix.csv` |
//! | post-hoc | dataset, correlation results | `posthoc_res/posthoc_results.csv` |
//! | interpretation | post-hoc results | `posthoc_res/posthoc_interpretation.csv` |
//!
//! Each stage reads the previous stage's file, so stages can be re-run
//! independently.

use crate::config::AnalysisConfig;
use crate::dataset::{Dataset, VariableKind};
use crate::error::AssocError;
use crate::interpretation::interpret_all;
use crate::matrix::spearman_matrix;
use crate::normality::{normality_screen, NormalityOutcome};
use crate::posthoc::post_hoc_all;
use crate::report;
use crate::selection::associate;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

// ── Output layout ───────────────────────────────────────────────────

/// Locations of the stage outputs under one root directory.
///
/// ```
/// use u_assoc::pipeline::OutputLayout;
///
/// let layout = OutputLayout::new("out");
/// assert!(layout.associations().ends_with("corr_res/correlation_results_with_fdr.csv"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn normality(&self) -> PathBuf {
        self.root.join("norm_res").join("normality_results.csv")
    }

    pub fn associations(&self) -> PathBuf {
        self.root
            .join("corr_res")
            .join("correlation_results_with_fdr.csv")
    }

    pub fn spearman_matrix(&self) -> PathBuf {
        self.root
            .join("corr_res")
            .join("numerical_spearman_matrix.csv")
    }

    pub fn post_hoc(&self) -> PathBuf {
        self.root.join("posthoc_res").join("posthoc_results.csv")
    }

    pub fn interpretation(&self) -> PathBuf {
        self.root
            .join("posthoc_res")
            .join("posthoc_interpretation.csv")
    }
}

/// Opens `path` for writing, creating its parent directories.
fn create(path: &Path) -> Result<BufWriter<File>, AssocError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(BufWriter::new(File::create(path)?))
}

fn open(path: &Path) -> Result<BufReader<File>, AssocError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| AssocError::Io(format!("{}: {e}", path.display())))
}

// ── Summaries ───────────────────────────────────────────────────────

/// Counts reported by the correlation stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationSummary {
    pub rows: usize,
    pub categorical: usize,
    pub numerical: usize,
    pub normality_tested: usize,
    pub normality_failed: usize,
    pub associations: usize,
    pub significant: usize,
    pub matrix_written: bool,
}

/// Counts reported by the post-hoc stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostHocSummary {
    pub significant_associations: usize,
    pub comparisons: usize,
}

/// Counts reported by the interpretation stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InterpretationSummary {
    pub comparisons: usize,
    pub interpreted: usize,
}

/// Summary of all three stages.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub correlation: CorrelationSummary,
    pub post_hoc: PostHocSummary,
    pub interpretation: InterpretationSummary,
}

// ── Stages ──────────────────────────────────────────────────────────

/// Normality screen, association tests with FDR, and the Spearman matrix.
pub fn run_correlation(
    dataset: &Dataset,
    layout: &OutputLayout,
    config: &AnalysisConfig,
) -> Result<CorrelationSummary, AssocError> {
    info!(
        rows = dataset.row_count(),
        variables = dataset.variable_count(),
        "correlation stage"
    );

    let screen = normality_screen(dataset, config);
    report::write_normality(create(&layout.normality())?, &screen)?;

    let results = associate(dataset, &screen, config);
    report::write_associations(create(&layout.associations())?, &results)?;

    let matrix_written = match spearman_matrix(dataset) {
        Ok(m) => {
            report::write_matrix(create(&layout.spearman_matrix())?, &m)?;
            true
        }
        Err(e) => {
            debug!(error = %e, "spearman matrix not written");
            false
        }
    };

    Ok(CorrelationSummary {
        rows: dataset.row_count(),
        categorical: dataset.variables_of(VariableKind::Categorical).count(),
        numerical: dataset.variables_of(VariableKind::Numerical).count(),
        normality_tested: screen.len(),
        normality_failed: screen
            .iter()
            .filter(|r| r.outcome == NormalityOutcome::Failed)
            .count(),
        associations: results.len(),
        significant: results
            .iter()
            .filter(|a| a.corrected_p_value.is_some_and(|q| q < config.fdr_alpha))
            .count(),
        matrix_written,
    })
}

/// Post-hoc comparisons for the significant associations on disk.
pub fn run_posthoc(
    dataset: &Dataset,
    layout: &OutputLayout,
    config: &AnalysisConfig,
) -> Result<PostHocSummary, AssocError> {
    let associations = report::read_associations(open(&layout.associations())?)?;
    info!(associations = associations.len(), "post-hoc stage");

    let comparisons = post_hoc_all(dataset, &associations, config);
    report::write_post_hoc(create(&layout.post_hoc())?, &comparisons)?;

    Ok(PostHocSummary {
        significant_associations: associations
            .iter()
            .filter(|a| a.corrected_p_value.is_some_and(|q| q < config.fdr_alpha))
            .count(),
        comparisons: comparisons.len(),
    })
}

/// Interpretation of the significant post-hoc comparisons on disk.
pub fn run_interpretation(
    layout: &OutputLayout,
    config: &AnalysisConfig,
) -> Result<InterpretationSummary, AssocError> {
    let comparisons = report::read_post_hoc(open(&layout.post_hoc())?)?;
    info!(comparisons = comparisons.len(), "interpretation stage");

    let interpretations = interpret_all(&comparisons, config);
    report::write_interpretations(create(&layout.interpretation())?, &interpretations)?;

    Ok(InterpretationSummary {
        comparisons: comparisons.len(),
        interpreted: interpretations.len(),
    })
}

/// Runs the three stages in order.
pub fn run_all(
    dataset: &Dataset,
    layout: &OutputLayout,
    config: &AnalysisConfig,
) -> Result<RunSummary, AssocError> {
    let correlation = run_correlation(dataset, layout, config)?;
    let post_hoc = run_posthoc(dataset, layout, config)?;
    let interpretation = run_interpretation(layout, config)?;
    info!(
        associations = correlation.associations,
        comparisons = post_hoc.comparisons,
        interpreted = interpretation.interpreted,
        output = %layout.root().display(),
        "pipeline complete"
    );
    Ok(RunSummary {
        correlation,
        post_hoc,
        interpretation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths() {
        let layout = OutputLayout::new("/tmp/x");
        assert_eq!(
            layout.normality(),
            PathBuf::from("/tmp/x/norm_res/normality_results.csv")
        );
        assert_eq!(
            layout.post_hoc(),
            PathBuf::from("/tmp/x/posthoc_res/posthoc_results.csv")
        );
        assert_eq!(
            layout.interpretation(),
            PathBuf::from("/tmp/x/posthoc_res/posthoc_interpretation.csv")
        );
        assert_eq!(
            layout.spearman_matrix(),
            PathBuf::from("/tmp/x/corr_res/numerical_spearman_matrix.csv")
        );
    }

    #[test]
    fn posthoc_without_correlation_output_fails() {
        let dir = tempfile::tempdir().unwrap();
        let layout = OutputLayout::new(dir.path());
        let err = run_posthoc(&Dataset::new(), &layout, &AnalysisConfig::default());
        assert!(matches!(err, Err(AssocError::Io(_))));
    }
}
