//! Human-readable interpretation of significant post-hoc comparisons.
//!
//! ```
//! use u_assoc::interpretation::interpret;
//! use u_assoc::posthoc::{PostHocComparison, PostHocTest};
//!
//! let c = PostHocComparison {
//!     metadata: "medium_CAT".into(),
//!     phenotype: "growth".into(),
//!     group1: "LB".into(),
//!     group2: "M9".into(),
//!     test: PostHocTest::Dunn,
//!     p_value: 0.00123,
//!     group1_median: Some(0.5),
//!     group2_median: Some(2.0),
//!     group1_count: None,
//!     group2_count: None,
//! };
//! let i = interpret(&c);
//! assert_eq!(i.direction, "M9 > LB");
//! assert_eq!(i.fold_change, 4.0);
//! assert_eq!(
//!     i.text,
//!     "'growth': 'M9' shows significantly higher values than 'LB' in 'medium' \
//!      (median: 2.000 vs 0.500; p=1.23e-03)."
//! );
//! ```

use crate::config::AnalysisConfig;
use crate::posthoc::PostHocComparison;
use tracing::info;

/// A post-hoc comparison with its direction, fold change and sentence.
#[derive(Debug, Clone, PartialEq)]
pub struct Interpretation {
    pub comparison: PostHocComparison,
    /// `"hi > lo"`, `"g1 = g2"`, `"M:g1 ↔ P:g2"` or `"N/A"`.
    pub direction: String,
    pub fold_change: f64,
    pub text: String,
}

/// Metadata name with every `_CAT` removed.
pub fn display_name(metadata: &str) -> String {
    metadata.replace("_CAT", "")
}

/// Formats `p` with two decimals in scientific notation and a signed,
/// at least two-digit exponent (`1.23e-05`).
///
/// ```
/// use u_assoc::interpretation::format_p;
///
/// assert_eq!(format_p(0.0000123), "1.23e-05");
/// assert_eq!(format_p(0.5), "5.00e-01");
/// assert_eq!(format_p(0.0), "0.00e+00");
/// assert_eq!(format_p(1.5e-120), "1.50e-120");
/// ```
pub fn format_p(p: f64) -> String {
    if !p.is_finite() {
        return if p.is_nan() {
            "nan".to_string()
        } else if p > 0.0 {
            "inf".to_string()
        } else {
            "-inf".to_string()
        };
    }
    let s = format!("{p:.2e}");
    match s.split_once('e') {
        Some((mantissa, exp)) => {
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(d) => ('-', d),
                None => ('+', exp),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => s,
    }
}

fn ratio(num: f64, den: f64) -> f64 {
    if den != 0.0 {
        num / den
    } else {
        f64::INFINITY
    }
}

/// Interprets one comparison.
///
/// Medians take precedence over counts; a comparison with neither is
/// reported as insufficient data.
pub fn interpret(c: &PostHocComparison) -> Interpretation {
    let metadata = display_name(&c.metadata);
    let phenotype = &c.phenotype;
    let (g1, g2) = (&c.group1, &c.group2);
    let p = format_p(c.p_value);

    let (direction, fold_change, text) = if let Some(m1) = c.group1_median {
        let m2 = c.group2_median.unwrap_or(f64::NAN);
        if m1 > m2 || m2 > m1 {
            let (hi, lo, mhi, mlo) = if m1 > m2 {
                (g1, g2, m1, m2)
            } else {
                (g2, g1, m2, m1)
            };
            (
                format!("{hi} > {lo}"),
                ratio(mhi.abs(), mlo.abs()),
                format!(
                    "'{phenotype}': '{hi}' shows significantly higher values than '{lo}' \
                     in '{metadata}' (median: {mhi:.3} vs {mlo:.3}; p={p})."
                ),
            )
        } else {
            (
                format!("{g1} = {g2}"),
                1.0,
                format!(
                    "'{phenotype}': '{g1}' and '{g2}' in '{metadata}' have identical \
                     medians ({m1:.3}), but differ significantly (p={p})."
                ),
            )
        }
    } else if let Some(c1) = c.group1_count {
        let c2 = c.group2_count.unwrap_or(0);
        let c2_text = c
            .group2_count
            .map(|v| v.to_string())
            .unwrap_or_else(|| "nan".to_string());
        (
            format!("{metadata}:{g1} ↔ {phenotype}:{g2}"),
            ratio(c1 as f64, c2 as f64),
            format!(
                "There is a significant association between '{metadata}' ('{g1}') \
                 and '{phenotype}' ('{g2}') (counts: {c1} vs {c2_text}; p={p})."
            ),
        )
    } else {
        ("N/A".to_string(), f64::NAN, "Insufficient data".to_string())
    };

    Interpretation {
        comparison: c.clone(),
        direction,
        fold_change,
        text,
    }
}

/// Interprets every comparison with a p-value below
/// [`AnalysisConfig::posthoc_alpha`], keeping input order.
pub fn interpret_all(comparisons: &[PostHocComparison], config: &AnalysisConfig) -> Vec<Interpretation> {
    let out: Vec<Interpretation> = comparisons
        .iter()
        .filter(|c| c.p_value < config.posthoc_alpha)
        .map(interpret)
        .collect();
    info!(
        comparisons = comparisons.len(),
        interpreted = out.len(),
        "interpretation complete"
    );
    out
}
