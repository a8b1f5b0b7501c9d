//! Spearman correlation matrix over numerical variables.
//!
//! Each entry uses the rows where both variables are present. Entries
//! that cannot be computed (fewer than three complete rows, a constant
//! variable) are NaN.
//!
//! ```
//! use u_assoc::dataset::{Dataset, Variable};
//! use u_assoc::matrix::spearman_matrix;
//!
//! let mut ds = Dataset::new();
//! ds.add_variable(Variable::numerical("a", vec![Some(1.0), Some(2.0), Some(3.0), Some(4.0)]))
//!     .unwrap();
//! ds.add_variable(Variable::numerical("b", vec![Some(8.0), Some(6.0), None, Some(1.0)]))
//!     .unwrap();
//!
//! let m = spearman_matrix(&ds).unwrap();
//! assert_eq!(m.names, vec!["a", "b"]);
//! assert!((m.get(0, 1) + 1.0).abs() < 1e-12);
//! ```

use crate::dataset::{Dataset, VariableKind};
use crate::error::AssocError;
use crate::testing::spearman;

/// Symmetric correlation matrix with named rows and columns.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationMatrix {
    pub names: Vec<String>,
    /// Row-major `n × n` coefficients.
    pub values: Vec<f64>,
}

impl CorrelationMatrix {
    pub fn size(&self) -> usize {
        self.names.len()
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.values[i * self.size() + j]
    }

    /// Row `i` as a slice.
    pub fn row(&self, i: usize) -> &[f64] {
        let n = self.size();
        &self.values[i * n..(i + 1) * n]
    }
}

/// Pairwise-complete Spearman matrix of all numerical variables.
///
/// Requires at least two numerical variables.
pub fn spearman_matrix(dataset: &Dataset) -> Result<CorrelationMatrix, AssocError> {
    let vars: Vec<_> = dataset.variables_of(VariableKind::Numerical).collect();
    let n = vars.len();
    if n < 2 {
        return Err(AssocError::InsufficientData {
            min_required: 2,
            actual: n,
        });
    }

    let mut values = vec![f64::NAN; n * n];
    for i in 0..n {
        if vars[i].distinct_count() > 1 {
            values[i * n + i] = 1.0;
        }
        for j in (i + 1)..n {
            let (x, y) = dataset.paired_values(vars[i].name(), vars[j].name())?;
            let rho = spearman(&x, &y).map_or(f64::NAN, |r| r.statistic);
            values[i * n + j] = rho;
            values[j * n + i] = rho;
        }
    }

    Ok(CorrelationMatrix {
        names: vars.iter().map(|v| v.name().to_string()).collect(),
        values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Variable;

    #[test]
    fn symmetric_with_unit_diagonal() {
        let mut ds = Dataset::new();
        ds.add_variable(Variable::numerical(
            "x",
            vec![Some(1.0), Some(2.0), Some(3.0), Some(4.0), Some(5.0)],
        ))
        .unwrap();
        ds.add_variable(Variable::numerical(
            "y",
            vec![Some(2.0), Some(1.0), Some(4.0), Some(3.0), Some(5.0)],
        ))
        .unwrap();
        ds.add_variable(Variable::categorical("g_CAT", &[Some("a"); 5])).unwrap();

        let m = spearman_matrix(&ds).unwrap();
        assert_eq!(m.size(), 2);
        assert_eq!(m.get(0, 0), 1.0);
        assert_eq!(m.get(0, 1), m.get(1, 0));
        // d² = 1 + 1 + 1 + 1 + 0 → 1 − 6·4 / (5·24)
        assert!((m.get(0, 1) - 0.8).abs() < 1e-12);
        assert_eq!(m.row(1).len(), 2);
    }

    #[test]
    fn constant_column_is_nan() {
        let mut ds = Dataset::new();
        ds.add_variable(Variable::numerical("x", vec![Some(1.0), Some(2.0), Some(3.0)]))
            .unwrap();
        ds.add_variable(Variable::numerical("k", vec![Some(7.0); 3])).unwrap();
        let m = spearman_matrix(&ds).unwrap();
        assert!(m.get(1, 1).is_nan());
        assert!(m.get(0, 1).is_nan());
    }

    #[test]
    fn needs_two_numerical_columns() {
        let mut ds = Dataset::new();
        ds.add_variable(Variable::numerical("x", vec![Some(1.0)])).unwrap();
        assert!(spearman_matrix(&ds).is_err());
    }
}
