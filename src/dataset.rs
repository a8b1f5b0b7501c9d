//! Variable classification and complete-case views over a table.
//!
//! A [`Dataset`] holds one [`Variable`] per analysed column. Each variable
//! is either categorical (dictionary-encoded labels) or numerical
//! (`f64` values); missing cells are `None` in both cases.
//!
//! # Classification
//!
//! | Condition | Kind |
//! |-----------|------|
//! | column is the id column | excluded |
//! | name ends with the categorical suffix (default `CAT`) | Categorical |
//! | every present value is `true`/`false` (any case) | Categorical |
//! | anything else | Numerical (unparsable or infinite → missing) |
//!
//! # Example
//!
//! ```
//! use u_assoc::dataset::{ColumnRules, Dataset, VariableKind};
//!
//! let headers = vec!["strain_id".to_string(), "host_CAT".to_string(), "growth".to_string()];
//! let columns = vec![
//!     vec!["s1".to_string(), "s2".to_string()],
//!     vec!["human".to_string(), "soil".to_string()],
//!     vec!["0.5".to_string(), "oops".to_string()],
//! ];
//! let ds = Dataset::from_raw_columns(headers, columns, &ColumnRules::default()).unwrap();
//!
//! assert_eq!(ds.variable_count(), 2);
//! assert_eq!(ds.variable("host_CAT").unwrap().kind(), VariableKind::Categorical);
//! let growth = ds.variable("growth").unwrap();
//! assert_eq!(growth.kind(), VariableKind::Numerical);
//! assert_eq!(growth.value_at(1), None);
//! ```

use crate::error::AssocError;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// Missing-value markers recognised in raw cells (after trimming).
pub const DEFAULT_MISSING_MARKERS: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND",
    "1.#QNAN", "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

// ── Rules ─────────────────────────────────────────────────────────────

/// Naming conventions that drive column classification.
#[derive(Debug, Clone)]
pub struct ColumnRules {
    /// Columns whose name ends with this suffix are categorical. Default: `CAT`.
    pub categorical_suffix: String,
    /// Identifier column excluded from analysis. Default: `strain_id`.
    pub id_column: Option<String>,
    /// Cell values treated as missing.
    pub missing_markers: Vec<String>,
}

impl Default for ColumnRules {
    fn default() -> Self {
        Self {
            categorical_suffix: "CAT".to_string(),
            id_column: Some("strain_id".to_string()),
            missing_markers: DEFAULT_MISSING_MARKERS
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        }
    }
}

impl ColumnRules {
    fn is_missing(&self, cell: &str) -> bool {
        self.missing_markers.iter().any(|m| m == cell)
    }
}

// ── Variable ──────────────────────────────────────────────────────────

/// Statistical kind of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    Categorical,
    Numerical,
}

impl std::fmt::Display for VariableKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Categorical => write!(f, "categorical"),
            Self::Numerical => write!(f, "numerical"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Values {
    Numerical(Vec<Option<f64>>),
    /// `levels` in first-appearance order; `codes` index into it.
    Categorical {
        levels: Vec<String>,
        codes: Vec<Option<u32>>,
    },
}

/// A named, classified column.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    name: String,
    values: Values,
}

impl Variable {
    /// Creates a numerical variable. Non-finite values are stored as missing.
    pub fn numerical(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        let values = values
            .into_iter()
            .map(|v| v.filter(|x| x.is_finite()))
            .collect();
        Self {
            name: name.into(),
            values: Values::Numerical(values),
        }
    }

    /// Creates a categorical variable by dictionary-encoding `labels`.
    pub fn categorical<S: AsRef<str>>(name: impl Into<String>, labels: &[Option<S>]) -> Self {
        let mut lookup: HashMap<String, u32> = HashMap::new();
        let mut levels: Vec<String> = Vec::new();
        let mut codes = Vec::with_capacity(labels.len());

        for label in labels {
            match label {
                None => codes.push(None),
                Some(label) => {
                    let label = label.as_ref();
                    let code = match lookup.get(label) {
                        Some(&existing) => existing,
                        None => {
                            let code = levels.len() as u32;
                            levels.push(label.to_string());
                            lookup.insert(label.to_string(), code);
                            code
                        }
                    };
                    codes.push(Some(code));
                }
            }
        }

        Self {
            name: name.into(),
            values: Values::Categorical { levels, codes },
        }
    }

    /// Column name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Categorical or numerical.
    pub fn kind(&self) -> VariableKind {
        match self.values {
            Values::Numerical(_) => VariableKind::Numerical,
            Values::Categorical { .. } => VariableKind::Categorical,
        }
    }

    /// Number of rows (present and missing).
    pub fn len(&self) -> usize {
        match &self.values {
            Values::Numerical(v) => v.len(),
            Values::Categorical { codes, .. } => codes.len(),
        }
    }

    /// Returns `true` if the variable has no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if row `idx` holds a value.
    pub fn is_present(&self, idx: usize) -> bool {
        match &self.values {
            Values::Numerical(v) => v.get(idx).is_some_and(|x| x.is_some()),
            Values::Categorical { codes, .. } => codes.get(idx).is_some_and(|c| c.is_some()),
        }
    }

    /// Numerical value at row `idx`, `None` if missing or categorical.
    pub fn value_at(&self, idx: usize) -> Option<f64> {
        match &self.values {
            Values::Numerical(v) => v.get(idx).copied().flatten(),
            Values::Categorical { .. } => None,
        }
    }

    /// Category label at row `idx`, `None` if missing or numerical.
    pub fn label_at(&self, idx: usize) -> Option<&str> {
        match &self.values {
            Values::Categorical { levels, codes } => codes
                .get(idx)
                .copied()
                .flatten()
                .and_then(|c| levels.get(c as usize))
                .map(|s| s.as_str()),
            Values::Numerical(_) => None,
        }
    }

    /// Present numerical values in row order (empty for categorical variables).
    pub fn present_values(&self) -> Vec<f64> {
        match &self.values {
            Values::Numerical(v) => v.iter().flatten().copied().collect(),
            Values::Categorical { .. } => Vec::new(),
        }
    }

    /// Number of distinct present values.
    pub fn distinct_count(&self) -> usize {
        match &self.values {
            Values::Numerical(v) => {
                let bits: HashSet<u64> = v
                    .iter()
                    .flatten()
                    // -0.0 and 0.0 are the same value
                    .map(|x| if *x == 0.0 { 0u64 } else { x.to_bits() })
                    .collect();
                bits.len()
            }
            Values::Categorical { codes, .. } => {
                codes.iter().flatten().collect::<HashSet<_>>().len()
            }
        }
    }
}

// ── Complete-case views ──────────────────────────────────────────────

/// Values of a numerical variable for one level of a categorical variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub label: String,
    pub values: Vec<f64>,
}

/// Contingency table of two categorical variables.
///
/// Row and column labels are ordered with [`compare_labels`]; only levels
/// observed in complete rows appear.
#[derive(Debug, Clone, PartialEq)]
pub struct Crosstab {
    pub row_labels: Vec<String>,
    pub col_labels: Vec<String>,
    /// Row-major counts (`row_labels.len() × col_labels.len()`).
    pub counts: Vec<u64>,
}

impl Crosstab {
    pub fn n_rows(&self) -> usize {
        self.row_labels.len()
    }

    pub fn n_cols(&self) -> usize {
        self.col_labels.len()
    }

    /// Count in cell (`r`, `c`).
    pub fn get(&self, r: usize, c: usize) -> u64 {
        self.counts[r * self.n_cols() + c]
    }

    pub fn row_total(&self, r: usize) -> u64 {
        (0..self.n_cols()).map(|c| self.get(r, c)).sum()
    }

    pub fn col_total(&self, c: usize) -> u64 {
        (0..self.n_rows()).map(|r| self.get(r, c)).sum()
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Counts as `f64`, row-major.
    pub fn as_f64(&self) -> Vec<f64> {
        self.counts.iter().map(|&c| c as f64).collect()
    }

    /// Reorders rows by plain string comparison of their labels.
    pub fn with_text_row_order(self) -> Self {
        let n_cols = self.n_cols();
        let mut order: Vec<usize> = (0..self.n_rows()).collect();
        order.sort_by(|&a, &b| self.row_labels[a].cmp(&self.row_labels[b]));

        let counts = order
            .iter()
            .flat_map(|&r| self.counts[r * n_cols..(r + 1) * n_cols].iter().copied())
            .collect();
        let row_labels = order.iter().map(|&r| self.row_labels[r].clone()).collect();
        Self {
            row_labels,
            col_labels: self.col_labels,
            counts,
        }
    }
}

/// Orders category labels: numerically when both parse as numbers,
/// lexicographically otherwise.
pub fn compare_labels(a: &str, b: &str) -> Ordering {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) if x.is_finite() && y.is_finite() => {
            x.partial_cmp(&y).unwrap_or(Ordering::Equal).then_with(|| a.cmp(b))
        }
        _ => a.cmp(b),
    }
}

// ── Dataset ───────────────────────────────────────────────────────────

/// Classified variables of one input table, in file order.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    variables: Vec<Variable>,
    row_count: usize,
}

impl Dataset {
    /// Creates an empty dataset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a variable. All variables must have the same row count.
    pub fn add_variable(&mut self, variable: Variable) -> Result<(), AssocError> {
        let len = variable.len();
        if self.variables.is_empty() {
            self.row_count = len;
        } else if len != self.row_count {
            return Err(AssocError::DimensionMismatch {
                expected: self.row_count,
                actual: len,
            });
        }
        self.variables.push(variable);
        Ok(())
    }

    /// Classifies raw string columns into variables.
    ///
    /// `columns[i]` holds the cells of `headers[i]` in row order.
    pub fn from_raw_columns(
        headers: Vec<String>,
        columns: Vec<Vec<String>>,
        rules: &ColumnRules,
    ) -> Result<Self, AssocError> {
        if headers.len() != columns.len() {
            return Err(AssocError::DimensionMismatch {
                expected: headers.len(),
                actual: columns.len(),
            });
        }

        let mut ds = Dataset::new();
        for (name, raw) in headers.into_iter().zip(columns) {
            if rules.id_column.as_deref() == Some(name.as_str()) {
                continue;
            }
            let variable = classify_column(name, &raw, rules);
            ds.add_variable(variable)?;
        }
        Ok(ds)
    }

    /// Number of rows.
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// Number of analysed variables.
    pub fn variable_count(&self) -> usize {
        self.variables.len()
    }

    /// All variables in file order.
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// Looks up a variable by name.
    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name == name)
    }

    /// Looks up a variable, failing if it is absent.
    pub fn require(&self, name: &str) -> Result<&Variable, AssocError> {
        self.variable(name).ok_or_else(|| AssocError::ColumnNotFound {
            name: name.to_string(),
        })
    }

    fn require_kind(&self, name: &str, kind: VariableKind) -> Result<&Variable, AssocError> {
        let v = self.require(name)?;
        if v.kind() != kind {
            return Err(AssocError::WrongKind {
                column: name.to_string(),
                expected: match kind {
                    VariableKind::Categorical => "categorical",
                    VariableKind::Numerical => "numerical",
                },
            });
        }
        Ok(v)
    }

    /// Variables of one kind, in file order.
    pub fn variables_of(&self, kind: VariableKind) -> impl Iterator<Item = &Variable> {
        self.variables.iter().filter(move |v| v.kind() == kind)
    }

    /// Number of rows where both variables hold a value.
    pub fn complete_count(&self, a: &str, b: &str) -> Result<usize, AssocError> {
        Ok(self.complete_rows(a, b)?.len())
    }

    fn complete_rows(&self, a: &str, b: &str) -> Result<Vec<usize>, AssocError> {
        let va = self.require(a)?;
        let vb = self.require(b)?;
        Ok((0..self.row_count)
            .filter(|&i| va.is_present(i) && vb.is_present(i))
            .collect())
    }

    /// Paired values of two numerical variables over complete rows.
    pub fn paired_values(&self, a: &str, b: &str) -> Result<(Vec<f64>, Vec<f64>), AssocError> {
        let va = self.require_kind(a, VariableKind::Numerical)?;
        let vb = self.require_kind(b, VariableKind::Numerical)?;
        let mut xs = Vec::new();
        let mut ys = Vec::new();
        for i in 0..self.row_count {
            if let (Some(x), Some(y)) = (va.value_at(i), vb.value_at(i)) {
                xs.push(x);
                ys.push(y);
            }
        }
        Ok((xs, ys))
    }

    /// Splits `numeric` by the levels of `categorical` over complete rows.
    ///
    /// Groups appear in the order their label is first seen.
    pub fn groups(&self, categorical: &str, numeric: &str) -> Result<Vec<Group>, AssocError> {
        let cat = self.require_kind(categorical, VariableKind::Categorical)?;
        let num = self.require_kind(numeric, VariableKind::Numerical)?;

        let mut position: HashMap<&str, usize> = HashMap::new();
        let mut groups: Vec<Group> = Vec::new();
        for i in 0..self.row_count {
            let (Some(label), Some(value)) = (cat.label_at(i), num.value_at(i)) else {
                continue;
            };
            let slot = *position.entry(label).or_insert_with(|| {
                groups.push(Group {
                    label: label.to_string(),
                    values: Vec::new(),
                });
                groups.len() - 1
            });
            groups[slot].values.push(value);
        }
        Ok(groups)
    }

    /// Cross-tabulates two categorical variables over complete rows.
    pub fn crosstab(&self, rows: &str, cols: &str) -> Result<Crosstab, AssocError> {
        let vr = self.require_kind(rows, VariableKind::Categorical)?;
        let vc = self.require_kind(cols, VariableKind::Categorical)?;

        let pairs: Vec<(&str, &str)> = (0..self.row_count)
            .filter_map(|i| Some((vr.label_at(i)?, vc.label_at(i)?)))
            .collect();

        let mut row_labels: Vec<String> = pairs
            .iter()
            .map(|(r, _)| (*r).to_string())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let mut col_labels: Vec<String> = pairs
            .iter()
            .map(|(_, c)| (*c).to_string())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        row_labels.sort_by(|a, b| compare_labels(a, b));
        col_labels.sort_by(|a, b| compare_labels(a, b));

        let row_index: HashMap<&str, usize> = row_labels
            .iter()
            .enumerate()
            .map(|(i, l)| (l.as_str(), i))
            .collect();
        let col_index: HashMap<&str, usize> = col_labels
            .iter()
            .enumerate()
            .map(|(i, l)| (l.as_str(), i))
            .collect();

        let n_cols = col_labels.len();
        let mut counts = vec![0u64; row_labels.len() * n_cols];
        for (r, c) in pairs {
            counts[row_index[r] * n_cols + col_index[c]] += 1;
        }

        Ok(Crosstab {
            row_labels,
            col_labels,
            counts,
        })
    }
}

// ── Classification ───────────────────────────────────────────────────

fn classify_column(name: String, raw: &[String], rules: &ColumnRules) -> Variable {
    let cells: Vec<Option<&str>> = raw
        .iter()
        .map(|s| {
            let t = s.trim();
            if rules.is_missing(t) {
                None
            } else {
                Some(t)
            }
        })
        .collect();

    let present = cells.iter().flatten().count();
    let all_boolean = present > 0 && cells.iter().flatten().all(|s| parse_boolean(s).is_some());

    if all_boolean {
        let labels: Vec<Option<&str>> = cells
            .iter()
            .map(|c| c.and_then(parse_boolean).map(|b| if b { "True" } else { "False" }))
            .collect();
        return Variable::categorical(name, &labels);
    }

    if name.ends_with(&rules.categorical_suffix) {
        return Variable::categorical(name, &cells);
    }

    let values = cells
        .iter()
        .map(|c| c.and_then(|s| s.parse::<f64>().ok()))
        .collect();
    Variable::numerical(name, values)
}

/// Parses a boolean literal (`true`/`false`, any case).
fn parse_boolean(s: &str) -> Option<bool> {
    if s.eq_ignore_ascii_case("true") {
        Some(true)
    } else if s.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────
