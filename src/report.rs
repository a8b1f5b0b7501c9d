//! CSV records persisted between stages.
//!
//! Each stage writes one CSV file whose header matches the row struct's
//! serde names. Missing values are written as empty fields; on reading,
//! empty fields, `NA` and `NaN` are all treated as missing.
//!
//! ```
//! use u_assoc::report::{read_associations, write_associations};
//! use u_assoc::selection::{Association, AssociationTest};
//!
//! let results = vec![Association {
//!     metadata: "medium_CAT".into(),
//!     phenotype: "growth".into(),
//!     test: AssociationTest::KruskalWallis,
//!     statistic: 9.5,
//!     p_value: 0.0087,
//!     corrected_p_value: Some(0.02),
//! }];
//! let mut buf = Vec::new();
//! write_associations(&mut buf, &results).unwrap();
//! let text = String::from_utf8(buf.clone()).unwrap();
//! assert!(text.starts_with("Metadata,Phenotype,Test,Statistic,p-value,corrected p-value\n"));
//! assert_eq!(read_associations(buf.as_slice()).unwrap(), results);
//! ```

use crate::error::AssocError;
use crate::interpretation::Interpretation;
use crate::matrix::CorrelationMatrix;
use crate::normality::{NormalityOutcome, NormalityRecord};
use crate::posthoc::{PostHocComparison, PostHocTest};
use crate::selection::{Association, AssociationTest};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::io::{Read, Write};

// ── Field codecs ────────────────────────────────────────────────────

fn parse_missing(raw: &str) -> Option<f64> {
    let s = raw.trim();
    if s.is_empty() || s == "NA" {
        return None;
    }
    s.parse::<f64>().ok().filter(|v| !v.is_nan())
}

/// `f64` written empty when NaN.
mod float_field {
    use super::*;

    pub fn serialize<S: Serializer>(v: &f64, s: S) -> Result<S::Ok, S::Error> {
        if v.is_nan() {
            s.serialize_str("")
        } else {
            s.serialize_f64(*v)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        let raw = String::deserialize(d)?;
        if raw.trim().is_empty() || raw.trim() == "NA" {
            return Ok(f64::NAN);
        }
        raw.trim()
            .parse::<f64>()
            .map_err(|_| serde::de::Error::custom(format!("invalid number '{raw}'")))
    }
}

/// `Option<f64>` written empty when absent.
mod optional_float {
    use super::*;

    pub fn serialize<S: Serializer>(v: &Option<f64>, s: S) -> Result<S::Ok, S::Error> {
        match v {
            Some(x) if !x.is_nan() => s.serialize_f64(*x),
            _ => s.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        Ok(parse_missing(&String::deserialize(d)?))
    }
}

/// `Option<u64>`; accepts integral floats such as `12.0` on input.
mod optional_count {
    use super::*;

    pub fn serialize<S: Serializer>(v: &Option<u64>, s: S) -> Result<S::Ok, S::Error> {
        match v {
            Some(x) => s.serialize_u64(*x),
            None => s.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
        let raw = String::deserialize(d)?;
        match parse_missing(&raw) {
            None => Ok(None),
            Some(v) if v >= 0.0 && v.fract() == 0.0 => Ok(Some(v as u64)),
            Some(_) => Err(serde::de::Error::custom(format!("invalid count '{raw}'"))),
        }
    }
}

// ── Rows ────────────────────────────────────────────────────────────

/// One line of `normality_results.csv`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalityRow {
    #[serde(rename = "Column")]
    pub column: String,
    #[serde(rename = "Test")]
    pub test: String,
    #[serde(rename = "Statistic")]
    pub statistic: String,
    #[serde(rename = "p-value")]
    pub p_value: String,
}

impl NormalityRow {
    pub const HEADER: [&'static str; 4] = ["Column", "Test", "Statistic", "p-value"];
}

impl From<&NormalityRecord> for NormalityRow {
    fn from(r: &NormalityRecord) -> Self {
        match r.outcome {
            NormalityOutcome::Tested {
                test,
                statistic,
                p_value,
            } => Self {
                column: r.column.clone(),
                test: test.to_string(),
                statistic: statistic.to_string(),
                p_value: p_value.to_string(),
            },
            NormalityOutcome::Failed => Self {
                column: r.column.clone(),
                test: "Error".into(),
                statistic: "Error".into(),
                p_value: "Error".into(),
            },
        }
    }
}

/// One line of `correlation_results_with_fdr.csv`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssociationRow {
    #[serde(rename = "Metadata")]
    pub metadata: String,
    #[serde(rename = "Phenotype")]
    pub phenotype: String,
    #[serde(rename = "Test")]
    pub test: AssociationTest,
    #[serde(rename = "Statistic", with = "float_field")]
    pub statistic: f64,
    #[serde(rename = "p-value", with = "float_field")]
    pub p_value: f64,
    #[serde(rename = "corrected p-value", with = "optional_float")]
    pub corrected_p_value: Option<f64>,
}

impl AssociationRow {
    pub const HEADER: [&'static str; 6] = [
        "Metadata",
        "Phenotype",
        "Test",
        "Statistic",
        "p-value",
        "corrected p-value",
    ];
}

impl From<&Association> for AssociationRow {
    fn from(a: &Association) -> Self {
        Self {
            metadata: a.metadata.clone(),
            phenotype: a.phenotype.clone(),
            test: a.test,
            statistic: a.statistic,
            p_value: a.p_value,
            corrected_p_value: a.corrected_p_value,
        }
    }
}

impl From<AssociationRow> for Association {
    fn from(r: AssociationRow) -> Self {
        Self {
            metadata: r.metadata,
            phenotype: r.phenotype,
            test: r.test,
            statistic: r.statistic,
            p_value: r.p_value,
            corrected_p_value: r.corrected_p_value,
        }
    }
}

/// One line of `posthoc_results.csv`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostHocRow {
    #[serde(rename = "Metadata")]
    pub metadata: String,
    #[serde(rename = "Phenotype")]
    pub phenotype: String,
    #[serde(rename = "Comparison")]
    pub comparison: String,
    #[serde(rename = "Post Hoc Test")]
    pub test: PostHocTest,
    #[serde(rename = "p-value", with = "float_field")]
    pub p_value: f64,
    #[serde(rename = "Group1_Median", with = "optional_float")]
    pub group1_median: Option<f64>,
    #[serde(rename = "Group2_Median", with = "optional_float")]
    pub group2_median: Option<f64>,
    #[serde(rename = "Group1_Count", with = "optional_count")]
    pub group1_count: Option<u64>,
    #[serde(rename = "Group2_Count", with = "optional_count")]
    pub group2_count: Option<u64>,
}

impl PostHocRow {
    pub const HEADER: [&'static str; 9] = [
        "Metadata",
        "Phenotype",
        "Comparison",
        "Post Hoc Test",
        "p-value",
        "Group1_Median",
        "Group2_Median",
        "Group1_Count",
        "Group2_Count",
    ];

    /// Splits the comparison on the first `" vs "`.
    pub fn into_comparison(self, line: usize) -> Result<PostHocComparison, AssocError> {
        let (group1, group2) =
            self.comparison
                .split_once(" vs ")
                .ok_or_else(|| AssocError::InvalidRecord {
                    line,
                    message: format!("comparison '{}' has no ' vs '", self.comparison),
                })?;
        Ok(PostHocComparison {
            group1: group1.to_string(),
            group2: group2.to_string(),
            metadata: self.metadata,
            phenotype: self.phenotype,
            test: self.test,
            p_value: self.p_value,
            group1_median: self.group1_median,
            group2_median: self.group2_median,
            group1_count: self.group1_count,
            group2_count: self.group2_count,
        })
    }
}

impl From<&PostHocComparison> for PostHocRow {
    fn from(c: &PostHocComparison) -> Self {
        Self {
            metadata: c.metadata.clone(),
            phenotype: c.phenotype.clone(),
            comparison: c.comparison(),
            test: c.test,
            p_value: c.p_value,
            group1_median: c.group1_median,
            group2_median: c.group2_median,
            group1_count: c.group1_count,
            group2_count: c.group2_count,
        }
    }
}

/// One line of `posthoc_interpretation.csv`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterpretationRow {
    #[serde(rename = "Metadata")]
    pub metadata: String,
    #[serde(rename = "Phenotype")]
    pub phenotype: String,
    #[serde(rename = "Comparison")]
    pub comparison: String,
    #[serde(rename = "Post Hoc Test")]
    pub test: PostHocTest,
    #[serde(rename = "p-value", with = "float_field")]
    pub p_value: f64,
    #[serde(rename = "Group1_Median", with = "optional_float")]
    pub group1_median: Option<f64>,
    #[serde(rename = "Group2_Median", with = "optional_float")]
    pub group2_median: Option<f64>,
    #[serde(rename = "Group1_Count", with = "optional_count")]
    pub group1_count: Option<u64>,
    #[serde(rename = "Group2_Count", with = "optional_count")]
    pub group2_count: Option<u64>,
    #[serde(rename = "Comparison_Direction")]
    pub direction: String,
    #[serde(rename = "Fold_Change", with = "float_field")]
    pub fold_change: f64,
    #[serde(rename = "Interpretation")]
    pub interpretation: String,
}

impl InterpretationRow {
    pub const HEADER: [&'static str; 12] = [
        "Metadata",
        "Phenotype",
        "Comparison",
        "Post Hoc Test",
        "p-value",
        "Group1_Median",
        "Group2_Median",
        "Group1_Count",
        "Group2_Count",
        "Comparison_Direction",
        "Fold_Change",
        "Interpretation",
    ];
}

impl From<&Interpretation> for InterpretationRow {
    fn from(i: &Interpretation) -> Self {
        let c = &i.comparison;
        Self {
            metadata: c.metadata.clone(),
            phenotype: c.phenotype.clone(),
            comparison: c.comparison(),
            test: c.test,
            p_value: c.p_value,
            group1_median: c.group1_median,
            group2_median: c.group2_median,
            group1_count: c.group1_count,
            group2_count: c.group2_count,
            direction: i.direction.clone(),
            fold_change: i.fold_change,
            interpretation: i.text.clone(),
        }
    }
}

// ── Writers / readers ───────────────────────────────────────────────

/// Writes the header, then one serialized row per item.
fn write_rows<W: Write, T: Serialize>(
    writer: W,
    header: &[&str],
    rows: impl IntoIterator<Item = T>,
) -> Result<(), AssocError> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    wtr.write_record(header)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Reads rows, pairing each with its 1-based line number.
fn read_rows<R: Read, T: DeserializeOwned>(reader: R) -> Result<Vec<(usize, T)>, AssocError> {
    let mut rdr = csv::ReaderBuilder::new().from_reader(reader);
    let headers = rdr.headers()?.clone();
    let mut out = Vec::new();
    for record in rdr.records() {
        let invalid = |e: csv::Error, line: usize| AssocError::InvalidRecord {
            line: e.position().map_or(line, |p| p.line() as usize),
            message: e.to_string(),
        };
        let record = record.map_err(|e| invalid(e, 0))?;
        let line = record.position().map_or(0, |p| p.line() as usize);
        let row = record
            .deserialize(Some(&headers))
            .map_err(|e| invalid(e, line))?;
        out.push((line, row));
    }
    Ok(out)
}

pub fn write_normality<W: Write>(writer: W, records: &[NormalityRecord]) -> Result<(), AssocError> {
    write_rows(
        writer,
        &NormalityRow::HEADER,
        records.iter().map(NormalityRow::from),
    )
}

pub fn write_associations<W: Write>(writer: W, results: &[Association]) -> Result<(), AssocError> {
    write_rows(
        writer,
        &AssociationRow::HEADER,
        results.iter().map(AssociationRow::from),
    )
}

pub fn read_associations<R: Read>(reader: R) -> Result<Vec<Association>, AssocError> {
    Ok(read_rows::<R, AssociationRow>(reader)?
        .into_iter()
        .map(|(_, row)| row.into())
        .collect())
}

pub fn write_post_hoc<W: Write>(writer: W, comparisons: &[PostHocComparison]) -> Result<(), AssocError> {
    write_rows(
        writer,
        &PostHocRow::HEADER,
        comparisons.iter().map(PostHocRow::from),
    )
}

pub fn read_post_hoc<R: Read>(reader: R) -> Result<Vec<PostHocComparison>, AssocError> {
    read_rows::<R, PostHocRow>(reader)?
        .into_iter()
        .map(|(line, row)| row.into_comparison(line))
        .collect()
}

pub fn write_interpretations<W: Write>(
    writer: W,
    interpretations: &[Interpretation],
) -> Result<(), AssocError> {
    write_rows(
        writer,
        &InterpretationRow::HEADER,
        interpretations.iter().map(InterpretationRow::from),
    )
}

/// Writes a labelled square matrix: an empty corner cell, then names.
pub fn write_matrix<W: Write>(writer: W, matrix: &CorrelationMatrix) -> Result<(), AssocError> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    let mut header = vec![String::new()];
    header.extend(matrix.names.iter().cloned());
    wtr.write_record(&header)?;
    for (i, name) in matrix.names.iter().enumerate() {
        let mut record = vec![name.clone()];
        record.extend(matrix.row(i).iter().map(|v| {
            if v.is_nan() {
                String::new()
            } else {
                v.to_string()
            }
        }));
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normality::NormalityTest;

    fn text(buf: Vec<u8>) -> String {
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn normality_error_rows() {
        let records = vec![
            NormalityRecord {
                column: "od".into(),
                outcome: NormalityOutcome::Tested {
                    test: NormalityTest::ShapiroWilk,
                    statistic: 0.5,
                    p_value: 0.25,
                },
            },
            NormalityRecord {
                column: "tiny".into(),
                outcome: NormalityOutcome::Failed,
            },
        ];
        let mut buf = Vec::new();
        write_normality(&mut buf, &records).unwrap();
        assert_eq!(
            text(buf),
            "Column,Test,Statistic,p-value\nod,Shapiro-Wilk,0.5,0.25\ntiny,Error,Error,Error\n"
        );
    }

    #[test]
    fn empty_results_still_have_header() {
        let mut buf = Vec::new();
        write_associations(&mut buf, &[]).unwrap();
        let s = text(buf);
        assert_eq!(s, "Metadata,Phenotype,Test,Statistic,p-value,corrected p-value\n");
        assert!(read_associations(s.as_bytes()).unwrap().is_empty());
    }

    #[test]
    fn na_and_nan_read_as_missing() {
        let input = "Metadata,Phenotype,Test,Statistic,p-value,corrected p-value\n\
                     a_CAT,b_CAT,Fisher's Exact Test,,1.0,NA\n";
        let rows = read_associations(input.as_bytes()).unwrap();
        assert_eq!(rows[0].test, AssociationTest::FisherExact);
        assert!(rows[0].statistic.is_nan());
        assert_eq!(rows[0].corrected_p_value, None);
    }

    #[test]
    fn unknown_test_is_rejected_with_line() {
        let input = "Metadata,Phenotype,Test,Statistic,p-value,corrected p-value\n\
                     a,b,Pearson,0.5,0.1,0.2\n\
                     a,c,t-test,0.5,0.1,0.2\n";
        match read_associations(input.as_bytes()) {
            Err(AssocError::InvalidRecord { line, .. }) => assert_eq!(line, 3),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn error_line_counts_quoted_newlines() {
        let input = "Metadata,Phenotype,Test,Statistic,p-value,corrected p-value\n\
                     \"site\nname\",b,Pearson,0.5,0.1,0.2\n\
                     a,c,t-test,0.5,0.1,0.2\n";
        match read_associations(input.as_bytes()) {
            Err(AssocError::InvalidRecord { line, .. }) => assert_eq!(line, 4),
            other => panic!("unexpected {other:?}"),
        }

        let input = "Metadata,Phenotype,Comparison,Post Hoc Test,p-value,Group1_Median,Group2_Median,Group1_Count,Group2_Count\n\
                     m,p,\"a vs b\nc\",Dunn's Test,0.01,1,2,,\n\
                     m,p,ab,Dunn's Test,0.01,1,2,,\n";
        assert!(matches!(
            read_post_hoc(input.as_bytes()),
            Err(AssocError::InvalidRecord { line: 4, .. })
        ));
    }

    #[test]
    fn post_hoc_columns_and_split() {
        let c = PostHocComparison {
            metadata: "m_CAT".into(),
            phenotype: "p_CAT".into(),
            group1: "x".into(),
            group2: "y vs z".into(),
            test: PostHocTest::PairwiseChiSquare,
            p_value: 0.01,
            group1_median: None,
            group2_median: None,
            group1_count: Some(12),
            group2_count: Some(30),
        };
        let mut buf = Vec::new();
        write_post_hoc(&mut buf, &[c.clone()]).unwrap();
        let s = text(buf);
        assert_eq!(
            s.lines().nth(1).unwrap(),
            "m_CAT,p_CAT,x vs y vs z,Pairwise Chi-square,0.01,,,12,30"
        );
        // split on the first separator
        let back = read_post_hoc(s.as_bytes()).unwrap();
        assert_eq!(back, vec![c]);
    }

    #[test]
    fn float_counts_are_accepted() {
        let input = "Metadata,Phenotype,Comparison,Post Hoc Test,p-value,Group1_Median,Group2_Median,Group1_Count,Group2_Count\n\
                     m,p,a vs b,Pairwise Chi-square,0.01,,,12.0,30.0\n\
                     m,q,a vs b,Dunn's Test,0.02,1.5,2.5,,\n";
        let rows = read_post_hoc(input.as_bytes()).unwrap();
        assert_eq!(rows[0].group1_count, Some(12));
        assert_eq!(rows[1].group2_median, Some(2.5));
        assert_eq!(rows[1].test, PostHocTest::Dunn);
    }

    #[test]
    fn comparison_without_separator_fails() {
        let input = "Metadata,Phenotype,Comparison,Post Hoc Test,p-value,Group1_Median,Group2_Median,Group1_Count,Group2_Count\n\
                     m,p,ab,Dunn's Test,0.01,1,2,,\n";
        assert!(matches!(
            read_post_hoc(input.as_bytes()),
            Err(AssocError::InvalidRecord { line: 2, .. })
        ));
    }

    #[test]
    fn matrix_layout() {
        let m = CorrelationMatrix {
            names: vec!["a".into(), "b".into()],
            values: vec![1.0, 0.5, 0.5, f64::NAN],
        };
        let mut buf = Vec::new();
        write_matrix(&mut buf, &m).unwrap();
        assert_eq!(text(buf), ",a,b\na,1,0.5\nb,0.5,\n");
    }
}
