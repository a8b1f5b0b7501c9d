//! # u-assoc
//!
//! Exploratory association analysis for tables that mix categorical and
//! numerical variables.
//!
//! u-assoc picks one hypothesis test per variable pair, controls the false
//! discovery rate across all of them, follows significant associations up
//! with pairwise post-hoc tests, and phrases the significant comparisons as
//! directional statements. It runs in three stages:
//!
//! - **Correlation**: normality screen, test selection, BH correction
//! - **Post-hoc**: pairwise chi-square, pairwise Mann-Whitney U, Dunn's test
//! - **Interpretation**: direction, fold change and a sentence per comparison
//!
//! ## Modules
//!
//! - [`csv_parser`]: CSV loading (RFC 4180, BOM, ISO-8859-1 fallback)
//! - [`dataset`]: Categorical/numerical classification, complete-case views, crosstabs
//! - [`normality`]: Shapiro-Wilk / Lilliefors screen
//! - [`selection`]: Decision table and association tests for every variable pair
//! - [`correction`]: Benjamini-Hochberg and Bonferroni
//! - [`posthoc`]: Post-hoc dispatch for significant associations
//! - [`interpretation`]: Directional statements and fold changes
//! - [`testing`]: Rank, correlation, contingency and normality tests
//! - [`matrix`]: Pairwise-complete Spearman matrix
//! - [`report`]: Persisted CSV records
//! - [`pipeline`]: Stage drivers over an output directory
//! - [`config`]: Analysis thresholds
//! - [`error`]: Error types
//!
//! ## Quick Start
//!
//! ```
//! use u_assoc::config::AnalysisConfig;
//! use u_assoc::csv_parser::CsvParser;
//! use u_assoc::normality::normality_screen;
//! use u_assoc::selection::{associate, AssociationTest};
//!
//! let mut csv = String::from("strain_id,medium_CAT,growth\n");
//! for i in 0..8 {
//!     csv += &format!("a{i},LB,{}\n", 1.0 + i as f64 * 0.1);
//!     csv += &format!("b{i},M9,{}\n", 3.0 + i as f64 * 0.1);
//! }
//! let ds = CsvParser::new().parse_str(&csv).unwrap();
//!
//! let config = AnalysisConfig::default();
//! let screen = normality_screen(&ds, &config);
//! let results = associate(&ds, &screen, &config);
//!
//! assert_eq!(results.len(), 1);
//! assert_eq!(results[0].test, AssociationTest::MannWhitneyU);
//! assert!(results[0].corrected_p_value.unwrap() < 0.05);
//! ```

pub mod config;
pub mod correction;
pub mod csv_parser;
pub mod dataset;
pub mod error;
pub mod interpretation;
pub mod matrix;
pub mod normality;
pub mod pipeline;
pub mod posthoc;
pub mod report;
pub mod selection;
pub mod testing;
