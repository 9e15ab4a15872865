use log::debug;
use serde::{Deserialize, Serialize};

use crate::diagnostic::{CellDifference, Diagnostic};
use crate::normalize::TableNormalizer;
use crate::table::{Cell, Table};

pub const DEFAULT_HEADER_WORDS: [&str; 5] = ["description", "date", "debit", "credit", "balance"];

/// What to do when the produced table has more rows than expected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LengthPolicy {
    /// Keep only the first `expected.len()` rows. Tolerates trailing junk but can hide
    /// an artifact that over-captures.
    #[default]
    TruncateExtra,
    /// Any row-count difference is a mismatch.
    Exact,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompareOptions {
    pub length_policy: LengthPolicy,
    /// Literal description values that mark a leaked header row.
    pub header_words: Vec<String>,
    /// How many non-null produced dates the year-first check looks at.
    pub date_sample: usize,
    /// Rows rendered into content diagnostics.
    pub head_rows: usize,
    /// Differing cells listed in a numeric diagnostic.
    pub max_cell_samples: usize,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            length_policy: LengthPolicy::default(),
            header_words: DEFAULT_HEADER_WORDS.iter().map(|w| w.to_string()).collect(),
            date_sample: 5,
            head_rows: 5,
            max_cell_samples: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Match,
    Mismatch(Diagnostic),
}

impl Verdict {
    pub fn is_match(&self) -> bool {
        matches!(self, Verdict::Match)
    }

    pub fn into_diagnostic(self) -> Option<Diagnostic> {
        match self {
            Verdict::Match => None,
            Verdict::Mismatch(d) => Some(d),
        }
    }
}

/// Short-circuits on schema and date-rendering problems, then cleans the produced table
/// and checks full equality.
#[derive(Debug, Clone, Default)]
pub struct Comparator {
    normalizer: TableNormalizer,
    options: CompareOptions,
}

impl Comparator {
    pub fn new(normalizer: TableNormalizer, options: CompareOptions) -> Self {
        Self {
            normalizer,
            options,
        }
    }

    pub fn options(&self) -> &CompareOptions {
        &self.options
    }

    pub fn normalizer(&self) -> &TableNormalizer {
        &self.normalizer
    }

    pub fn compare(&self, produced: &Table, expected: &Table) -> Verdict {
        let mut produced = produced.clone();

        let dropped = self.drop_header_rows(&mut produced);
        if dropped > 0 {
            debug!("Dropped {} header-like rows from parsed output", dropped);
        }

        if produced.columns != expected.columns {
            return Verdict::Mismatch(Diagnostic::ColumnSchemaMismatch {
                produced: produced.columns.clone(),
                expected: expected.columns.clone(),
            });
        }

        let mut produced = self.normalizer.normalize_amounts(&produced);
        let expected = self.normalizer.normalize_amounts(expected);

        if let Some(diagnostic) = self.check_date_rendering(&produced) {
            return Verdict::Mismatch(diagnostic);
        }

        let numeric_drift = self.numeric_drift(&produced, &expected);
        if !numeric_drift.is_empty() {
            debug!(
                "Numeric mismatch columns before auto-fix: {}",
                numeric_drift.join(", ")
            );
        }

        let empty = produced.retain_rows(|row| !row.iter().all(Cell::is_blank));
        if empty > 0 {
            debug!("Dropped {} fully empty rows from parsed output", empty);
        }

        let mut produced = self.normalizer.normalize_amounts(&produced);

        if self.options.length_policy == LengthPolicy::TruncateExtra
            && produced.len() > expected.len()
        {
            debug!(
                "Truncating parsed output from {} to {} rows",
                produced.len(),
                expected.len()
            );
            produced.truncate(expected.len());
        }

        if produced == expected {
            return Verdict::Match;
        }

        Verdict::Mismatch(self.classify(&produced, &expected, numeric_drift))
    }

    /// Drops rows with a blank date whose description is a bare header word or a dash rule.
    pub fn drop_header_rows(&self, table: &mut Table) -> usize {
        let (Some(date_idx), Some(desc_idx)) = (table.date_column(), table.description_column())
        else {
            return 0;
        };
        let words = &self.options.header_words;

        table.retain_rows(|row| {
            let date_blank = row.get(date_idx).map_or(true, Cell::is_blank);
            let desc = row
                .get(desc_idx)
                .and_then(Cell::as_text)
                .map(|s| s.trim().to_lowercase())
                .unwrap_or_default();
            let header_like = words.iter().any(|w| *w == desc)
                || (!desc.is_empty() && desc.chars().all(|c| c == '-'));
            !(date_blank && header_like)
        })
    }

    fn check_date_rendering(&self, produced: &Table) -> Option<Diagnostic> {
        let date_idx = produced.date_column()?;
        let samples: Vec<String> = produced
            .column_values(date_idx)
            .filter(|c| !c.is_blank())
            .take(self.options.date_sample)
            .map(|c| c.to_string().trim().to_string())
            .collect();

        if samples.iter().any(|s| starts_with_year(s)) {
            Some(Diagnostic::DateFormatMismatch {
                column: produced.columns[date_idx].clone(),
                samples,
            })
        } else {
            None
        }
    }

    fn numeric_drift(&self, produced: &Table, expected: &Table) -> Vec<String> {
        self.normalizer
            .amounts()
            .indices(expected)
            .into_iter()
            .filter(|&idx| {
                self.normalizer.amount_series(produced, idx)
                    != self.normalizer.amount_series(expected, idx)
            })
            .map(|idx| expected.columns[idx].clone())
            .collect()
    }

    fn classify(
        &self,
        produced: &Table,
        expected: &Table,
        numeric_drift: Vec<String>,
    ) -> Diagnostic {
        let head = self.options.head_rows;

        if produced.len() != expected.len() {
            return Diagnostic::RowCountMismatch {
                produced_rows: produced.len(),
                expected_rows: expected.len(),
                produced_head: produced.render_head(head),
                expected_head: expected.render_head(head),
            };
        }

        let amount_idx = self.normalizer.amounts().indices(expected);
        let differences = differing_cells(produced, expected);

        if !differences.is_empty() && differences.iter().all(|(_, col)| amount_idx.contains(col)) {
            let mut columns: Vec<String> = Vec::new();
            let differing = differences.iter().map(|&(_, col)| &expected.columns[col]);
            for name in differing.chain(numeric_drift.iter()) {
                if !columns.contains(name) {
                    columns.push(name.clone());
                }
            }
            let samples = differences
                .iter()
                .take(self.options.max_cell_samples)
                .map(|&(row, col)| CellDifference {
                    row,
                    column: expected.columns[col].clone(),
                    produced: render_value(&produced.rows[row][col]),
                    expected: render_value(&expected.rows[row][col]),
                })
                .collect();
            return Diagnostic::NumericNormalizationMismatch { columns, samples };
        }

        Diagnostic::GenericContentMismatch {
            produced_shape: produced.shape(),
            expected_shape: expected.shape(),
            produced_head: produced.render_head(head),
            expected_head: expected.render_head(head),
            numeric_drift,
        }
    }
}

/// `(row, column)` of every unequal cell; both tables must have the same shape.
fn differing_cells(produced: &Table, expected: &Table) -> Vec<(usize, usize)> {
    produced
        .rows
        .iter()
        .zip(&expected.rows)
        .enumerate()
        .flat_map(|(r, (p, e))| {
            p.iter()
                .zip(e)
                .enumerate()
                .filter(|(_, (a, b))| a != b)
                .map(move |(c, _)| (r, c))
        })
        .collect()
}

fn render_value(cell: &Cell) -> String {
    match cell {
        Cell::Null => "NaN".to_string(),
        other => other.to_string(),
    }
}

/// True when the leading date component is a four-digit year, e.g. `2024-08-01`.
fn starts_with_year(value: &str) -> bool {
    let first = value
        .split(|c: char| c == '-' || c == '/' || c == '.' || c.is_whitespace())
        .next()
        .unwrap_or("");
    first.len() == 4 && first.chars().all(|c| c.is_ascii_digit())
}
