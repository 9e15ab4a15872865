use std::fmt;

use crate::compare::{Comparator, Verdict};
use crate::table::{Cell, Table};

const HEAD_ROWS: usize = 10;
const DATE_SAMPLES: usize = 10;
const DIFF_ROWS: usize = 5;

#[derive(Debug, Clone)]
pub struct AmountColumnStats {
    pub column: String,
    pub numeric: usize,
    pub nulls: usize,
}

#[derive(Debug, Clone)]
pub struct ExpectedComparison {
    pub shapes_equal: bool,
    pub columns_equal: bool,
    pub verdict: Verdict,
    /// Rendered `(row, parsed, expected)` for the first differing rows.
    pub differing_rows: Vec<(usize, String, String)>,
}

#[derive(Debug, Clone)]
pub struct InspectReport {
    pub shape: (usize, usize),
    pub columns: Vec<String>,
    pub head: String,
    pub date_samples: Vec<String>,
    pub all_canonical_dates: bool,
    pub amount_stats: Vec<AmountColumnStats>,
    pub comparison: Option<ExpectedComparison>,
}

/// Header-like rows are dropped from `got` first, as the comparator would.
pub fn inspect(got: &Table, expected: Option<&Table>, comparator: &Comparator) -> InspectReport {
    let mut got = got.clone();
    comparator.drop_header_rows(&mut got);

    let date_samples: Vec<String> = got
        .date_column()
        .map(|idx| {
            got.column_values(idx)
                .filter(|c| !c.is_blank())
                .take(DATE_SAMPLES)
                .map(|c| c.to_string())
                .collect()
        })
        .unwrap_or_default();
    let all_canonical_dates = date_samples.iter().all(|s| is_canonical_date(s));

    let normalizer = comparator.normalizer();
    let amount_stats = normalizer
        .amounts()
        .indices(&got)
        .into_iter()
        .map(|idx| {
            let series = normalizer.amount_series(&got, idx);
            let nulls = series.iter().filter(|c| **c == Cell::Null).count();
            AmountColumnStats {
                column: got.columns[idx].clone(),
                numeric: series.len() - nulls,
                nulls,
            }
        })
        .collect();

    let comparison = expected.map(|exp| compare_to_expected(&got, exp, comparator));

    InspectReport {
        shape: got.shape(),
        columns: got.columns.clone(),
        head: got.render_head(HEAD_ROWS),
        date_samples,
        all_canonical_dates,
        amount_stats,
        comparison,
    }
}

fn compare_to_expected(
    got: &Table,
    expected: &Table,
    comparator: &Comparator,
) -> ExpectedComparison {
    let normalizer = comparator.normalizer();
    let got_n = normalizer.normalize_amounts(got);
    let exp_n = normalizer.normalize_amounts(expected);

    let differing_rows = if got_n.columns == exp_n.columns {
        got_n
            .rows
            .iter()
            .zip(&exp_n.rows)
            .enumerate()
            .filter(|(_, (g, e))| g != e)
            .take(DIFF_ROWS)
            .map(|(i, (g, e))| (i, join_row(g), join_row(e)))
            .collect()
    } else {
        Vec::new()
    };

    ExpectedComparison {
        shapes_equal: got.shape() == expected.shape(),
        columns_equal: got.columns == expected.columns,
        verdict: comparator.compare(got, expected),
        differing_rows,
    }
}

fn join_row(row: &[Cell]) -> String {
    row.iter()
        .map(|c| match c {
            Cell::Null => "NaN".to_string(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" | ")
}

/// `DD-MM-YYYY` with ASCII digits.
fn is_canonical_date(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() == 10
        && b[2] == b'-'
        && b[5] == b'-'
        && b.iter()
            .enumerate()
            .all(|(i, c)| i == 2 || i == 5 || c.is_ascii_digit())
}

impl fmt::Display for InspectReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "== out.csv checks ==")?;
        writeln!(f, "Shape: {:?}", self.shape)?;
        writeln!(f, "Columns: {:?}", self.columns)?;
        writeln!(f, "\nHead ({}):\n{}", HEAD_ROWS, self.head)?;
        writeln!(f, "\nDate samples: {:?}", self.date_samples)?;
        writeln!(f, "All DD-MM-YYYY: {}", self.all_canonical_dates)?;
        for stats in &self.amount_stats {
            writeln!(
                f,
                "{} numeric: {} nulls: {}",
                stats.column, stats.numeric, stats.nulls
            )?;
        }

        match &self.comparison {
            None => writeln!(f, "\nExpected CSV not found; skipped exact comparison.")?,
            Some(cmp) => {
                writeln!(f, "\n== compare to expected ==")?;
                writeln!(f, "Shapes equal: {}", cmp.shapes_equal)?;
                writeln!(f, "Columns equal/order: {}", cmp.columns_equal)?;
                writeln!(f, "Exact match: {}", cmp.verdict.is_match())?;
                if let Verdict::Mismatch(d) = &cmp.verdict {
                    writeln!(f, "\n{}", d)?;
                }
                if !cmp.differing_rows.is_empty() {
                    writeln!(f, "\nFirst differing rows (got | expected):")?;
                    for (row, got, exp) in &cmp.differing_rows {
                        writeln!(f, "  [{}] {}\n      {}", row, got, exp)?;
                    }
                }
            }
        }
        Ok(())
    }
}
