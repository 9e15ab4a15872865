use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::table::{Cell, Table};

pub const DEFAULT_AMOUNT_KEYWORDS: [&str; 4] = ["amount", "debit", "credit", "balance"];

/// Canonical rendering for every successfully parsed date.
pub const CANONICAL_DATE_FORMAT: &str = "%d-%m-%Y";

/// Accepted source shapes, day-first readings before the year-first one.
const DAY_FIRST_FORMATS: [&str; 4] = ["%d/%m/%Y", "%d-%m-%Y", "%Y-%m-%d", "%d %b %Y"];

/// Only consulted when no day-first reading is a valid calendar date.
const MONTH_FIRST_FALLBACK: [&str; 2] = ["%m/%d/%Y", "%m-%d-%Y"];

/// Decides which columns carry monetary values, by case-insensitive substring match on the name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountColumns {
    keywords: Vec<String>,
}

impl AmountColumns {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| Into::<String>::into(k).to_lowercase())
                .collect(),
        }
    }

    pub fn is_amount_like(&self, column: &str) -> bool {
        let lower = column.to_lowercase();
        self.keywords.iter().any(|k| lower.contains(k.as_str()))
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    /// Indices of the amount-like columns of `table`, in column order.
    pub fn indices(&self, table: &Table) -> Vec<usize> {
        table
            .columns
            .iter()
            .enumerate()
            .filter(|(_, name)| self.is_amount_like(name))
            .map(|(i, _)| i)
            .collect()
    }
}

impl Default for AmountColumns {
    fn default() -> Self {
        Self::new(DEFAULT_AMOUNT_KEYWORDS)
    }
}

/// Strips thousands separators and turns accounting-style `(x)` into `-x`.
///
/// Returns `None` for anything that is not a finite number afterwards.
pub fn normalize_amount(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| *c != ',' && *c != ')')
        .map(|c| if c == '(' { '-' } else { c })
        .collect();

    cleaned
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

/// `None` unless the value carries a four-digit year; chrono's `%Y` alone also takes `24`.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let value = raw.trim();
    if value.is_empty() || !has_four_digit_year(value) {
        return None;
    }
    DAY_FIRST_FORMATS
        .iter()
        .chain(MONTH_FIRST_FALLBACK.iter())
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
        .filter(|d| d.year() >= 1000)
}

fn has_four_digit_year(value: &str) -> bool {
    value
        .split(|c: char| !c.is_ascii_digit())
        .any(|token| token.len() == 4)
}

/// Parses with day-first resolution and renders as `DD-MM-YYYY`.
pub fn normalize_date(raw: &str) -> Option<String> {
    parse_date(raw).map(|d| d.format(CANONICAL_DATE_FORMAT).to_string())
}

fn trim_cell(cell: &Cell) -> Cell {
    match cell {
        Cell::Text(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Cell::Null
            } else {
                Cell::Text(trimmed.to_string())
            }
        }
        other => other.clone(),
    }
}

pub fn normalize_amount_cell(cell: &Cell) -> Cell {
    match cell {
        Cell::Null => Cell::Null,
        Cell::Number(n) if n.is_finite() => Cell::Number(*n),
        Cell::Number(_) => Cell::Null,
        Cell::Text(s) => normalize_amount(s).map_or(Cell::Null, Cell::Number),
    }
}

pub fn normalize_date_cell(cell: &Cell) -> Cell {
    match cell {
        Cell::Text(s) => normalize_date(s).map_or(Cell::Null, Cell::Text),
        _ => Cell::Null,
    }
}

/// Never fails: anything that cannot be coerced becomes [`Cell::Null`].
#[derive(Debug, Clone, Default)]
pub struct TableNormalizer {
    amounts: AmountColumns,
}

impl TableNormalizer {
    pub fn new(amounts: AmountColumns) -> Self {
        Self { amounts }
    }

    pub fn amounts(&self) -> &AmountColumns {
        &self.amounts
    }

    /// Full normalization: trim text, coerce amount-like columns and the date column.
    pub fn normalize(&self, table: &Table) -> Table {
        let date_idx = table.date_column();
        self.apply(table, date_idx)
    }

    /// Trim text and coerce amount-like columns, leaving the date column as text.
    pub fn normalize_amounts(&self, table: &Table) -> Table {
        self.apply(table, None)
    }

    fn apply(&self, table: &Table, date_idx: Option<usize>) -> Table {
        let amount_idx = self.amounts.indices(table);
        let rows = table
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .map(|(i, cell)| {
                        let trimmed = trim_cell(cell);
                        if amount_idx.contains(&i) {
                            normalize_amount_cell(&trimmed)
                        } else if Some(i) == date_idx {
                            normalize_date_cell(&trimmed)
                        } else {
                            trimmed
                        }
                    })
                    .collect()
            })
            .collect();

        Table {
            columns: table.columns.clone(),
            rows,
        }
    }

    /// Normalized values of one amount-like column.
    pub fn amount_series(&self, table: &Table, idx: usize) -> Vec<Cell> {
        table
            .column_values(idx)
            .map(|c| normalize_amount_cell(&trim_cell(c)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accounting_negative_and_separators() {
        assert_eq!(normalize_amount("(1,234.50)"), Some(-1234.50));
        assert_eq!(normalize_amount("1,234.50"), Some(1234.50));
        assert_eq!(normalize_amount("  5000.00 "), Some(5000.0));
        assert_eq!(normalize_amount("N/A"), None);
        assert_eq!(normalize_amount(""), None);
        assert_eq!(normalize_amount("nan"), None);
    }

    #[test]
    fn test_amount_like_columns() {
        let amounts = AmountColumns::default();
        assert!(amounts.is_amount_like("Debit Amt"));
        assert!(amounts.is_amount_like("CREDIT"));
        assert!(amounts.is_amount_like("Closing Balance"));
        assert!(amounts.is_amount_like("Txn Amount"));
        assert!(!amounts.is_amount_like("Description"));

        let custom = AmountColumns::new(["Withdrawal"]);
        assert!(custom.is_amount_like("withdrawals"));
        assert!(!custom.is_amount_like("Debit"));
    }

    #[test]
    fn test_date_shapes_render_day_first() {
        assert_eq!(normalize_date("01/08/2024").as_deref(), Some("01-08-2024"));
        assert_eq!(normalize_date("01-08-2024").as_deref(), Some("01-08-2024"));
        assert_eq!(normalize_date("2024-08-01").as_deref(), Some("01-08-2024"));
        assert_eq!(normalize_date("01 Aug 2024").as_deref(), Some("01-08-2024"));
        assert_eq!(normalize_date("garbage"), None);
    }

    #[test]
    fn test_short_years_are_rejected() {
        assert_eq!(normalize_date("01-08-24"), None);
        assert_eq!(normalize_date("01/08/24"), None);
        assert_eq!(normalize_date("1-8-99"), None);
        assert_eq!(normalize_date("01-08-02024"), None);
        assert_eq!(normalize_date("1-8-2024").as_deref(), Some("01-08-2024"));
    }

    #[test]
    fn test_ambiguous_dates_resolve_day_first() {
        // 03/04 could be either; day wins.
        assert_eq!(normalize_date("03/04/2024").as_deref(), Some("03-04-2024"));
        // 08/13 is only valid month-first.
        assert_eq!(normalize_date("08/13/2024").as_deref(), Some("13-08-2024"));
    }

    #[test]
    fn test_normalize_table() {
        let table = Table::from_strings(
            &["Date", "Description", "Debit Amt", "Balance"],
            &[&["2024-08-01", "  Salary ", "(1,000.00)", "N/A"]],
        )
        .unwrap();
        let normalized = TableNormalizer::default().normalize(&table);

        assert_eq!(
            normalized.rows[0],
            vec![
                Cell::text("01-08-2024"),
                Cell::text("Salary"),
                Cell::Number(-1000.0),
                Cell::Null,
            ]
        );
    }

    #[test]
    fn test_normalize_amounts_leaves_dates_alone() {
        let table = Table::from_strings(&["Date", "Credit"], &[&["2024-08-01", "5,000"]]).unwrap();
        let normalized = TableNormalizer::default().normalize_amounts(&table);
        assert_eq!(normalized.rows[0][0], Cell::text("2024-08-01"));
        assert_eq!(normalized.rows[0][1], Cell::Number(5000.0));
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let table = Table::from_strings(
            &["Date", "Description", "Debit Amt", "Credit Amt", "Balance"],
            &[
                &["01 Aug 2024", " Salary", "", "5,000.00", "15,000.00"],
                &["02/08/2024", "ATM ", "(200.00)", "", "14,800.00"],
                &["bad", "", "x", "", ""],
            ],
        )
        .unwrap();
        let normalizer = TableNormalizer::default();
        let once = normalizer.normalize(&table);
        let twice = normalizer.normalize(&once);
        assert_eq!(once, twice);
    }
}
