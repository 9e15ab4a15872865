use std::fmt;
use std::io::{Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};

/// A single table value.
///
/// Values are read as text; the normalizer decides which columns become numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Null,
    Number(f64),
    Text(String),
}

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        Cell::Text(value.into())
    }

    /// True for `Null` and for text that is empty once trimmed.
    pub fn is_blank(&self) -> bool {
        match self {
            Cell::Null => true,
            Cell::Text(s) => s.trim().is_empty(),
            Cell::Number(_) => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => Ok(()),
            Cell::Number(n) => write!(f, "{}", n),
            Cell::Text(s) => f.write_str(s),
        }
    }
}

/// Ordered columns plus rows of cells. Every row has exactly `columns.len()` cells.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Builds a table from string literals, mapping `""` to `Null` the way the CSV reader does.
    pub fn from_strings(columns: &[&str], rows: &[&[&str]]) -> Result<Self> {
        let mut table = Self::new(columns.iter().map(|c| c.to_string()).collect());
        for row in rows {
            table.push_row(row.iter().map(|v| field_to_cell(v)).collect())?;
        }
        Ok(table)
    }

    pub fn push_row(&mut self, row: Vec<Cell>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(AgentError::Table(format!(
                "row {} has {} fields, expected {}",
                self.rows.len() + 1,
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn read_csv(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_reader(reader);

        let columns: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
        if columns.is_empty() || columns.iter().all(|c| c.is_empty()) {
            return Err(AgentError::Table("no columns to parse".to_string()));
        }

        let mut table = Self::new(columns);
        for record in rdr.records() {
            let record = record?;
            table.push_row(record.iter().map(field_to_cell).collect())?;
        }
        Ok(table)
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)?;
        self.to_writer(file)
    }

    pub fn to_writer<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(&self.columns)?;
        for row in &self.rows {
            wtr.write_record(row.iter().map(|c| c.to_string()))?;
        }
        wtr.flush()?;
        Ok(())
    }

    /// `(rows, columns)`
    pub fn shape(&self) -> (usize, usize) {
        (self.rows.len(), self.columns.len())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// First column whose lowercased name starts with `date`.
    pub fn date_column(&self) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.to_lowercase().starts_with("date"))
    }

    /// First column whose lowercased name contains `description`.
    pub fn description_column(&self) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.to_lowercase().contains("description"))
    }

    pub fn column_values(&self, idx: usize) -> impl Iterator<Item = &Cell> {
        self.rows.iter().filter_map(move |row| row.get(idx))
    }

    pub fn retain_rows<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(&[Cell]) -> bool,
    {
        let before = self.rows.len();
        self.rows.retain(|row| keep(row));
        before - self.rows.len()
    }

    pub fn truncate(&mut self, len: usize) {
        self.rows.truncate(len);
    }

    /// Renders the first `n` rows as an aligned text grid with a leading row index.
    pub fn render_head(&self, n: usize) -> String {
        self.render_grid(n, true)
    }

    /// Same grid as [`Table::render_head`] without the row index.
    pub fn render_rows(&self, n: usize) -> String {
        self.render_grid(n, false)
    }

    fn render_grid(&self, n: usize, with_index: bool) -> String {
        let shown: Vec<Vec<String>> = self
            .rows
            .iter()
            .take(n)
            .map(|row| row.iter().map(render_cell).collect())
            .collect();

        let mut widths: Vec<usize> = self.columns.iter().map(|c| c.chars().count()).collect();
        for row in &shown {
            for (w, value) in widths.iter_mut().zip(row) {
                *w = (*w).max(value.chars().count());
            }
        }

        let index_width = shown.len().saturating_sub(1).to_string().len();
        let line = |index: String, values: Vec<String>| -> String {
            let cells: Vec<String> = values
                .iter()
                .zip(&widths)
                .map(|(v, w)| format!("{:>w$}", v, w = *w))
                .collect();
            if with_index {
                format!("{:<w$}  {}", index, cells.join("  "), w = index_width)
            } else {
                cells.join("  ")
            }
        };

        let mut lines = vec![line(String::new(), self.columns.clone())];
        for (i, row) in shown.into_iter().enumerate() {
            lines.push(line(i.to_string(), row));
        }
        lines.join("\n")
    }
}

fn field_to_cell(field: &str) -> Cell {
    if field.is_empty() {
        Cell::Null
    } else {
        Cell::Text(field.to_string())
    }
}

fn render_cell(cell: &Cell) -> String {
    match cell {
        Cell::Null => "NaN".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_csv_maps_empty_fields_to_null() {
        let data = "Date,Description,Debit Amt\n01-08-2024,Salary,\n02-08-2024,Rent,1200.00\n";
        let table = Table::from_reader(data.as_bytes()).unwrap();

        assert_eq!(table.columns, vec!["Date", "Description", "Debit Amt"]);
        assert_eq!(table.shape(), (2, 3));
        assert_eq!(table.rows[0][2], Cell::Null);
        assert_eq!(table.rows[1][2], Cell::text("1200.00"));
    }

    #[test]
    fn test_ragged_rows_are_rejected() {
        let data = "A,B\n1,2\n3\n";
        assert!(Table::from_reader(data.as_bytes()).is_err());
    }

    #[test]
    fn test_write_then_read_keeps_nulls() {
        let mut table = Table::new(vec!["Date".into(), "Balance".into()]);
        table
            .push_row(vec![Cell::text("01-08-2024"), Cell::Number(15000.0)])
            .unwrap();
        table.push_row(vec![Cell::Null, Cell::Null]).unwrap();

        let mut buf = Vec::new();
        table.to_writer(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text, "Date,Balance\n01-08-2024,15000\n,\n");

        let back = Table::from_reader(text.as_bytes()).unwrap();
        assert_eq!(back.rows[1], vec![Cell::Null, Cell::Null]);
    }

    #[test]
    fn test_column_lookup_helpers() {
        let table = Table::new(vec![
            "Txn Date".into(),
            "Date Posted".into(),
            "Transaction Description".into(),
        ]);
        assert_eq!(table.date_column(), Some(1));
        assert_eq!(table.description_column(), Some(2));
        assert_eq!(table.column_index("Txn Date"), Some(0));
    }

    #[test]
    fn test_render_rows_has_no_index_column() {
        let table =
            Table::from_strings(&["Date", "Balance"], &[&["01-08-2024", "10"]]).unwrap();
        assert_eq!(table.render_rows(5), "      Date  Balance\n01-08-2024       10");
        assert_eq!(table.render_head(5), "         Date  Balance\n0  01-08-2024       10");
    }

    #[test]
    fn test_render_head_limits_rows() {
        let table = Table::from_strings(
            &["Date", "Balance"],
            &[&["01-08-2024", "10"], &["02-08-2024", ""], &["03-08-2024", "30"]],
        )
        .unwrap();
        let rendered = table.render_head(2);
        assert_eq!(rendered.lines().count(), 3);
        assert!(rendered.contains("NaN"));
        assert!(!rendered.contains("03-08-2024"));
    }
}
