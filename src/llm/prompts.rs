// Prompt for generating a bank statement parser module

use crate::diagnostic::Diagnostic;
use crate::table::Table;

pub const PARSER_PROMPT: &str = r#"You write Python modules that parse bank statement PDFs.

Write a single .py MODULE that:
1) Exposes:
   def parse(pdf_path: str) -> pandas.DataFrame
   It MUST return a DataFrame with EXACT columns (and order): {cols}
2) Also include a CLI:
   if __name__ == "__main__":
       import sys
       in_pdf, out_csv = sys.argv[1], sys.argv[2]
       df = parse(in_pdf)
       df.to_csv(out_csv, index=False)
3) Use pdfplumber for PDF, pandas for data.
4) Iterate ALL pages (for page in pdf.pages). Strategy:
   - Try page.extract_tables() on each page and collect rows.
   - If no rows overall, text fallback:
     * page.extract_text()
     * keep lines that START with a date token (DD/MM/YYYY, DD-MM-YYYY, YYYY-MM-DD, 'DD Mon YYYY')
     * split by 2+ spaces or tabs
     * assign fields from right: Balance (rightmost number), Credit (next), Debit (next), Date = first token, Description = middle remainder
5) Normalize:
   - Trim whitespace for all object columns.
   - Convert the Date column to strings formatted as DD-MM-YYYY using: pandas.to_datetime(date_series, errors='coerce', dayfirst=True).dt.strftime('%d-%m-%Y'). The Date column must be dtype object (string), not datetime.
   - For columns whose lowercase name contains any of: {amount_keywords}, first remove commas and parentheses, then coerce with pandas.to_numeric(..., errors='coerce'), for example:
       for c in df.columns:
           cl = c.lower()
           if any(k in cl for k in {amount_list}):
               df[c] = (df[c].astype(str)
                            .str.replace(',', '', regex=False)
                            .str.replace('(', '-', regex=False)
                            .str.replace(')', '', regex=False))
               df[c] = pandas.to_numeric(df[c], errors='coerce')
   - Do NOT drop, rename, or reorder columns. Put the normalization immediately before returning df.
6) Use plain ASCII quotes only. Do NOT output markdown fences.

CSV sample (for guidance):
{csv_sample}

Hints:
{feedback}

Attempt: {attempt}
Provide ONLY the module code.
"#;

pub const SAMPLE_ROWS: usize = 2;

/// Assembles the generation request for one attempt.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    columns: Vec<String>,
    sample: String,
    amount_keywords: Vec<String>,
}

impl PromptBuilder {
    pub fn new(expected: &Table, amount_keywords: &[String]) -> Self {
        Self {
            columns: expected.columns.clone(),
            sample: expected.render_rows(SAMPLE_ROWS),
            amount_keywords: amount_keywords.to_vec(),
        }
    }

    /// Hint used before any diagnostic exists.
    pub fn default_feedback(&self) -> String {
        format!(
            "First attempt. Match the CSV exactly. Columns: {}",
            self.columns.join(", ")
        )
    }

    pub fn build(&self, feedback: Option<&Diagnostic>, attempt: u32) -> String {
        let feedback = feedback.map_or_else(|| self.default_feedback(), |d| d.to_string());

        // Feedback goes in last so text quoted from a failed run is never re-substituted.
        PARSER_PROMPT
            .replace("{cols}", &python_list(&self.columns))
            .replace("{amount_keywords}", &self.amount_keywords.join(", "))
            .replace("{amount_list}", &python_list(&self.amount_keywords))
            .replace("{csv_sample}", &self.sample)
            .replace("{attempt}", &attempt.to_string())
            .replace("{feedback}", &feedback)
    }
}

fn python_list(items: &[String]) -> String {
    let quoted: Vec<String> = items.iter().map(|s| format!("'{}'", s)).collect();
    format!("[{}]", quoted.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::AmountColumns;

    fn builder() -> PromptBuilder {
        let expected = Table::from_strings(
            &["Date", "Description", "Debit Amt", "Credit Amt", "Balance"],
            &[
                &["01-08-2024", "Salary", "", "5000.00", "15000.00"],
                &["02-08-2024", "Rent", "1200.00", "", "13800.00"],
                &["03-08-2024", "Coffee", "4.50", "", "13795.50"],
            ],
        )
        .unwrap();
        PromptBuilder::new(&expected, AmountColumns::default().keywords())
    }

    #[test]
    fn test_first_attempt_uses_default_feedback() {
        let prompt = builder().build(None, 1);
        assert!(prompt.contains(
            "EXACT columns (and order): ['Date', 'Description', 'Debit Amt', 'Credit Amt', 'Balance']"
        ));
        assert!(prompt.contains(
            "First attempt. Match the CSV exactly. Columns: Date, Description, Debit Amt, Credit Amt, Balance"
        ));
        assert!(prompt.contains("Attempt: 1"));
        assert!(prompt.contains("['amount', 'debit', 'credit', 'balance']"));
    }

    #[test]
    fn test_sample_is_limited_to_two_rows() {
        let prompt = builder().build(None, 1);
        assert!(prompt.contains("Salary"));
        assert!(prompt.contains("Rent"));
        assert!(!prompt.contains("Coffee"));
        assert!(prompt.contains("\n01-08-2024"));
        assert!(!prompt.contains("\n0  01-08-2024"));
    }

    #[test]
    fn test_diagnostic_becomes_hint() {
        let diagnostic = Diagnostic::DateFormatMismatch {
            column: "Date".into(),
            samples: vec!["2024-08-01".into()],
        };
        let prompt = builder().build(Some(&diagnostic), 2);
        assert!(prompt.contains("Date format mismatch"));
        assert!(prompt.contains("Attempt: 2"));
        assert!(!prompt.contains("First attempt"));
    }
}
