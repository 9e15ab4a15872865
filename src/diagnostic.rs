use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Why a generated parser could not be run to completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "failure", rename_all = "snake_case")]
pub enum ExecutionFailure {
    Timeout {
        #[serde(with = "duration_secs")]
        limit: Duration,
    },
    NonZeroExit {
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },
    MissingExport {
        entry_point: String,
    },
    /// The interpreter could not be started or waited on.
    Spawn {
        message: String,
    },
    UnreadableOutput {
        message: String,
    },
}

/// A classified explanation of why an attempt failed.
///
/// The rendered text doubles as the hint for the next generation and as the final report
/// shown to the operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    ColumnSchemaMismatch {
        produced: Vec<String>,
        expected: Vec<String>,
    },
    DateFormatMismatch {
        column: String,
        samples: Vec<String>,
    },
    NumericNormalizationMismatch {
        columns: Vec<String>,
        samples: Vec<CellDifference>,
    },
    RowCountMismatch {
        produced_rows: usize,
        expected_rows: usize,
        produced_head: String,
        expected_head: String,
    },
    GenericContentMismatch {
        produced_shape: (usize, usize),
        expected_shape: (usize, usize),
        produced_head: String,
        expected_head: String,
        numeric_drift: Vec<String>,
    },
    ExecutionFailure(ExecutionFailure),
    EmptyGeneration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellDifference {
    pub row: usize,
    pub column: String,
    pub produced: String,
    pub expected: String,
}

/// Field-free discriminant, used in progress events and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    ColumnSchemaMismatch,
    DateFormatMismatch,
    NumericNormalizationMismatch,
    RowCountMismatch,
    GenericContentMismatch,
    Timeout,
    NonZeroExit,
    MissingExport,
    ExecutionError,
    UnreadableOutput,
    EmptyGeneration,
}

impl Diagnostic {
    pub fn kind(&self) -> DiagnosticKind {
        match self {
            Diagnostic::ColumnSchemaMismatch { .. } => DiagnosticKind::ColumnSchemaMismatch,
            Diagnostic::DateFormatMismatch { .. } => DiagnosticKind::DateFormatMismatch,
            Diagnostic::NumericNormalizationMismatch { .. } => {
                DiagnosticKind::NumericNormalizationMismatch
            }
            Diagnostic::RowCountMismatch { .. } => DiagnosticKind::RowCountMismatch,
            Diagnostic::GenericContentMismatch { .. } => DiagnosticKind::GenericContentMismatch,
            Diagnostic::ExecutionFailure(f) => match f {
                ExecutionFailure::Timeout { .. } => DiagnosticKind::Timeout,
                ExecutionFailure::NonZeroExit { .. } => DiagnosticKind::NonZeroExit,
                ExecutionFailure::MissingExport { .. } => DiagnosticKind::MissingExport,
                ExecutionFailure::Spawn { .. } => DiagnosticKind::ExecutionError,
                ExecutionFailure::UnreadableOutput { .. } => DiagnosticKind::UnreadableOutput,
            },
            Diagnostic::EmptyGeneration => DiagnosticKind::EmptyGeneration,
        }
    }
}

impl From<ExecutionFailure> for Diagnostic {
    fn from(failure: ExecutionFailure) -> Self {
        Diagnostic::ExecutionFailure(failure)
    }
}

impl fmt::Display for ExecutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionFailure::Timeout { limit } => write!(
                f,
                "Execution timed out after {}s. Avoid per-character loops and re-opening the PDF; \
                 iterate pdf.pages once.",
                limit.as_secs()
            ),
            ExecutionFailure::NonZeroExit {
                code,
                stdout,
                stderr,
            } => {
                let code = code.map_or_else(|| "signal".to_string(), |c| c.to_string());
                write!(
                    f,
                    "Execution failed (exit code {}).\nSTDOUT:\n{}\nSTDERR:\n{}",
                    code, stdout, stderr
                )
            }
            ExecutionFailure::MissingExport { entry_point } => write!(
                f,
                "Module lacks a top-level `{}...` entry point. Please expose def parse(pdf_path: str) -> \
                 pandas.DataFrame and make the CLI call parse().",
                entry_point
            ),
            ExecutionFailure::Spawn { message } => write!(f, "Execution error: {}", message),
            ExecutionFailure::UnreadableOutput { message } => write!(
                f,
                "Could not read the CSV written by the parser: {}. Write it with \
                 df.to_csv(out_csv, index=False).",
                message
            ),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::ColumnSchemaMismatch { produced, expected } => write!(
                f,
                "Column mismatch.\nParsed: {}\nExpected: {}\n\
                 Return exactly these columns in this order; do not rename, add or drop any.",
                list_repr(produced),
                list_repr(expected)
            ),
            Diagnostic::DateFormatMismatch { column, samples } => write!(
                f,
                "Date format mismatch. Output shows YYYY-MM-DD, but CSV expects DD-MM-YYYY strings. \
                 Parse dates with pandas.to_datetime(..., errors='coerce', dayfirst=True) and then \
                 format with .dt.strftime('%d-%m-%Y'), ensuring the '{}' column remains dtype object \
                 (string). Examples from output: {}",
                column,
                list_repr(samples)
            ),
            Diagnostic::NumericNormalizationMismatch { columns, samples } => {
                write!(
                    f,
                    "Numeric mismatch in amount columns: {}. Remove commas, turn '(x)' into '-x' and \
                     coerce with pandas.to_numeric(..., errors='coerce'). Check that debit and credit \
                     values land in the right columns.",
                    columns.join(", ")
                )?;
                if !samples.is_empty() {
                    f.write_str("\nDiffering cells (row, column: parsed vs expected):")?;
                    for s in samples {
                        write!(
                            f,
                            "\n  {}, {}: {} vs {}",
                            s.row, s.column, s.produced, s.expected
                        )?;
                    }
                }
                Ok(())
            }
            Diagnostic::RowCountMismatch {
                produced_rows,
                expected_rows,
                produced_head,
                expected_head,
            } => write!(
                f,
                "Row count mismatch after cleanup: parsed {} rows, expected {}. Make sure every page \
                 is read and that wrapped description lines are merged into their transaction.\n\n\
                 Parsed head:\n{}\n\nExpected head:\n{}\n",
                produced_rows, expected_rows, produced_head, expected_head
            ),
            Diagnostic::GenericContentMismatch {
                produced_shape,
                expected_shape,
                produced_head,
                expected_head,
                numeric_drift,
            } => {
                write!(
                    f,
                    "Mismatch after normalization.\nParsed shape: {:?} vs Expected: {:?}\n\n\
                     Parsed head:\n{}\n\nExpected head:\n{}\n",
                    produced_shape, expected_shape, produced_head, expected_head
                )?;
                if !numeric_drift.is_empty() {
                    writeln!(
                        f,
                        "Amount columns that differed before row cleanup: {}",
                        numeric_drift.join(", ")
                    )?;
                }
                Ok(())
            }
            Diagnostic::ExecutionFailure(failure) => fmt::Display::fmt(failure, f),
            Diagnostic::EmptyGeneration => f.write_str(
                "Empty generation after fence stripping; regenerate the full module with parse() and CLI.",
            ),
        }
    }
}

fn list_repr(items: &[String]) -> String {
    let quoted: Vec<String> = items.iter().map(|s| format!("'{}'", s)).collect();
    format!("[{}]", quoted.join(", "))
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs.max(0.0)))
    }
}
