use std::ffi::OsString;
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::{AgentError, Result};

/// Sample statement and its expected table for one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputPair {
    pub pdf: PathBuf,
    pub csv: PathBuf,
}

/// Lowercased, trimmed target identifier.
pub fn canonical_target(target: &str) -> String {
    target.trim().to_lowercase()
}

/// File stems tried, in order, under `<data_dir>/<target>/`.
pub fn candidate_stems(target: &str) -> Vec<String> {
    vec![
        format!("{}_sample", target),
        format!("{} sample", target),
        format!("{}_statement", target),
        format!("{} statement", target),
        target.to_string(),
    ]
}

/// Resolves the first stem for which both `<stem>.pdf` and `<stem>.csv` exist.
pub fn find_inputs(data_dir: &Path, target: &str) -> Result<InputPair> {
    let target = canonical_target(target);
    let base = data_dir.join(&target);
    let stems = candidate_stems(&target);

    for stem in &stems {
        let pdf = base.join(format!("{}.pdf", stem));
        let csv = base.join(format!("{}.csv", stem));
        if pdf.is_file() && csv.is_file() {
            debug!("Resolved inputs for {}: {}", target, pdf.display());
            return Ok(InputPair { pdf, csv });
        }
    }

    Err(AgentError::MissingInputs {
        target,
        dir: base,
        searched: stems.join(", "),
    })
}

/// Deterministic location of the generated parser for `target`.
pub fn artifact_path(output_dir: &Path, target: &str) -> PathBuf {
    output_dir.join(format!("{}_parser.py", canonical_target(target)))
}

/// Scratch file the artifact writes its table to: `<expected csv>.out`.
pub fn scratch_output_path(expected_csv: &Path) -> PathBuf {
    let mut name = OsString::from(expected_csv.as_os_str());
    name.push(".out");
    PathBuf::from(name)
}
