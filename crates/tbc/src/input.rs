use std::path::Path;

use anyhow::Context;
use tbc_core::csv::parse_records;

const INPUT_COLUMN: &str = "input";

/// Read the list of raw identifiers from a CSV file.
pub async fn read_inputs(path: &Path) -> anyhow::Result<Vec<String>> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read input file {}", path.display()))?;
    Ok(parse_inputs(&text))
}

/// Pick the `input` column when a header names one, otherwise the first
/// column. Blank rows are dropped; cell text is kept as written.
pub fn parse_inputs(text: &str) -> Vec<String> {
    let mut rows = parse_records(text)
        .into_iter()
        .filter(|r| r.iter().any(|f| !f.trim().is_empty()))
        .peekable();

    let mut column = 0;
    if let Some(header) = rows.peek() {
        if let Some(idx) = header
            .iter()
            .position(|f| f.trim().eq_ignore_ascii_case(INPUT_COLUMN))
        {
            column = idx;
            rows.next();
        }
    }

    rows.filter_map(|r| r.into_iter().nth(column))
        .filter(|v| !v.trim().is_empty())
        .collect()
}
