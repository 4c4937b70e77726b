//! Text summary builder for CLI output.
//!
//! Formats change records as an aligned table followed by per-operation totals.

use crate::model::{ChangeRecord, Operation};
use crate::orchestrator::NO_RESULTS;
use std::collections::BTreeSet;

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

pub(crate) fn build_text_summary(records: &[ChangeRecord]) -> TextSummary {
    if records.is_empty() {
        return TextSummary {
            lines: vec![NO_RESULTS.to_string()],
        };
    }

    let db_w = column_width(records.iter().map(|r| r.database.as_str()), "Database");
    let table_w = column_width(records.iter().map(|r| r.table.as_str()), "Table");

    let mut lines = Vec::with_capacity(records.len() + 3);
    lines.push(format!(
        "{:>4}  {:<6}  {:<db_w$}  {:<table_w$}  {:>10}  {}",
        "#", "Op", "Database", "Table", "Records", "Time"
    ));
    for r in records {
        lines.push(format!(
            "{:>4}  {:<6}  {:<db_w$}  {:<table_w$}  {:>10}  {}",
            r.id,
            r.operation.as_str(),
            r.database,
            r.table,
            r.records,
            r.timestamp
        ));
    }

    let total = |op: Operation| -> u64 {
        records
            .iter()
            .filter(|r| r.operation == op)
            .map(|r| r.records)
            .sum()
    };
    let tables: BTreeSet<(&str, &str)> = records
        .iter()
        .map(|r| (r.database.as_str(), r.table.as_str()))
        .collect();
    lines.push(String::new());
    lines.push(format!(
        "Totals: INSERT {}  UPDATE {}  DELETE {}  across {} table(s)",
        total(Operation::Insert),
        total(Operation::Update),
        total(Operation::Delete),
        tables.len()
    ));

    TextSummary { lines }
}

fn column_width<'a>(values: impl Iterator<Item = &'a str>, header: &str) -> usize {
    values.map(str::len).max().unwrap_or(0).max(header.len())
}
