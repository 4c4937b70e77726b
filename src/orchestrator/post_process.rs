//! Post-run processing: read the engine's report, summarize it, export it.

use crate::model::ChangeRecord;
use crate::report;
use crate::text_summary::{build_text_summary, TextSummary};
use anyhow::{Context, Result};
use std::path::Path;

/// Result of post-run processing, ready for presentation layers.
pub(crate) struct ProcessedRun {
    pub records: Vec<ChangeRecord>,
    pub summary: TextSummary,
    pub export_messages: Vec<String>,
}

/// Read the report under `output_dir` and build everything text mode prints.
///
/// A missing or unreadable report yields an empty record set; the cause is logged.
pub(crate) fn process_run_completion(output_dir: &Path, export_path: Option<&Path>) -> ProcessedRun {
    let path = report::report_path(output_dir);
    let records = match report::read_report(&path) {
        Ok(records) => records,
        Err(e) => {
            tracing::warn!("report unavailable after run: {e}");
            Vec::new()
        }
    };

    let mut export_messages = Vec::new();
    if let Some(p) = export_path {
        match export_json(p, &records) {
            Ok(()) => export_messages.push(format!("Exported JSON: {}", p.display())),
            Err(e) => export_messages.push(format!("Export JSON failed: {e:#}")),
        }
    }

    ProcessedRun {
        summary: build_text_summary(&records),
        records,
        export_messages,
    }
}

/// Write change records as pretty JSON, creating parent directories.
pub(crate) fn export_json(path: &Path, records: &[ChangeRecord]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create export dir {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(records).context("serialize change records")?;
    std::fs::write(path, json).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::REPORT_FILE_NAME;

    #[test]
    fn summarizes_and_exports_report() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(REPORT_FILE_NAME),
            "binlog starttime stoptime startpos stoppos inserts updates deletes database table\n\
             mysql-bin.000001 2026-01-21_16:59:10 2026-01-21_16:59:12 4 900 2 1 0 shop orders\n",
        )
        .unwrap();
        let export = dir.path().join("nested/records.json");

        let run = process_run_completion(dir.path(), Some(&export));
        assert_eq!(run.records.len(), 2);
        assert_eq!(run.export_messages.len(), 1);
        assert!(run.export_messages[0].starts_with("Exported JSON"));

        let written: Vec<ChangeRecord> =
            serde_json::from_str(&std::fs::read_to_string(&export).unwrap()).unwrap();
        assert_eq!(written, run.records);
    }

    #[test]
    fn missing_report_gives_empty_run() {
        let dir = tempfile::tempdir().unwrap();
        let run = process_run_completion(dir.path(), None);
        assert!(run.records.is_empty());
        assert!(run.export_messages.is_empty());
        assert_eq!(run.summary.lines, vec![crate::orchestrator::NO_RESULTS.to_string()]);
    }
}
