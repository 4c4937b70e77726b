//! Reader for the engine's `binlog_status.txt` summary.
//!
//! Layout is whitespace-separated: binlog, starttime, stoptime, startpos, stoppos,
//! inserts, updates, deletes, database, table. Rows with fewer columns are skipped.

use crate::error::ReportError;
use crate::model::{ChangeRecord, Operation};
use std::path::{Path, PathBuf};

pub const REPORT_FILE_NAME: &str = "binlog_status.txt";

const MIN_COLUMNS: usize = 10;

pub fn report_path(output_dir: &Path) -> PathBuf {
    output_dir.join(REPORT_FILE_NAME)
}

pub fn read_report(path: &Path) -> Result<Vec<ChangeRecord>, ReportError> {
    let bytes = std::fs::read(path).map_err(|source| ReportError::Unavailable {
        path: path.to_path_buf(),
        source,
    })?;
    let text = String::from_utf8(bytes).map_err(|e| ReportError::Parse {
        line: 0,
        reason: format!("not valid UTF-8: {e}"),
    })?;
    parse_report(&text)
}

pub fn parse_report(text: &str) -> Result<Vec<ChangeRecord>, ReportError> {
    let mut records = Vec::new();
    let mut next_id = 1u32;

    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || is_header(line) {
            continue;
        }
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < MIN_COLUMNS {
            continue;
        }

        let lineno = idx + 1;
        let timestamp = parts[1].replacen('_', " ", 1);
        let counts = [
            (Operation::Insert, count(parts[5], lineno)?),
            (Operation::Update, count(parts[6], lineno)?),
            (Operation::Delete, count(parts[7], lineno)?),
        ];
        for (operation, records_changed) in counts {
            if records_changed == 0 {
                continue;
            }
            records.push(ChangeRecord {
                id: next_id,
                operation,
                database: parts[8].to_string(),
                table: parts[9].to_string(),
                records: records_changed,
                timestamp: timestamp.clone(),
            });
            next_id += 1;
        }
    }

    Ok(records)
}

fn is_header(line: &str) -> bool {
    line.contains("binlog") && line.contains("starttime")
}

fn count(raw: &str, line: usize) -> Result<u64, ReportError> {
    raw.parse::<u64>().map_err(|_| ReportError::Parse {
        line,
        reason: format!("expected a row count, found {raw:?}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = "\
binlog            starttime           stoptime            startpos   stoppos    inserts  updates  deletes  database  table
mysql-bin.001092  2026-01-21_16:59:10 2026-01-21_16:59:10 1193       1467       1        0        0        dbtest1   test7

mysql-bin.001092  2026-01-21_17:01:02 2026-01-21_17:03:44 1532       9921       0        12       3        dbtest1   orders
short line
";

    #[test]
    fn expands_nonzero_counts_into_records() {
        let records = parse_report(SAMPLE).unwrap();
        assert_eq!(records.len(), 3);

        assert_eq!(records[0].id, 1);
        assert_eq!(records[0].operation, Operation::Insert);
        assert_eq!(records[0].table, "test7");
        assert_eq!(records[0].timestamp, "2026-01-21 16:59:10");

        assert_eq!(records[1].id, 2);
        assert_eq!(records[1].operation, Operation::Update);
        assert_eq!(records[1].records, 12);
        assert_eq!(records[2].operation, Operation::Delete);
        assert_eq!(records[2].records, 3);
        assert_eq!(records[2].database, "dbtest1");
    }

    #[test]
    fn header_only_report_is_empty_not_an_error() {
        let header = SAMPLE.lines().next().unwrap();
        assert!(parse_report(header).unwrap().is_empty());
        assert!(parse_report("").unwrap().is_empty());
    }

    #[test]
    fn non_numeric_count_is_a_parse_error() {
        let bad = "mysql-bin.1 2026-01-21_16:59:10 x 1 2 many 0 0 db t";
        match parse_report(bad) {
            Err(ReportError::Parse { line, .. }) => assert_eq!(line, 1),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn missing_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_report(&report_path(dir.path())).unwrap_err();
        assert!(matches!(err, ReportError::Unavailable { .. }));
    }

    #[test]
    fn reads_report_from_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut f = std::fs::File::create(report_path(dir.path())).unwrap();
        f.write_all(SAMPLE.as_bytes()).unwrap();
        drop(f);

        let first = read_report(&report_path(dir.path())).unwrap();
        let second = read_report(&report_path(dir.path())).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }
}
