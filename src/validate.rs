//! Task configuration rules.
//!
//! DDL and DML output are mutually exclusive, and rollback mode cannot carry DDL.
//! Turning DDL on when it would clear other fields is a guarded transition that
//! needs explicit confirmation; everything else is checked at submission.

use crate::error::ConfigError;
use crate::model::{ConnStatus, DmlKind, TaskConfig, WorkType};

pub const MIN_THREADS: u32 = 1;
pub const MAX_THREADS: u32 = 64;

/// What enabling DDL would do to the rest of the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DdlConsequence {
    /// Rollback mode is switched to forward and DML flags are cleared.
    ForceForwardAndClearDml,
    /// DML flags are cleared.
    ClearDml,
}

impl DdlConsequence {
    pub fn describe(self) -> &'static str {
        match self {
            DdlConsequence::ForceForwardAndClearDml => {
                "Rollback mode does not support DDL. Enabling DDL switches to forward mode and clears the DML options. Continue?"
            }
            DdlConsequence::ClearDml => {
                "Enabling DDL disables DML output (insert/update/delete). Continue?"
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DdlChange {
    Apply(TaskConfig),
    NeedsConfirmation {
        consequence: DdlConsequence,
        resolved: TaskConfig,
    },
}

/// Decide how a DDL toggle request affects `current`. Never mutates.
pub fn propose_ddl_change(current: &TaskConfig, enable: bool) -> DdlChange {
    let mut next = current.clone();
    if !enable {
        next.ops.ddl = false;
        return DdlChange::Apply(next);
    }

    let rollback = current.work_type == WorkType::Rollback;
    next.ops.ddl = true;
    if !rollback && !current.ops.any_dml() {
        return DdlChange::Apply(next);
    }

    next.ops.clear_dml();
    next.work_type = WorkType::Forward;
    let consequence = if rollback {
        DdlConsequence::ForceForwardAndClearDml
    } else {
        DdlConsequence::ClearDml
    };
    DdlChange::NeedsConfirmation {
        consequence,
        resolved: next,
    }
}

/// DML flags are locked while DDL output is on. Returns false when the change was refused.
pub fn set_dml(cfg: &mut TaskConfig, kind: DmlKind, on: bool) -> bool {
    if on && cfg.ops.ddl {
        return false;
    }
    cfg.ops.set_dml(kind, on);
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Correction {
    /// DDL dropped because rollback mode cannot produce it.
    DdlDroppedForRollback,
    /// DML flags cleared because DDL output is on.
    DmlClearedForDdl,
}

impl Correction {
    pub fn describe(self) -> &'static str {
        match self {
            Correction::DdlDroppedForRollback => "DDL output disabled: not supported in rollback mode",
            Correction::DmlClearedForDdl => "DML output disabled: DDL mode is on",
        }
    }
}

/// Restore the flag invariants on a config about to be submitted.
pub fn enforce_invariants(mut cfg: TaskConfig) -> (TaskConfig, Vec<Correction>) {
    let mut corrections = Vec::new();
    if cfg.work_type == WorkType::Rollback && cfg.ops.ddl {
        cfg.ops.ddl = false;
        corrections.push(Correction::DdlDroppedForRollback);
    }
    if cfg.ops.ddl && cfg.ops.any_dml() {
        cfg.ops.clear_dml();
        corrections.push(Correction::DmlClearedForDdl);
    }
    (cfg, corrections)
}

/// Required fields and ranges that gate submission.
pub fn check_submittable(cfg: &TaskConfig, conn: ConnStatus) -> Result<(), ConfigError> {
    if cfg.connection_string.trim().is_empty() {
        return Err(ConfigError::MissingConnection);
    }
    if cfg.output_dir.as_os_str().is_empty() {
        return Err(ConfigError::MissingOutputDir);
    }
    if conn != ConnStatus::Success {
        return Err(ConfigError::NotConnected);
    }
    if cfg.database.as_deref().map_or(true, |d| d.trim().is_empty()) {
        return Err(ConfigError::MissingDatabase);
    }
    if !(MIN_THREADS..=MAX_THREADS).contains(&cfg.threads) {
        return Err(ConfigError::ThreadsOutOfRange(cfg.threads));
    }
    if let (Some(start), Some(stop)) = (cfg.window.start, cfg.window.stop) {
        if start >= stop {
            return Err(ConfigError::EmptyTimeWindow);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::OpFlags;
    use std::path::PathBuf;
    use time::macros::datetime;

    fn ready() -> TaskConfig {
        TaskConfig {
            connection_string: "root:pw@tcp(127.0.0.1:3306)".into(),
            output_dir: PathBuf::from("/tmp/out"),
            database: Some("shop".into()),
            ..Default::default()
        }
    }

    fn flags(ddl: bool, insert: bool, update: bool, delete: bool) -> OpFlags {
        OpFlags { ddl, insert, update, delete }
    }

    #[test]
    fn enabling_ddl_without_conflicts_applies_directly() {
        let mut cfg = ready();
        cfg.ops = flags(false, false, false, false);
        match propose_ddl_change(&cfg, true) {
            DdlChange::Apply(next) => assert!(next.ops.ddl),
            other => panic!("expected direct apply, got {other:?}"),
        }
    }

    #[test]
    fn every_conflicting_combination_needs_confirmation() {
        for bits in 0u8..16 {
            let mut cfg = ready();
            cfg.ops = flags(false, bits & 1 != 0, bits & 2 != 0, bits & 4 != 0);
            cfg.work_type = if bits & 8 != 0 { WorkType::Rollback } else { WorkType::Forward };
            let before = cfg.clone();
            let conflicting = cfg.ops.any_dml() || cfg.work_type == WorkType::Rollback;

            match propose_ddl_change(&cfg, true) {
                DdlChange::NeedsConfirmation { consequence, resolved } => {
                    assert!(conflicting, "bits {bits}");
                    assert_eq!(cfg, before, "proposal must not mutate");
                    assert_eq!(resolved.ops, flags(true, false, false, false));
                    assert_eq!(resolved.work_type, WorkType::Forward);
                    let expected = if before.work_type == WorkType::Rollback {
                        DdlConsequence::ForceForwardAndClearDml
                    } else {
                        DdlConsequence::ClearDml
                    };
                    assert_eq!(consequence, expected);
                }
                DdlChange::Apply(_) => assert!(!conflicting, "bits {bits}"),
            }
        }
    }

    #[test]
    fn disabling_ddl_leaves_other_flags_alone() {
        let mut cfg = ready();
        cfg.ops = flags(true, false, false, false);
        let DdlChange::Apply(next) = propose_ddl_change(&cfg, false) else {
            panic!("disable must apply directly");
        };
        assert_eq!(next.ops, flags(false, false, false, false));
        assert_eq!(next.work_type, cfg.work_type);
    }

    #[test]
    fn dml_is_locked_while_ddl_is_on() {
        let mut cfg = ready();
        cfg.ops = flags(true, false, false, false);
        assert!(!set_dml(&mut cfg, DmlKind::Insert, true));
        assert!(!cfg.ops.insert);
        assert!(set_dml(&mut cfg, DmlKind::Insert, false));
    }

    #[test]
    fn invariants_are_corrected_at_submission() {
        let mut cfg = ready();
        cfg.work_type = WorkType::Rollback;
        cfg.ops = flags(true, true, false, false);
        let (fixed, corrections) = enforce_invariants(cfg);
        assert!(!fixed.ops.ddl);
        assert!(fixed.ops.insert);
        assert_eq!(corrections, vec![Correction::DdlDroppedForRollback]);

        let mut cfg = ready();
        cfg.ops = flags(true, true, true, false);
        let (fixed, corrections) = enforce_invariants(cfg);
        assert_eq!(fixed.ops, flags(true, false, false, false));
        assert_eq!(corrections, vec![Correction::DmlClearedForDdl]);
    }

    #[test]
    fn required_fields_block_submission() {
        let mut cfg = ready();
        cfg.connection_string = "  ".into();
        assert_eq!(check_submittable(&cfg, ConnStatus::Success), Err(ConfigError::MissingConnection));

        let mut cfg = ready();
        cfg.output_dir = PathBuf::new();
        assert_eq!(check_submittable(&cfg, ConnStatus::Success), Err(ConfigError::MissingOutputDir));

        let mut cfg = ready();
        cfg.database = None;
        assert_eq!(check_submittable(&cfg, ConnStatus::Success), Err(ConfigError::MissingDatabase));

        assert_eq!(check_submittable(&ready(), ConnStatus::Error), Err(ConfigError::NotConnected));
        assert_eq!(check_submittable(&ready(), ConnStatus::None), Err(ConfigError::NotConnected));
    }

    #[test]
    fn empty_table_selection_is_valid() {
        let cfg = ready();
        assert!(cfg.tables.is_empty());
        assert_eq!(check_submittable(&cfg, ConnStatus::Success), Ok(()));
    }

    #[test]
    fn threads_and_window_are_range_checked() {
        let mut cfg = ready();
        cfg.threads = 0;
        assert_eq!(check_submittable(&cfg, ConnStatus::Success), Err(ConfigError::ThreadsOutOfRange(0)));
        cfg.threads = 65;
        assert_eq!(check_submittable(&cfg, ConnStatus::Success), Err(ConfigError::ThreadsOutOfRange(65)));

        let mut cfg = ready();
        cfg.window.start = Some(datetime!(2026-01-02 00:00:00));
        cfg.window.stop = Some(datetime!(2026-01-01 00:00:00));
        assert_eq!(check_submittable(&cfg, ConnStatus::Success), Err(ConfigError::EmptyTimeWindow));
        cfg.window.stop = None;
        assert_eq!(check_submittable(&cfg, ConnStatus::Success), Ok(()));
    }
}
