//! Application-level orchestration.
//!
//! This module owns the task lifecycle (submit/stop/completion), the live log
//! buffer, and post-run report processing. UI and CLI layers drive it through
//! `UiCommand`s and observe it through `ConsoleEvent`s.

mod console;
mod controller;
mod log_stream;
mod post_process;

pub(crate) use console::{run_console, Console, ConsoleEvent, UiCommand, NO_RESULTS};
pub(crate) use log_stream::{push_capped, LOG_CAPACITY};
pub(crate) use post_process::{export_json, process_run_completion};
