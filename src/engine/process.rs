//! Runs the `my2sql` binary and forwards its output as log lines.
//!
//! my2sql only takes the password as `-password <pw>`, so it is visible in the
//! process list of the host while an analysis runs. Use an account limited to
//! replication privileges. The flag is omitted for empty passwords and never
//! logged.

use super::EngineControl;
use crate::dsn::Dsn;
use crate::error::ConsoleError;
use crate::model::{AnalyzeRequest, WorkType};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const SERVER_ID: &str = "1113306";
const PASSWORD_FLAG: &str = "-password";

/// Command line with the password value masked, for logs.
fn redacted(args: &[String]) -> String {
    let mut out = Vec::with_capacity(args.len());
    let mut mask_next = false;
    for arg in args {
        if mask_next {
            out.push("***");
        } else {
            out.push(arg.as_str());
        }
        mask_next = arg == PASSWORD_FLAG;
    }
    out.join(" ")
}

fn work_type_arg(work_type: WorkType) -> &'static str {
    match work_type {
        WorkType::Forward => "2sql",
        WorkType::Rollback => "rollback",
    }
}

/// Translate a request into my2sql command-line flags.
pub(super) fn build_args(req: &AnalyzeRequest) -> Result<Vec<String>, ConsoleError> {
    let dsn = Dsn::parse(&req.connection_string)
        .map_err(|e| ConsoleError::Engine(format!("invalid connection string: {e}")))?;

    let mut args: Vec<String> = vec!["-user".into(), dsn.user];
    if !dsn.password.is_empty() {
        args.push(PASSWORD_FLAG.into());
        args.push(dsn.password);
    }
    args.extend([
        "-host".into(),
        dsn.host,
        "-port".into(),
        dsn.port.to_string(),
        "-mode".into(),
        "repl".into(),
        "-work-type".into(),
        work_type_arg(req.work_type).into(),
        "-mysql-type".into(),
        "mysql".into(),
        "-server-id".into(),
        SERVER_ID.into(),
        "-threads".into(),
        req.threads.to_string(),
        "-output-dir".into(),
        req.output_dir.clone(),
        "-add-extraInfo".into(),
        "-do-not-add-prifixDb".into(),
    ]);

    if !req.databases.is_empty() {
        args.push("-databases".into());
        args.push(req.databases.join(","));
    }
    if !req.tables.is_empty() {
        args.push("-tables".into());
        args.push(req.tables.join(","));
    }

    if req.include_ddl {
        args.push("-ddl".into());
    } else {
        let kinds: Vec<&str> = [
            (req.include_insert, "insert"),
            (req.include_update, "update"),
            (req.include_delete, "delete"),
        ]
        .into_iter()
        .filter_map(|(on, kind)| on.then_some(kind))
        .collect();
        if !kinds.is_empty() {
            args.push("-sql".into());
            args.push(kinds.join(","));
        }
    }

    if !req.start_datetime.is_empty() {
        args.push("-start-datetime".into());
        args.push(req.start_datetime.clone());
    }
    if !req.stop_datetime.is_empty() {
        args.push("-stop-datetime".into());
        args.push(req.stop_datetime.clone());
    }

    Ok(args)
}

fn forward_lines<R>(reader: R, tx: mpsc::UnboundedSender<String>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(line).is_err() {
                break;
            }
        }
    })
}

pub(super) async fn run(
    binary: PathBuf,
    request: AnalyzeRequest,
    log_tx: mpsc::UnboundedSender<String>,
    mut control_rx: mpsc::UnboundedReceiver<EngineControl>,
) -> Result<(), ConsoleError> {
    let args = build_args(&request)?;
    tracing::debug!(args = %redacted(&args), "engine command line");

    tokio::fs::create_dir_all(&request.output_dir)
        .await
        .map_err(|e| ConsoleError::Engine(format!("cannot create {}: {e}", request.output_dir)))?;

    let mut child = Command::new(&binary)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| ConsoleError::Engine(format!("failed to start {}: {e}", binary.display())))?;

    tracing::info!(binary = %binary.display(), pid = ?child.id(), "engine process started");

    let readers: Vec<JoinHandle<()>> = [
        child.stdout.take().map(|s| forward_lines(s, log_tx.clone())),
        child.stderr.take().map(|s| forward_lines(s, log_tx.clone())),
    ]
    .into_iter()
    .flatten()
    .collect();

    let mut control_open = true;
    let mut stop_requested = false;
    let status = loop {
        tokio::select! {
            status = child.wait() => break status,
            ctrl = control_rx.recv(), if control_open => match ctrl {
                Some(EngineControl::Stop) if !stop_requested => {
                    stop_requested = true;
                    let _ = log_tx.send("stop requested, terminating engine".into());
                    if let Err(e) = child.start_kill() {
                        tracing::warn!("failed to kill engine process: {e}");
                    }
                }
                Some(EngineControl::Stop) => {}
                None => control_open = false,
            },
        }
    }
    .map_err(|e| ConsoleError::Engine(format!("failed to wait for engine: {e}")))?;

    // Drain whatever the pipes still hold before reporting completion.
    for reader in readers {
        let _ = reader.await;
    }

    tracing::info!(%status, stop_requested, "engine process exited");
    if status.success() || stop_requested {
        Ok(())
    } else {
        Err(ConsoleError::Engine(format!("my2sql exited with {status}")))
    }
}
