mod mysql;
mod process;

use crate::error::ConsoleError;
use crate::model::AnalyzeRequest;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineControl {
    /// Ask the running analysis to stop. Best effort.
    Stop,
}

/// External analysis engine as seen by the console.
///
/// Futures and handles are `'static` so callers can run them on their own tasks
/// while log lines keep flowing.
pub trait Engine: Clone + Send + Sync + 'static {
    /// Check reachability and list selectable schema names.
    fn test_connection(
        &self,
        dsn: String,
    ) -> impl Future<Output = Result<Vec<String>, ConsoleError>> + Send + 'static;

    /// List table names across `schemas`.
    fn list_tables(
        &self,
        dsn: String,
        schemas: Vec<String>,
    ) -> impl Future<Output = Result<Vec<String>, ConsoleError>> + Send + 'static;

    /// Start one analysis. Log lines go to `log_tx`; the handle resolves when the engine finishes.
    fn spawn(
        &self,
        request: AnalyzeRequest,
        log_tx: mpsc::UnboundedSender<String>,
        control_rx: mpsc::UnboundedReceiver<EngineControl>,
    ) -> JoinHandle<Result<(), ConsoleError>>;
}

/// Engine backed by a MySQL catalog connection and the `my2sql` binary.
#[derive(Debug, Clone)]
pub struct My2SqlEngine {
    binary: PathBuf,
    connect_timeout: Duration,
}

impl My2SqlEngine {
    pub fn new(binary: PathBuf, connect_timeout: Duration) -> Self {
        Self {
            binary,
            connect_timeout,
        }
    }
}

impl Engine for My2SqlEngine {
    fn test_connection(
        &self,
        dsn: String,
    ) -> impl Future<Output = Result<Vec<String>, ConsoleError>> + Send + 'static {
        let timeout = self.connect_timeout;
        async move { mysql::list_databases(&dsn, timeout).await }
    }

    fn list_tables(
        &self,
        dsn: String,
        schemas: Vec<String>,
    ) -> impl Future<Output = Result<Vec<String>, ConsoleError>> + Send + 'static {
        let timeout = self.connect_timeout;
        async move { mysql::list_tables(&dsn, &schemas, timeout).await }
    }

    fn spawn(
        &self,
        request: AnalyzeRequest,
        log_tx: mpsc::UnboundedSender<String>,
        control_rx: mpsc::UnboundedReceiver<EngineControl>,
    ) -> JoinHandle<Result<(), ConsoleError>> {
        let binary = self.binary.clone();
        tokio::spawn(async move { process::run(binary, request, log_tx, control_rx).await })
    }
}

#[cfg(test)]
pub(crate) mod fake {
    //! Scripted in-memory engine for controller and console tests.

    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::sync::Notify;

    #[derive(Default)]
    struct Inner {
        schemas: Mutex<Option<Vec<String>>>,
        tables: Mutex<HashMap<String, Vec<String>>>,
        script: Mutex<Vec<String>>,
        outcome: Mutex<Option<String>>,
        ignore_stop: AtomicBool,
        spawned: AtomicUsize,
        stops: AtomicUsize,
        requests: Mutex<Vec<AnalyzeRequest>>,
        log_tx: Mutex<Option<mpsc::UnboundedSender<String>>>,
        release: Notify,
    }

    /// Sends its script on spawn, then waits for `finish()` or a stop.
    #[derive(Clone, Default)]
    pub(crate) struct FakeEngine {
        inner: Arc<Inner>,
    }

    impl FakeEngine {
        pub fn with_schemas(schemas: &[&str]) -> Self {
            let engine = Self::default();
            *engine.inner.schemas.lock().unwrap() =
                Some(schemas.iter().map(|s| s.to_string()).collect());
            engine
        }

        pub fn tables(self, schema: &str, tables: &[&str]) -> Self {
            self.inner.tables.lock().unwrap().insert(
                schema.to_string(),
                tables.iter().map(|s| s.to_string()).collect(),
            );
            self
        }

        pub fn script(self, lines: &[&str]) -> Self {
            *self.inner.script.lock().unwrap() = lines.iter().map(|s| s.to_string()).collect();
            self
        }

        pub fn failing_with(self, msg: &str) -> Self {
            *self.inner.outcome.lock().unwrap() = Some(msg.to_string());
            self
        }

        pub fn ignoring_stop(self) -> Self {
            self.inner.ignore_stop.store(true, Ordering::SeqCst);
            self
        }

        /// Let the running analysis complete.
        pub fn finish(&self) {
            self.inner.release.notify_one();
        }

        /// Push a line as the engine would, even after a local stop.
        pub fn emit(&self, line: &str) {
            if let Some(tx) = self.inner.log_tx.lock().unwrap().as_ref() {
                let _ = tx.send(line.to_string());
            }
        }

        pub fn spawned(&self) -> usize {
            self.inner.spawned.load(Ordering::SeqCst)
        }

        pub fn stops(&self) -> usize {
            self.inner.stops.load(Ordering::SeqCst)
        }

        pub fn requests(&self) -> Vec<AnalyzeRequest> {
            self.inner.requests.lock().unwrap().clone()
        }
    }

    impl Engine for FakeEngine {
        fn test_connection(
            &self,
            dsn: String,
        ) -> impl Future<Output = Result<Vec<String>, ConsoleError>> + Send + 'static {
            let schemas = self.inner.schemas.lock().unwrap().clone();
            async move {
                schemas.ok_or_else(|| ConsoleError::Connection(format!("cannot reach {dsn}")))
            }
        }

        fn list_tables(
            &self,
            _dsn: String,
            schemas: Vec<String>,
        ) -> impl Future<Output = Result<Vec<String>, ConsoleError>> + Send + 'static {
            let tables = self.inner.tables.lock().unwrap().clone();
            async move {
                let mut out = Vec::new();
                for schema in &schemas {
                    match tables.get(schema) {
                        Some(t) => out.extend(t.iter().cloned()),
                        None => return Err(ConsoleError::Connection(format!("no schema {schema}"))),
                    }
                }
                Ok(out)
            }
        }

        fn spawn(
            &self,
            request: AnalyzeRequest,
            log_tx: mpsc::UnboundedSender<String>,
            mut control_rx: mpsc::UnboundedReceiver<EngineControl>,
        ) -> JoinHandle<Result<(), ConsoleError>> {
            self.inner.spawned.fetch_add(1, Ordering::SeqCst);
            self.inner.requests.lock().unwrap().push(request);
            *self.inner.log_tx.lock().unwrap() = Some(log_tx.clone());
            let inner = self.inner.clone();
            tokio::spawn(async move {
                let script = inner.script.lock().unwrap().clone();
                for line in script {
                    let _ = log_tx.send(line);
                }
                loop {
                    tokio::select! {
                        biased;
                        ctrl = control_rx.recv() => match ctrl {
                            Some(EngineControl::Stop) => {
                                inner.stops.fetch_add(1, Ordering::SeqCst);
                                if !inner.ignore_stop.load(Ordering::SeqCst) {
                                    break;
                                }
                            }
                            None => {
                                inner.release.notified().await;
                                break;
                            }
                        },
                        _ = inner.release.notified() => break,
                    }
                }
                match inner.outcome.lock().unwrap().clone() {
                    Some(msg) => Err(ConsoleError::Engine(msg)),
                    None => Ok(()),
                }
            })
        }
    }
}
