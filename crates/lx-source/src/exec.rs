use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;

use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use lx_types::{EntryPool, StreamKind};

use crate::reader::{StreamReader, TimestampParser};
use crate::{CHANNEL_CAPACITY, EntryReceiver, Result, Source, SourceError};

/// Runs a command and streams its stdout and stderr
pub struct ExecSource {
    command: String,
    args: Vec<String>,
    seq: Arc<AtomicU64>,
    pool: Option<EntryPool>,
}

impl ExecSource {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            seq: Arc::new(AtomicU64::new(0)),
            pool: None,
        }
    }

    /// Build entries from a shared pool
    pub fn with_pool(mut self, pool: EntryPool) -> Self {
        self.pool = Some(pool);
        self
    }
}

impl Source for ExecSource {
    fn start(&self, cancel: CancellationToken) -> Result<EntryReceiver> {
        spawn_process(
            &self.command,
            &self.args,
            ProcessOutput {
                source: self.name(),
                stdout: StreamKind::Stdout,
                stderr: StreamKind::Stderr,
                seq: Arc::clone(&self.seq),
                pool: self.pool.clone(),
                keep_raw: true,
                timestamps: None,
            },
            cancel,
        )
    }

    fn name(&self) -> String {
        format!("exec:{}", self.command)
    }
}

/// How a spawned process's two output pipes become entries
pub(crate) struct ProcessOutput {
    pub source: String,
    pub stdout: StreamKind,
    pub stderr: StreamKind,
    pub seq: Arc<AtomicU64>,
    pub pool: Option<EntryPool>,
    pub keep_raw: bool,
    pub timestamps: Option<TimestampParser>,
}

/// Spawn `program`, read both pipes concurrently and close the channel only
/// after both readers finished and the child was waited on.
pub(crate) fn spawn_process(
    program: &str,
    args: &[String],
    output: ProcessOutput,
    cancel: CancellationToken,
) -> Result<EntryReceiver> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| SourceError::Spawn {
            command: program.to_string(),
            source,
        })?;

    let stdout = child.stdout.take().ok_or_else(|| SourceError::Pipe {
        command: program.to_string(),
        stream: "stdout",
    })?;
    let stderr = child.stderr.take().ok_or_else(|| SourceError::Pipe {
        command: program.to_string(),
        stream: "stderr",
    })?;

    tracing::debug!(command = program, pid = child.id(), "spawned process");

    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let reader = |stream: StreamKind| StreamReader {
        stream,
        source: output.source.clone(),
        seq: Arc::clone(&output.seq),
        tx: tx.clone(),
        pool: output.pool.clone(),
        keep_raw: output.keep_raw,
        timestamps: output.timestamps,
    };
    let readers = vec![
        reader(output.stdout).spawn(stdout, cancel.clone(), false),
        reader(output.stderr).spawn(stderr, cancel.clone(), false),
    ];

    let source = output.source;
    tokio::spawn(async move {
        futures::future::join_all(readers).await;

        if cancel.is_cancelled() {
            if let Err(err) = child.start_kill() {
                tracing::debug!(source = %source, error = %err, "process already gone");
            }
        }

        match child.wait().await {
            Ok(status) => tracing::debug!(source = %source, %status, "process exited"),
            Err(err) => tracing::warn!(source = %source, error = %err, "failed to wait for process"),
        }

        // The receiver sees the end of the stream only now
        drop(tx);
    });

    Ok(rx)
}
