use std::sync::Arc;
use std::sync::atomic::AtomicU64;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use lx_types::{EntryPool, StreamKind};

use crate::exec::{ProcessOutput, spawn_process};
use crate::{EntryReceiver, Result, Source};

/// Default container runtime binary
const DEFAULT_RUNTIME: &str = "docker";

/// Streams a container's logs through `<runtime> logs --timestamps`.
///
/// Both of the runtime's output channels are tagged as container logs. The
/// timestamp the runtime prefixes to each line becomes the entry timestamp.
pub struct ContainerSource {
    container: String,
    runtime: String,
    follow: bool,
    seq: Arc<AtomicU64>,
    pool: Option<EntryPool>,
}

impl ContainerSource {
    pub fn new(container: impl Into<String>, follow: bool) -> Self {
        Self {
            container: container.into(),
            runtime: DEFAULT_RUNTIME.to_string(),
            follow,
            seq: Arc::new(AtomicU64::new(0)),
            pool: None,
        }
    }

    /// Use another docker-compatible runtime (e.g. `podman`)
    pub fn with_runtime(mut self, runtime: impl Into<String>) -> Self {
        self.runtime = runtime.into();
        self
    }

    /// Build entries from a shared pool
    pub fn with_pool(mut self, pool: EntryPool) -> Self {
        self.pool = Some(pool);
        self
    }

    fn args(&self) -> Vec<String> {
        let mut args = vec!["logs".to_string()];
        if self.follow {
            args.push("--follow".to_string());
        }
        args.push("--timestamps".to_string());
        args.push(self.container.clone());
        args
    }
}

impl Source for ContainerSource {
    fn start(&self, cancel: CancellationToken) -> Result<EntryReceiver> {
        spawn_process(
            &self.runtime,
            &self.args(),
            ProcessOutput {
                source: self.name(),
                stdout: StreamKind::Container,
                stderr: StreamKind::Container,
                seq: Arc::clone(&self.seq),
                pool: self.pool.clone(),
                keep_raw: false,
                timestamps: Some(split_timestamp),
            },
            cancel,
        )
    }

    fn name(&self) -> String {
        format!("container:{}", self.container)
    }
}

/// Split the runtime's timestamp prefix from a log line.
///
/// Format: `2024-01-15T10:30:00.123456789Z message`. Lines without a valid
/// prefix are returned whole.
pub(crate) fn split_timestamp(line: &str) -> (Option<DateTime<Utc>>, &str) {
    // Shortest form is 2024-01-15T10:30:00Z (20 chars), nanoseconds make it 30
    if line.len() >= 20 {
        // Use get() to safely handle UTF-8 multi-byte chars at boundaries
        let search_end = floor_char_boundary(line, 36.min(line.len()));
        if let Some(end) = line.get(..search_end).and_then(|s| s.find(' ')) {
            if let Ok(ts) = DateTime::parse_from_rfc3339(&line[..end]) {
                return (Some(ts.with_timezone(&Utc)), &line[end + 1..]);
            }
        }
    }
    (None, line)
}

/// Find the largest valid char boundary <= the given byte index
fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    if idx >= s.len() {
        return s.len();
    }
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}
