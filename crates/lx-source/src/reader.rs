use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use lx_types::{EntryPool, LogEntry, StreamKind};

/// Initial size of a reader's line buffer
pub const INITIAL_LINE_CAPACITY: usize = 64 * 1024;

/// Longest accepted line; a longer line ends its reader with a warning
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Delay between end-of-file checks of a followed file
pub(crate) const FOLLOW_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Splits a leading timestamp off a line, returning the remaining message
pub(crate) type TimestampParser = fn(&str) -> (Option<DateTime<Utc>>, &str);

/// Newline-delimited reader with a hard line-length cap.
///
/// Bytes after the last newline stay pending across calls, so a line that is
/// still being written is only returned once it is complete.
pub(crate) struct LineReader<R> {
    inner: BufReader<R>,
    pending: Vec<u8>,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub(crate) fn new(reader: R) -> Self {
        Self {
            inner: BufReader::with_capacity(INITIAL_LINE_CAPACITY, reader),
            pending: Vec::new(),
        }
    }

    /// Next complete line without its line ending, or `None` at end of input
    pub(crate) async fn next_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        let budget = (MAX_LINE_BYTES + 1).saturating_sub(self.pending.len()) as u64;
        (&mut self.inner)
            .take(budget)
            .read_until(b'\n', &mut self.pending)
            .await?;

        if self.pending.last() == Some(&b'\n') {
            let mut line = std::mem::take(&mut self.pending);
            trim_line_ending(&mut line);
            return Ok(Some(line));
        }

        if self.pending.len() > MAX_LINE_BYTES {
            self.pending.clear();
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("line exceeds {MAX_LINE_BYTES} bytes"),
            ));
        }

        Ok(None)
    }

    /// Unterminated bytes left at end of input
    pub(crate) fn take_partial(&mut self) -> Option<Vec<u8>> {
        if self.pending.is_empty() {
            None
        } else {
            let mut line = std::mem::take(&mut self.pending);
            trim_line_ending(&mut line);
            Some(line)
        }
    }
}

fn trim_line_ending(line: &mut Vec<u8>) {
    if line.last() == Some(&b'\n') {
        line.pop();
    }
    if line.last() == Some(&b'\r') {
        line.pop();
    }
}

/// One reader task's view of its source
pub(crate) struct StreamReader {
    pub stream: StreamKind,
    pub source: String,
    pub seq: Arc<AtomicU64>,
    pub tx: mpsc::Sender<LogEntry>,
    pub pool: Option<EntryPool>,
    pub keep_raw: bool,
    pub timestamps: Option<TimestampParser>,
}

impl StreamReader {
    /// Spawn the read loop for one input stream
    pub(crate) fn spawn<R>(
        self,
        reader: R,
        cancel: CancellationToken,
        follow: bool,
    ) -> tokio::task::JoinHandle<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        tokio::spawn(self.run(reader, cancel, follow))
    }

    async fn run<R: AsyncRead + Unpin>(self, reader: R, cancel: CancellationToken, follow: bool) {
        let mut lines = LineReader::new(reader);
        let mut sent: u64 = 0;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = lines.next_line() => next,
            };

            match next {
                Ok(Some(line)) => {
                    if !self.send(line, &cancel).await {
                        break;
                    }
                    sent += 1;
                }
                Ok(None) if follow => {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(FOLLOW_POLL_INTERVAL) => {}
                    }
                }
                Ok(None) => {
                    if let Some(rest) = lines.take_partial() {
                        if self.send(rest, &cancel).await {
                            sent += 1;
                        }
                    }
                    break;
                }
                Err(err) => {
                    tracing::warn!(
                        source = %self.source,
                        stream = %self.stream,
                        error = %err,
                        "stopped reading stream"
                    );
                    break;
                }
            }
        }

        tracing::debug!(source = %self.source, stream = %self.stream, lines = sent, "reader finished");
    }

    /// Returns false once the receiver is gone or cancellation fired
    async fn send(&self, line: Vec<u8>, cancel: &CancellationToken) -> bool {
        let entry = self.build_entry(line);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            sent = self.tx.send(entry) => sent.is_ok(),
        }
    }

    fn build_entry(&self, line: Vec<u8>) -> LogEntry {
        let mut entry = match &self.pool {
            Some(pool) => pool.acquire(),
            None => LogEntry::default(),
        };

        let text = String::from_utf8_lossy(&line);
        match self.timestamps {
            Some(parse) => {
                let (timestamp, message) = parse(&text);
                entry.timestamp = timestamp.unwrap_or_else(Utc::now);
                entry.message.push_str(message);
            }
            None => {
                entry.timestamp = Utc::now();
                entry.message.push_str(&text);
            }
        }

        if self.keep_raw {
            entry.raw.extend_from_slice(&line);
        }
        entry.stream = self.stream;
        entry.source.push_str(&self.source);
        entry.seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        entry
    }
}
