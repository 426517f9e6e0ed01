use std::sync::Arc;
use std::sync::atomic::AtomicU64;

use parking_lot::Mutex;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use lx_types::{EntryPool, StreamKind};

use crate::reader::StreamReader;
use crate::{CHANNEL_CAPACITY, EntryReceiver, Result, Source, SourceError};

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Reads lines from standard input (pipe mode).
///
/// The input can only be consumed once, so a second `start` fails.
pub struct StdinSource {
    name: String,
    reader: Mutex<Option<BoxedReader>>,
    seq: Arc<AtomicU64>,
    pool: Option<EntryPool>,
}

impl StdinSource {
    pub fn new() -> Self {
        Self::from_reader("stdin", tokio::io::stdin())
    }

    /// Read from any byte stream, tagging entries as stdin
    pub fn from_reader<R>(name: impl Into<String>, reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self {
            name: name.into(),
            reader: Mutex::new(Some(Box::new(reader))),
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

impl Default for StdinSource {
    fn default() -> Self {
        Self::new()
    }
}

impl Source for StdinSource {
    fn start(&self, cancel: CancellationToken) -> Result<EntryReceiver> {
        let reader = self
            .reader
            .lock()
            .take()
            .ok_or_else(|| SourceError::AlreadyStarted(self.name()))?;

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        StreamReader {
            stream: StreamKind::Stdin,
            source: self.name(),
            seq: Arc::clone(&self.seq),
            tx,
            pool: self.pool.clone(),
            keep_raw: true,
            timestamps: None,
        }
        .spawn(reader, cancel, false);

        Ok(rx)
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn test_reads_lines_with_raw_bytes() {
        let source = StdinSource::from_reader("stdin", Cursor::new(b"alpha\nbeta\n".to_vec()));
        let mut rx = source.start(CancellationToken::new()).unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.stream, StreamKind::Stdin);
        assert_eq!(first.message, "alpha");
        assert_eq!(first.raw, b"alpha");
        assert_eq!(first.seq, 1);

        let second = rx.recv().await.unwrap();
        assert_eq!(second.seq, 2);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_second_start_fails() {
        let source = StdinSource::from_reader("stdin", Cursor::new(Vec::new()));
        let _rx = source.start(CancellationToken::new()).unwrap();
        let err = source.start(CancellationToken::new()).unwrap_err();
        assert!(matches!(err, SourceError::AlreadyStarted(name) if name == "stdin"));
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_replaced_but_raw_is_kept() {
        let source = StdinSource::from_reader("stdin", Cursor::new(vec![b'o', b'k', 0xff, b'\n']));
        let mut rx = source.start(CancellationToken::new()).unwrap();

        let entry = rx.recv().await.unwrap();
        assert_eq!(entry.message, "ok\u{fffd}");
        assert_eq!(entry.raw, vec![b'o', b'k', 0xff]);
    }
}
