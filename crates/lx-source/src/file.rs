use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use lx_types::{EntryPool, StreamKind};

use crate::reader::StreamReader;
use crate::{CHANNEL_CAPACITY, EntryReceiver, Result, Source, SourceError};

/// Reads a file, optionally following appended lines like `tail -f`.
///
/// Following polls for new data every 100ms after end-of-file. Truncation and
/// rotation are not detected: a replaced file keeps being read through the
/// original handle.
pub struct FileSource {
    path: PathBuf,
    follow: bool,
    seq: Arc<AtomicU64>,
    pool: Option<EntryPool>,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>, follow: bool) -> Self {
        Self {
            path: path.into(),
            follow,
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

impl Source for FileSource {
    fn start(&self, cancel: CancellationToken) -> Result<EntryReceiver> {
        let file = std::fs::File::open(&self.path).map_err(|source| SourceError::Open {
            path: self.path.clone(),
            source,
        })?;

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        StreamReader {
            stream: StreamKind::File,
            source: self.name(),
            seq: Arc::clone(&self.seq),
            tx,
            pool: self.pool.clone(),
            keep_raw: true,
            timestamps: None,
        }
        .spawn(tokio::fs::File::from_std(file), cancel, self.follow);

        Ok(rx)
    }

    fn name(&self) -> String {
        format!("file:{}", self.path.display())
    }
}
