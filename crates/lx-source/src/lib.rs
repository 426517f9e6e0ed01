//! Log sources for lx
//!
//! Every source turns an external feed into an ordered stream of
//! [`LogEntry`] values. Reader tasks run one per physical input stream and
//! all feed a single bounded channel, so a slow consumer throttles the
//! readers instead of growing memory.

mod container;
mod error;
mod exec;
mod file;
mod reader;
mod stdin;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub use container::ContainerSource;
pub use error::{Result, SourceError};
pub use exec::ExecSource;
pub use file::FileSource;
pub use reader::{INITIAL_LINE_CAPACITY, MAX_LINE_BYTES};
pub use stdin::StdinSource;

// Re-export types used in our public API
pub use lx_types::{EntryPool, LogEntry, LogLevel, StreamKind};

/// Capacity of the intake channel shared by a source's reader tasks
pub const CHANNEL_CAPACITY: usize = 256;

/// Receiving end of a started source
pub type EntryReceiver = mpsc::Receiver<LogEntry>;

/// A producer of log entries.
///
/// `start` opens pipes, files or processes synchronously and reports any
/// failure before a single task is spawned. The returned channel closes once
/// the input is exhausted or `cancel` fires, and only after every reader
/// task has exited. Must be called from within a tokio runtime.
pub trait Source: Send + Sync {
    fn start(&self, cancel: CancellationToken) -> Result<EntryReceiver>;

    /// Human-readable identifier, also used as the entries' `source`
    fn name(&self) -> String;
}

impl<S: Source + ?Sized> Source for Box<S> {
    fn start(&self, cancel: CancellationToken) -> Result<EntryReceiver> {
        (**self).start(cancel)
    }

    fn name(&self) -> String {
        (**self).name()
    }
}
