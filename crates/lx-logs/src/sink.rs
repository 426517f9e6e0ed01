use std::io;

use lx_types::LogEntry;

/// Output consumer driven by the pipeline.
///
/// Entries arrive in order through `write`. `flush` and `close` are called
/// exactly once each when the pipeline drains, even after a failure.
pub trait Sink: Send {
    fn write(&mut self, entry: &LogEntry) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()>;

    fn close(&mut self) -> io::Result<()>;

    fn name(&self) -> String;
}

impl<S: Sink + ?Sized> Sink for Box<S> {
    fn write(&mut self, entry: &LogEntry) -> io::Result<()> {
        (**self).write(entry)
    }

    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }

    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }

    fn name(&self) -> String {
        (**self).name()
    }
}
