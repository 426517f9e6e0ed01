use std::io::{self, LineWriter, Stdout, Write};

use lx_logs::Sink;
use lx_types::LogEntry;

/// JSON Lines output, one object per entry
pub struct JsonSink<W: Write + Send = Stdout> {
    out: LineWriter<W>,
}

impl JsonSink {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> JsonSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            out: LineWriter::new(writer),
        }
    }
}

impl<W: Write + Send> Sink for JsonSink<W> {
    fn write(&mut self, entry: &LogEntry) -> io::Result<()> {
        let line = entry.to_json_line().map_err(io::Error::other)?;
        writeln!(self.out, "{line}")
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }

    fn close(&mut self) -> io::Result<()> {
        self.out.flush()
    }

    fn name(&self) -> String {
        "json".to_string()
    }
}
