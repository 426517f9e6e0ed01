use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use lx_logs::Sink;
use lx_types::LogEntry;

use super::{OutputFormat, render};

/// Appends entries to a file, synced to disk on flush
pub struct FileSink {
    path: PathBuf,
    out: BufWriter<File>,
    format: OutputFormat,
}

impl FileSink {
    pub fn open(path: impl AsRef<Path>, format: OutputFormat) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            out: BufWriter::new(file),
            format,
        })
    }
}

impl Sink for FileSink {
    fn write(&mut self, entry: &LogEntry) -> io::Result<()> {
        let line = render(entry, self.format)?;
        writeln!(self.out, "{line}")
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()?;
        self.out.get_ref().sync_all()
    }

    fn close(&mut self) -> io::Result<()> {
        self.out.flush()
    }

    fn name(&self) -> String {
        format!("file:{}", self.path.display())
    }
}
