// Log sink - Append-only persistence of sealed received lines
use crate::core::lines::{LineEvent, LineTag};
use crate::core::session::LineSink;
use crate::domain::error::TermResult;
use std::fs::{File, OpenOptions};
use std::io::{LineWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Appends the text of every sealed received line to a file. Echoed
/// commands are not logged.
///
/// Write failures are logged once and otherwise ignored; losing the log never
/// interrupts the session.
#[derive(Debug)]
pub struct LineLogger {
    path: PathBuf,
    writer: LineWriter<File>,
    failed: bool,
}

impl LineLogger {
    pub fn open(path: impl AsRef<Path>) -> TermResult<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        debug!("Logging lines to {}", path.display());

        Ok(Self {
            path,
            writer: LineWriter::new(file),
            failed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_line(&mut self, text: &str) {
        if let Err(e) = writeln!(self.writer, "{}", text) {
            if !self.failed {
                warn!("Failed to write line log {}: {}", self.path.display(), e);
                self.failed = true;
            }
        } else {
            self.failed = false;
        }
    }
}

impl LineSink for LineLogger {
    fn line_event(&mut self, event: &LineEvent) {
        if let LineEvent::Sealed(record) = event {
            if record.tag == LineTag::Received {
                self.write_line(&record.text);
            }
        }
    }
}
