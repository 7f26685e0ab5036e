use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

/// Destination for backup output lines.
pub trait LineSink: Send {
    fn write_line(&mut self, line: &str);
}

/// Handle to a sink shared by concurrent writers. Every write goes through
/// one lock per sink, so interleaved reader tasks never corrupt a line.
#[derive(Clone)]
pub struct SharedSink {
    inner: Arc<Mutex<Box<dyn LineSink>>>,
}

impl SharedSink {
    pub fn new(sink: impl LineSink + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(sink))),
        }
    }

    pub fn write_line(&self, line: &str) {
        self.inner.lock().write_line(line);
    }
}

/// Bounded in-memory sink. Clones share one buffer, so a handle kept by
/// the host can read back what the orchestrator wrote.
#[derive(Clone)]
pub struct MemorySink {
    buffer: Arc<Mutex<VecDeque<String>>>,
    max_lines: usize,
}

impl MemorySink {
    pub fn new(max_lines: usize) -> Self {
        Self {
            buffer: Arc::new(Mutex::new(VecDeque::with_capacity(max_lines))),
            max_lines,
        }
    }

    pub fn lines(&self) -> Vec<String> {
        self.buffer.lock().iter().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.lock().is_empty()
    }

    pub fn clear(&self) {
        self.buffer.lock().clear();
    }
}

impl LineSink for MemorySink {
    fn write_line(&mut self, line: &str) {
        let mut buffer = self.buffer.lock();
        if buffer.len() >= self.max_lines {
            buffer.pop_front();
        }
        buffer.push_back(line.to_string());
    }
}

/// Appends lines to a log file, flushed per line.
pub struct FileSink {
    writer: BufWriter<File>,
}

impl FileSink {
    pub fn create(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }
}

impl LineSink for FileSink {
    fn write_line(&mut self, line: &str) {
        // a full disk must not take down the copy readers
        let _ = writeln!(self.writer, "{}", line);
        let _ = self.writer.flush();
    }
}

/// Echoes lines through tracing.
pub struct ConsoleSink;

impl LineSink for ConsoleSink {
    fn write_line(&mut self, line: &str) {
        info!("{}", line);
    }
}

/// Duplicates every line into each attached sink.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Box<dyn LineSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl LineSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }
}

impl LineSink for FanoutSink {
    fn write_line(&mut self, line: &str) {
        for sink in &mut self.sinks {
            sink.write_line(line);
        }
    }
}
