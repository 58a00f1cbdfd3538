// Mortar Build Automation
// Copyright (C) 2026 Mortar Contributors
//
// This program is licensed under the GPLv3.0 license (https://github.com/mortar-build/mortar/blob/main/COPYING)

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

/// The engine's combined output stream.  The mutex is held only while a
/// completed task's buffer is flushed, so flushes from different tasks
/// never interleave.
pub type SharedSink = Arc<Mutex<Box<dyn Write + Send>>>;

pub fn stdout_sink() -> SharedSink {
    sink_from(Box::new(io::stdout()))
}

pub fn sink_from(writer: Box<dyn Write + Send>) -> SharedSink {
    Arc::new(Mutex::new(writer))
}

/// Write one task's completed buffer to the sink as a single contiguous
/// block.
pub fn flush_output(sink: &SharedSink, output: &[u8]) {
    if output.is_empty() {
        return;
    }
    let mut sink = sink.lock().unwrap();
    sink.write_all(output)
        .and_then(|_| sink.flush())
        .expect("failed to write task output");
}

/// A task execution's private output buffer.  Everything a task prints,
/// including subprocess output, lands here and is flushed to the shared
/// sink in one piece when the task completes.
pub struct TaskIo {
    buffer: Mutex<Vec<u8>>,
}

impl TaskIo {
    pub fn new() -> TaskIo {
        TaskIo {
            buffer: Mutex::new(Vec::new()),
        }
    }

    pub fn append(&self, bytes: &[u8]) {
        self.buffer.lock().unwrap().extend_from_slice(bytes);
    }

    pub fn append_line(&self, line: &str) {
        let mut buffer = self.buffer.lock().unwrap();
        buffer.extend_from_slice(line.as_bytes());
        buffer.push(b'\n');
    }

    pub fn take(&self) -> Vec<u8> {
        std::mem::take(&mut *self.buffer.lock().unwrap())
    }

    pub fn writer(&self) -> TaskIoWriter<'_> {
        TaskIoWriter { io: self }
    }
}

impl Default for TaskIo {
    fn default() -> TaskIo {
        TaskIo::new()
    }
}

/// `io::Write` adapter over a task buffer.
pub struct TaskIoWriter<'a> {
    io: &'a TaskIo,
}

impl Write for TaskIoWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.io.append(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
