// Mortar Build Automation
// Copyright (C) 2026 Mortar Contributors
//
// This program is licensed under the GPLv3.0 license (https://github.com/mortar-build/mortar/blob/main/COPYING)

use std::error::Error;
use std::fmt;
use std::io::{Read, Write};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc::{channel, Sender};
use std::thread;

/// A subprocess started by `TaskContext::call` exited with a non-zero code.
/// Carries the merged output captured from the child for post-mortem
/// reporting.
#[derive(Debug)]
pub struct SubprocessError {
    pub cmd: Vec<String>,
    pub code: i32,
    pub output: Vec<u8>,
}

impl Error for SubprocessError {}
impl fmt::Display for SubprocessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Command \"{}\" exited with code {}",
            self.cmd.join(" "),
            self.code
        )
    }
}

enum ChildMessage {
    Chunk(Vec<u8>),
    Done,
}

fn spawn_reader(mut stream: impl Read + Send + 'static, tx: Sender<ChildMessage>) {
    thread::spawn(move || {
        let mut buf = [0u8; 4096];
        loop {
            match stream.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if tx.send(ChildMessage::Chunk(buf[..n].to_vec())).is_err() {
                        break;
                    }
                }
            }
        }
        let _ = tx.send(ChildMessage::Done);
    });
}

/// Spawn `cmd` with stdout and stderr piped, merge the two streams in
/// arrival order, and hand each chunk to `on_chunk`.  When `stdin_data` is
/// given, it is written to the child's stdin, which is then closed.
pub(crate) fn run_streaming(
    cmd: &mut Command,
    stdin_data: Option<Vec<u8>>,
    on_chunk: &mut dyn FnMut(&[u8]),
) -> std::io::Result<ExitStatus> {
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    if stdin_data.is_some() {
        cmd.stdin(Stdio::piped());
    }

    let mut child = cmd.spawn()?;

    if let Some(data) = stdin_data {
        let mut stdin = child.stdin.take().expect("child stdin was requested");
        // The child may exit without draining its stdin
        let _ = stdin.write_all(&data);
    }

    let (tx, rx) = channel();
    spawn_reader(child.stdout.take().expect("child stdout was requested"), tx.clone());
    spawn_reader(child.stderr.take().expect("child stderr was requested"), tx);

    let mut streams_done = 0;
    while streams_done < 2 {
        match rx.recv() {
            Ok(ChildMessage::Chunk(chunk)) => on_chunk(&chunk),
            Ok(ChildMessage::Done) => streams_done += 1,
            Err(_) => break,
        }
    }

    child.wait()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn test_run_streaming_merges_stdout_and_stderr() {
        let mut cmd = Command::new("/bin/sh");
        cmd.args(["-c", "echo out; echo err 1>&2"]);
        let mut captured = Vec::new();
        let status = run_streaming(&mut cmd, None, &mut |chunk| {
            captured.extend_from_slice(chunk);
        })
        .unwrap();
        assert!(status.success());
        let text = String::from_utf8(captured).unwrap();
        assert!(text.contains("out"));
        assert!(text.contains("err"));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_streaming_feeds_stdin() {
        let mut cmd = Command::new("/bin/cat");
        let mut captured = Vec::new();
        let status = run_streaming(&mut cmd, Some(b"hello".to_vec()), &mut |chunk| {
            captured.extend_from_slice(chunk);
        })
        .unwrap();
        assert!(status.success());
        assert_eq!(captured, b"hello".to_vec());
    }
}
