// Mortar Build Automation
// Copyright (C) 2026 Mortar Contributors
//
// This program is licensed under the GPLv3.0 license (https://github.com/mortar-build/mortar/blob/main/COPYING)

use std::error::Error;
use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

use crate::defines::DefineStore;
use crate::process::run_streaming;
use crate::returncodes;

/// Depth of this process in the chain of nested build-script invocations.
/// Set once by `program::init`; a process that never initializes spawns
/// children at depth 0.
static DEPTH: OnceLock<usize> = OnceLock::new();

pub(crate) fn init_depth(depth: usize) {
    let _ = DEPTH.set(depth);
}

/// The nesting depth of the running build script.  The top-level script is
/// at depth 0; each `subbuild` boundary adds 1.
pub fn subbuild_depth() -> usize {
    DEPTH.get().copied().unwrap_or(0)
}

fn child_depth() -> usize {
    match DEPTH.get() {
        Some(depth) => depth + 1,
        None => 0,
    }
}

/// Options for a `subbuild` invocation.
pub struct SubbuildOptions {
    /// Discard all child output.
    pub silent: bool,
    /// Return the child's exit code instead of failing on a non-zero exit.
    pub ignore_errors: bool,
    /// On a non-zero exit, dump the captured child output to stderr and
    /// terminate this process with the `SUBBUILD_EXCEPTION` return code.
    /// Ignored when `ignore_errors` is set.
    pub exit_on_error: bool,
    /// Buffer the child's output to completion and write it to the sink as
    /// one chunk, instead of forwarding it live.
    pub collect_output: bool,
}

impl Default for SubbuildOptions {
    fn default() -> SubbuildOptions {
        SubbuildOptions {
            silent: false,
            ignore_errors: false,
            exit_on_error: true,
            collect_output: false,
        }
    }
}

/// A child build script exited with a non-zero code.  Carries the child's
/// captured output for post-mortem dumping.
#[derive(Debug)]
pub struct SubbuildError {
    pub cmd: Vec<String>,
    pub code: i32,
    pub output: Vec<u8>,
}

impl Error for SubbuildError {}
impl fmt::Display for SubbuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Build script \"{}\" exited with code {}",
            self.cmd.first().map(String::as_str).unwrap_or("<none>"),
            self.code
        )
    }
}

impl SubbuildError {
    /// Write a report of the failure, including the child's captured
    /// output, to `w`.
    pub fn write_info(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(w, "{}", self)?;
        writeln!(w, "command: {}", self.cmd.join(" "))?;
        writeln!(w, "--- captured output ---")?;
        w.write_all(&self.output)?;
        if !self.output.ends_with(b"\n") {
            writeln!(w)?;
        }
        writeln!(w, "--- end captured output ---")
    }
}

pub(crate) fn build_child_args(
    script: &Path,
    script_dir: &Path,
    cwd: &Path,
    depth: usize,
    user_args: &[String],
) -> Vec<String> {
    let mut args = vec![
        script.display().to_string(),
        String::from("--_subbuild_depth"),
        depth.to_string(),
        String::from("--stdin-defines"),
    ];
    if script_dir != cwd {
        args.push(String::from("--directory"));
        args.push(script_dir.display().to_string());
    }
    args.extend(user_args.iter().cloned());
    args
}

/// Run another build script as a child process.
///
/// The current define store is serialized to the child's stdin, so the
/// child starts with the same defines as this process.  The child's stdout
/// and stderr are merged and routed to `sink` according to the options.
/// Returns the child's exit code; a non-zero exit is an error unless
/// `ignore_errors` is set.
pub fn subbuild<P, I, S>(
    script: P,
    args: I,
    defines: &DefineStore,
    sink: &mut dyn Write,
    opts: SubbuildOptions,
) -> anyhow::Result<i32>
where
    P: AsRef<Path>,
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let script = script.as_ref();
    if !script.is_file() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("Build script \"{}\" does not exist.", script.display()),
        )
        .into());
    }

    let script_abs = dunce::canonicalize(script)?;
    let script_dir = script_abs
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let cwd = dunce::canonicalize(std::env::current_dir()?)?;

    let user_args: Vec<String> = args
        .into_iter()
        .map(|a| a.as_ref().to_owned())
        .collect();
    let argv = build_child_args(script, &script_dir, &cwd, child_depth(), &user_args);

    let mut cmd = Command::new(script);
    cmd.args(&argv[1..]);

    let mut stdin_data = defines.serialize().into_bytes();
    stdin_data.push(b'\n');

    let mut captured: Vec<u8> = Vec::new();
    let live = !opts.silent && !opts.collect_output;
    let status = {
        let captured = &mut captured;
        run_streaming(&mut cmd, Some(stdin_data), &mut |chunk| {
            captured.extend_from_slice(chunk);
            if live {
                let _ = sink.write_all(chunk);
            }
        })?
    };

    if opts.collect_output && !opts.silent {
        sink.write_all(&captured)?;
    }

    let code = status.code().unwrap_or(-1);
    if code != 0 && !opts.ignore_errors {
        let error = SubbuildError {
            cmd: argv,
            code,
            output: captured,
        };
        if opts.exit_on_error {
            let stderr = io::stderr();
            let _ = error.write_info(&mut stderr.lock());
            std::process::exit(returncodes::SUBBUILD_EXCEPTION as i32);
        }
        return Err(error.into());
    }

    Ok(code)
}
