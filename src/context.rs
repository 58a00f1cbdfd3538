// Mortar Build Automation
// Copyright (C) 2026 Mortar Contributors
//
// This program is licensed under the GPLv3.0 license (https://github.com/mortar-build/mortar/blob/main/COPYING)

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;

use crate::defines::{DefineStore, Value};
use crate::execute::job_io::{TaskIo, TaskIoWriter};
use crate::process::{run_streaming, SubprocessError};
use crate::subbuild::{self, SubbuildOptions};
use crate::task::Task;

/// Command-line arguments for `TaskContext::call`.  A single string is
/// split into words with POSIX shell rules; sequences of strings are used
/// verbatim.
pub trait CommandArgs {
    fn into_argv(self) -> anyhow::Result<Vec<String>>;
}

impl CommandArgs for &str {
    fn into_argv(self) -> anyhow::Result<Vec<String>> {
        Ok(shell_words::split(self)?)
    }
}

impl CommandArgs for String {
    fn into_argv(self) -> anyhow::Result<Vec<String>> {
        self.as_str().into_argv()
    }
}

impl<S: AsRef<str>> CommandArgs for Vec<S> {
    fn into_argv(self) -> anyhow::Result<Vec<String>> {
        Ok(self.into_iter().map(|s| s.as_ref().to_owned()).collect())
    }
}

impl<S: AsRef<str>> CommandArgs for &[S] {
    fn into_argv(self) -> anyhow::Result<Vec<String>> {
        Ok(self.iter().map(|s| s.as_ref().to_owned()).collect())
    }
}

impl<S: AsRef<str>, const N: usize> CommandArgs for [S; N] {
    fn into_argv(self) -> anyhow::Result<Vec<String>> {
        Ok(self.iter().map(|s| s.as_ref().to_owned()).collect())
    }
}

impl<S: AsRef<str>, const N: usize> CommandArgs for &[S; N] {
    fn into_argv(self) -> anyhow::Result<Vec<String>> {
        Ok(self.iter().map(|s| s.as_ref().to_owned()).collect())
    }
}

/// Options for `TaskContext::call_with`.
pub struct CallOptions {
    /// Stdin configuration for the child.  Defaults to null.
    pub stdin: Option<Stdio>,
    /// Run the command through the system shell.
    pub shell: bool,
    /// Return the exit code instead of failing on a non-zero exit.
    pub ignore_errors: bool,
    /// Discard the command's output instead of writing it to the task
    /// stream.
    pub silent: bool,
    /// Echo the command line to the task stream before running it.
    pub print_cmd: bool,
}

impl Default for CallOptions {
    fn default() -> CallOptions {
        CallOptions {
            stdin: None,
            shell: false,
            ignore_errors: false,
            silent: false,
            print_cmd: true,
        }
    }
}

/// The per-execution object handed to a task body.  Exposes the realized
/// input/output sets, the outdated subsets computed by change detection,
/// and helpers that route subprocess output through the task's private
/// output stream.
pub struct TaskContext {
    pub(crate) task: Arc<Task>,
    pub(crate) inputs: Vec<PathBuf>,
    pub(crate) outputs: Vec<PathBuf>,
    pub(crate) outdated_inputs: Vec<PathBuf>,
    pub(crate) outdated_outputs: Vec<PathBuf>,
    pub(crate) dependency_outputs: Vec<PathBuf>,
    pub(crate) defines: Arc<DefineStore>,
    pub(crate) io: Arc<TaskIo>,
}

impl TaskContext {
    pub fn name(&self) -> &str {
        self.task.name()
    }

    pub fn task(&self) -> &Task {
        &self.task
    }

    /// All realized input files, in declaration order.
    pub fn inputs(&self) -> &[PathBuf] {
        &self.inputs
    }

    /// All realized output files, in declaration order.
    pub fn outputs(&self) -> &[PathBuf] {
        &self.outputs
    }

    /// The inputs change detection found out of date.
    pub fn outdated_inputs(&self) -> &[PathBuf] {
        &self.outdated_inputs
    }

    /// The outputs change detection found out of date.
    pub fn outdated_outputs(&self) -> &[PathBuf] {
        &self.outdated_outputs
    }

    /// Outdated inputs zipped with their outdated outputs.
    pub fn outdated_pairs(&self) -> impl Iterator<Item = (&Path, &Path)> {
        self.outdated_inputs
            .iter()
            .map(PathBuf::as_path)
            .zip(self.outdated_outputs.iter().map(PathBuf::as_path))
    }

    /// The realized outputs of this task's immediate dependencies,
    /// concatenated in dependency order.
    pub fn dependency_outputs(&self) -> &[PathBuf] {
        &self.dependency_outputs
    }

    pub fn defines(&self) -> &DefineStore {
        &self.defines
    }

    pub fn get_define(&self, name: &str) -> Option<&Value> {
        self.defines.get(name)
    }

    /// Write a line to the task's output stream.
    pub fn print(&self, text: impl AsRef<str>) {
        self.io.append_line(text.as_ref());
    }

    /// An `io::Write` handle over the task's output stream.
    pub fn writer(&self) -> TaskIoWriter<'_> {
        self.io.writer()
    }

    /// Run a subprocess, writing its merged stdout and stderr to the task's
    /// output stream.  Fails on a non-zero exit.
    pub fn call<A: CommandArgs>(&self, argv: A) -> anyhow::Result<i32> {
        self.call_with(argv, CallOptions::default())
    }

    /// Run a subprocess with explicit options.  Returns the exit code.
    pub fn call_with<A: CommandArgs>(&self, argv: A, opts: CallOptions) -> anyhow::Result<i32> {
        let argv = argv.into_argv()?;
        if argv.is_empty() {
            return Err(anyhow::anyhow!("No command given"));
        }

        if opts.print_cmd {
            self.print(argv.join(" "));
        }

        let mut cmd = if opts.shell {
            let mut cmd = shell_command();
            cmd.arg(argv.join(" "));
            cmd
        } else {
            let mut cmd = Command::new(&argv[0]);
            cmd.args(&argv[1..]);
            cmd
        };
        cmd.stdin(opts.stdin.unwrap_or_else(Stdio::null));

        let mut captured: Vec<u8> = Vec::new();
        let status = {
            let captured = &mut captured;
            run_streaming(&mut cmd, None, &mut |chunk| {
                captured.extend_from_slice(chunk);
                if !opts.silent {
                    self.io.append(chunk);
                }
            })
        }
        .map_err(|e| {
            anyhow::anyhow!("Error executing command \"{}\": {}", argv.join(" "), e)
        })?;

        let code = status.code().unwrap_or(-1);
        if code != 0 && !opts.ignore_errors {
            return Err(SubprocessError {
                cmd: argv,
                code,
                output: captured,
            }
            .into());
        }
        Ok(code)
    }

    /// Run another build script, forwarding its output into this task's
    /// output stream.  The child starts with this process's defines.
    pub fn subbuild<P, I, S>(&self, script: P, args: I) -> anyhow::Result<i32>
    where
        P: AsRef<Path>,
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.subbuild_with(
            script,
            args,
            SubbuildOptions {
                exit_on_error: false,
                ..SubbuildOptions::default()
            },
        )
    }

    /// Run another build script with explicit options.
    pub fn subbuild_with<P, I, S>(
        &self,
        script: P,
        args: I,
        opts: SubbuildOptions,
    ) -> anyhow::Result<i32>
    where
        P: AsRef<Path>,
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut writer = self.io.writer();
        subbuild::subbuild(script, args, &self.defines, &mut writer, opts)
    }
}

#[cfg(windows)]
fn shell_command() -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C");
    cmd
}

#[cfg(not(windows))]
fn shell_command() -> Command {
    let mut cmd = Command::new("/bin/sh");
    cmd.arg("-c");
    cmd
}
