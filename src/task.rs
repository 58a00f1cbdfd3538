// Mortar Build Automation
// Copyright (C) 2026 Mortar Contributors
//
// This program is licensed under the GPLv3.0 license (https://github.com/mortar-build/mortar/blob/main/COPYING)

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::context::TaskContext;

pub type ProducerFn = dyn Fn() -> anyhow::Result<Vec<PathBuf>> + Send + Sync;
pub type TransformerFn = dyn Fn(&[PathBuf]) -> Vec<PathBuf> + Send + Sync;

/// Handle for a registered task, usable wherever a task name is accepted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TaskHandle(pub(crate) usize);

/// A reference to a task, by name or by handle.  Name references may point
/// at tasks that are registered later; they are resolved when a run starts.
#[derive(Clone, Debug)]
pub enum TaskRef {
    Name(Arc<str>),
    Handle(TaskHandle),
}

impl From<&str> for TaskRef {
    fn from(name: &str) -> TaskRef {
        TaskRef::Name(Arc::from(name))
    }
}

impl From<&String> for TaskRef {
    fn from(name: &String) -> TaskRef {
        TaskRef::Name(Arc::from(name.as_str()))
    }
}

impl From<String> for TaskRef {
    fn from(name: String) -> TaskRef {
        TaskRef::Name(Arc::from(name.as_str()))
    }
}

impl From<TaskHandle> for TaskRef {
    fn from(handle: TaskHandle) -> TaskRef {
        TaskRef::Handle(handle)
    }
}

impl fmt::Display for TaskRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskRef::Name(name) => write!(f, "{}", name),
            TaskRef::Handle(handle) => write!(f, "task #{}", handle.0),
        }
    }
}

/// The work a task performs.  Bodies that need the realized input/output
/// sets or the subprocess helpers take a `TaskContext`.
pub enum TaskBody {
    Nullary(Box<dyn Fn() -> anyhow::Result<()> + Send + Sync>),
    Contextual(Box<dyn Fn(&TaskContext) -> anyhow::Result<()> + Send + Sync>),
}

/// An input file specifier: a literal path, or a producer evaluated when
/// the task executes.
pub enum InputSpec {
    Literal(PathBuf),
    Producer(Box<ProducerFn>),
}

impl InputSpec {
    pub fn producer<F>(f: F) -> InputSpec
    where
        F: Fn() -> anyhow::Result<Vec<PathBuf>> + Send + Sync + 'static,
    {
        InputSpec::Producer(Box::new(f))
    }
}

/// An output file specifier: a literal path, a producer, or a transformer
/// applied to the realized input list.
pub enum OutputSpec {
    Literal(PathBuf),
    Producer(Box<ProducerFn>),
    Transformer(Box<TransformerFn>),
}

impl OutputSpec {
    pub fn producer<F>(f: F) -> OutputSpec
    where
        F: Fn() -> anyhow::Result<Vec<PathBuf>> + Send + Sync + 'static,
    {
        OutputSpec::Producer(Box::new(f))
    }

    pub fn transformer<F>(f: F) -> OutputSpec
    where
        F: Fn(&[PathBuf]) -> Vec<PathBuf> + Send + Sync + 'static,
    {
        OutputSpec::Transformer(Box::new(f))
    }
}

macro_rules! path_spec_from {
    ($spec:ident, $from:ty) => {
        impl From<$from> for $spec {
            fn from(path: $from) -> $spec {
                $spec::Literal(PathBuf::from(path))
            }
        }
    };
}

path_spec_from!(InputSpec, &str);
path_spec_from!(InputSpec, String);
path_spec_from!(InputSpec, &Path);
path_spec_from!(InputSpec, PathBuf);
path_spec_from!(OutputSpec, &str);
path_spec_from!(OutputSpec, String);
path_spec_from!(OutputSpec, &Path);
path_spec_from!(OutputSpec, PathBuf);

/// A deferred file glob.  The expression is not evaluated until the task
/// executes, so files created by dependencies are picked up.
pub struct Glob {
    expression: String,
}

/// Collect input files with a unix-style glob expression:
///
/// ```no_run
/// # use mortar::{glob, pattern, Engine};
/// # let mut pk = Engine::new();
/// pk.task("build_c")
///     .inputs([glob("src/*.c")])
///     .outputs([pattern("obj/%.o")])
///     .register(|ctx| {
///         for (i, o) in ctx.outdated_pairs() {
///             ctx.call(format!("gcc -c {} -o {}", i.display(), o.display()).as_str())?;
///         }
///         Ok(())
///     })
///     .unwrap();
/// ```
pub fn glob(expression: &str) -> Glob {
    Glob {
        expression: expression.to_owned(),
    }
}

fn run_glob(expression: &str) -> anyhow::Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in glob::glob(expression)? {
        paths.push(entry?);
    }
    Ok(paths)
}

impl From<Glob> for InputSpec {
    fn from(g: Glob) -> InputSpec {
        InputSpec::producer(move || run_glob(&g.expression))
    }
}

impl From<Glob> for OutputSpec {
    fn from(g: Glob) -> OutputSpec {
        OutputSpec::producer(move || run_glob(&g.expression))
    }
}

/// A substitution pattern used in place of literal output files.  For each
/// realized input, `%` is replaced with the input's file stem, `{dir}` with
/// its parent directory, and `{ext}` with its extension (including the dot).
pub struct Pattern {
    pattern: String,
}

pub fn pattern(file_pattern: &str) -> Pattern {
    Pattern {
        pattern: file_pattern.to_owned(),
    }
}

impl Pattern {
    fn apply(&self, input: &Path) -> PathBuf {
        let dir = input
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ext = input
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        PathBuf::from(
            self.pattern
                .replace("{dir}", &dir)
                .replace('%', &stem)
                .replace("{ext}", &ext),
        )
    }
}

impl From<Pattern> for OutputSpec {
    fn from(p: Pattern) -> OutputSpec {
        OutputSpec::transformer(move |inputs| inputs.iter().map(|i| p.apply(i)).collect())
    }
}

/// A registered unit of work: a body plus declared inputs, outputs and
/// dependencies.
pub struct Task {
    pub(crate) name: Arc<str>,
    pub(crate) body: TaskBody,
    pub(crate) inputs: Vec<InputSpec>,
    pub(crate) outputs: Vec<OutputSpec>,
    pub(crate) deps: Vec<TaskRef>,
    pub(crate) doc: Option<String>,
}

impl Task {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn name_arc(&self) -> Arc<str> {
        self.name.clone()
    }

    pub fn doc(&self) -> Option<&str> {
        self.doc.as_deref()
    }

    pub fn dependencies(&self) -> &[TaskRef] {
        &self.deps
    }

    /// Realize the declared input specifiers into a path list.
    pub(crate) fn resolve_inputs(&self) -> anyhow::Result<Vec<PathBuf>> {
        let mut inputs = Vec::new();
        for spec in &self.inputs {
            match spec {
                InputSpec::Literal(path) => inputs.push(path.clone()),
                InputSpec::Producer(f) => inputs.extend(f()?),
            }
        }
        Ok(inputs)
    }

    /// Realize the declared output specifiers against the realized inputs.
    pub(crate) fn resolve_outputs(&self, inputs: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>> {
        let mut outputs = Vec::new();
        for spec in &self.outputs {
            match spec {
                OutputSpec::Literal(path) => outputs.push(path.clone()),
                OutputSpec::Producer(f) => outputs.extend(f()?),
                OutputSpec::Transformer(f) => outputs.extend(f(inputs)),
            }
        }
        Ok(outputs)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("deps", &self.deps)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_substitution() {
        let p = pattern("obj/%.o");
        assert_eq!(p.apply(Path::new("src/a.c")), PathBuf::from("obj/a.o"));
        assert_eq!(p.apply(Path::new("b.c")), PathBuf::from("obj/b.o"));

        let p = pattern("{dir}/%.o");
        assert_eq!(p.apply(Path::new("src/a.c")), PathBuf::from("src/a.o"));

        let p = pattern("out/%{ext}.bak");
        assert_eq!(
            p.apply(Path::new("src/a.c")),
            PathBuf::from("out/a.c.bak")
        );
    }

    #[test]
    fn test_transformer_yields_one_output_per_input() {
        let spec = OutputSpec::from(pattern("obj/%.o"));
        let inputs = vec![PathBuf::from("src/a.c"), PathBuf::from("src/b.c")];
        match spec {
            OutputSpec::Transformer(f) => {
                assert_eq!(
                    f(&inputs),
                    vec![PathBuf::from("obj/a.o"), PathBuf::from("obj/b.o")]
                );
            }
            _ => panic!("pattern should produce a transformer"),
        }
    }

    #[test]
    fn test_glob_producer_finds_files() {
        let temp_dir = mktemp::Temp::new_dir().unwrap();
        let dir = temp_dir.as_path().to_path_buf();
        std::fs::write(dir.join("one.c"), "").unwrap();
        std::fs::write(dir.join("two.c"), "").unwrap();
        std::fs::write(dir.join("other.h"), "").unwrap();

        let spec = InputSpec::from(glob(&format!("{}/*.c", dir.display())));
        match spec {
            InputSpec::Producer(f) => {
                let paths = f().unwrap();
                assert_eq!(paths.len(), 2);
                assert!(paths.iter().all(|p| p.extension().unwrap() == "c"));
            }
            _ => panic!("glob should produce a producer"),
        }
    }
}
