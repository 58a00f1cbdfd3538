// Mortar Build Automation
// Copyright (C) 2026 Mortar Contributors
//
// This program is licensed under the GPLv3.0 license (https://github.com/mortar-build/mortar/blob/main/COPYING)

use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use crate::context::TaskContext;
use crate::defines::{DefineStore, Value};
use crate::execute::execute::{run_goals, Job};
use crate::execute::job_io::{sink_from, stdout_sink, SharedSink};
use crate::graph::Graph;
use crate::task::{InputSpec, OutputSpec, Task, TaskBody, TaskHandle, TaskRef};

#[derive(Debug)]
pub enum EngineError {
    /// A task with the same name is already registered.
    RedefinedTask(Arc<str>),
    /// A goal or dependency reference does not name a registered task.
    UndefinedTask(Arc<str>),
    /// The dependency graph contains a cycle; carries the back edge that
    /// closes it.
    CyclicDependency { from: Arc<str>, to: Arc<str> },
    /// A task declared input files without any outputs.
    MissingOutputs(Arc<str>),
    /// A realized input file did not exist when its task was about to
    /// execute.
    InputNotFound { task: Arc<str>, path: PathBuf },
    /// A run was requested with no goals.
    NoTasksSpecified,
    /// A task body (or one of its input/output producers) failed.
    TaskFailed { task: Arc<str>, cause: anyhow::Error },
    /// The worker pool failed in a way not attributable to a single task.
    Executor(String),
}

impl Error for EngineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            EngineError::TaskFailed { cause, .. } => {
                let source: &(dyn Error + 'static) = cause.as_ref();
                Some(source)
            }
            _ => None,
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use EngineError::*;
        match self {
            RedefinedTask(task) => write!(f, "Task \"{}\" has already been defined.", task),
            UndefinedTask(task) => write!(f, "Task \"{}\" is undefined.", task),
            CyclicDependency { from, to } => write!(
                f,
                "Cyclic dependency detected: \"{}\" depends on \"{}\", which depends back on \"{}\".",
                from, to, from
            ),
            MissingOutputs(task) => write!(
                f,
                "Task \"{}\" declares input files but no output files.",
                task
            ),
            InputNotFound { task, path } => write!(
                f,
                "Input \"{}\" of task \"{}\" did not exist upon task execution.",
                path.display(),
                task
            ),
            NoTasksSpecified => write!(f, "No tasks specified."),
            TaskFailed { task, cause } => {
                write!(f, "Task \"{}\" failed: {}", task, cause)
            }
            Executor(message) => write!(f, "{}", message),
        }
    }
}

/// The build engine: a registry of tasks and their dependency graph, plus
/// the scheduler that runs the subgraph needed for a set of goals.
///
/// A build script creates one engine, registers tasks against it, and
/// hands it to `program::run`.
pub struct Engine {
    tasks: Vec<Arc<Task>>,
    index: HashMap<Arc<str>, usize>,
    defines: Arc<DefineStore>,
    sink: SharedSink,
    run_count: usize,
}

impl Engine {
    /// An engine writing task output to stdout.
    pub fn new() -> Engine {
        Engine {
            tasks: Vec::new(),
            index: HashMap::new(),
            defines: Arc::new(DefineStore::new()),
            sink: stdout_sink(),
            run_count: 0,
        }
    }

    /// An engine writing task output to the given sink.
    pub fn with_output(writer: Box<dyn Write + Send>) -> Engine {
        Engine {
            sink: sink_from(writer),
            ..Engine::new()
        }
    }

    /// Start registering a task.  The registration is completed (and
    /// checked) by `TaskBuilder::register` or
    /// `TaskBuilder::register_nullary`.
    pub fn task(&mut self, name: &str) -> TaskBuilder<'_> {
        TaskBuilder {
            engine: self,
            name: name.to_owned(),
            doc: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
            deps: Vec::new(),
        }
    }

    fn add_task(&mut self, task: Task) -> Result<TaskHandle, EngineError> {
        if self.index.contains_key(task.name()) {
            return Err(EngineError::RedefinedTask(task.name_arc()));
        }
        let handle = TaskHandle(self.tasks.len());
        self.index.insert(task.name_arc(), handle.0);
        self.tasks.push(Arc::new(task));
        Ok(handle)
    }

    fn resolve_ref(&self, task_ref: &TaskRef) -> Result<usize, EngineError> {
        match task_ref {
            TaskRef::Name(name) => self
                .index
                .get(name)
                .copied()
                .ok_or_else(|| EngineError::UndefinedTask(name.clone())),
            TaskRef::Handle(handle) => {
                if handle.0 < self.tasks.len() {
                    Ok(handle.0)
                } else {
                    Err(EngineError::UndefinedTask(Arc::from(format!(
                        "task #{}",
                        handle.0
                    ))))
                }
            }
        }
    }

    /// Look up a registered task by name or handle.
    pub fn lookup(&self, task_ref: impl Into<TaskRef>) -> Result<&Arc<Task>, EngineError> {
        let idx = self.resolve_ref(&task_ref.into())?;
        Ok(&self.tasks[idx])
    }

    /// The name a handle was registered under.
    pub fn task_name(&self, handle: TaskHandle) -> Result<&str, EngineError> {
        let idx = self.resolve_ref(&TaskRef::Handle(handle))?;
        Ok(self.tasks[idx].name())
    }

    /// All registered tasks, in registration order.
    pub fn tasks(&self) -> impl Iterator<Item = &Arc<Task>> {
        self.tasks.iter()
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn set_define(&mut self, name: impl Into<String>, value: Value) {
        Arc::make_mut(&mut self.defines).set(name, value);
    }

    pub fn get_define(&self, name: &str) -> Option<&Value> {
        self.defines.get(name)
    }

    pub fn defines(&self) -> &DefineStore {
        &self.defines
    }

    /// Replace the whole define store, e.g. with one parsed from the
    /// command line.
    pub fn set_defines(&mut self, defines: DefineStore) {
        self.defines = Arc::new(defines);
    }

    /// The number of task bodies that executed in the last run (visited
    /// tasks, for a dry run).  Skipped up-to-date tasks do not count.
    pub fn run_count(&self) -> usize {
        self.run_count
    }

    /// Write a line to the engine's output sink.
    pub fn print(&self, text: impl AsRef<str>) {
        let mut sink = self.sink.lock().unwrap();
        sink.write_all(text.as_ref().as_bytes())
            .and_then(|_| sink.write_all(b"\n"))
            .and_then(|_| sink.flush())
            .expect("failed to write to the output sink");
    }

    /// Run the given goals and everything they transitively depend on,
    /// with up to `jobs` tasks in flight at once.
    pub fn run<I, R>(&mut self, goals: I, jobs: usize) -> Result<(), EngineError>
    where
        I: IntoIterator<Item = R>,
        R: Into<TaskRef>,
    {
        if jobs < 1 {
            return Err(EngineError::Executor(String::from(
                "Job count must be >= 1.",
            )));
        }
        self.run_inner(goals, jobs, false)
    }

    /// Visit the tasks a run would execute, without invoking their bodies.
    /// Each eligible task writes a `Visited task` line to its stream.
    pub fn dry_run<I, R>(&mut self, goals: I) -> Result<(), EngineError>
    where
        I: IntoIterator<Item = R>,
        R: Into<TaskRef>,
    {
        self.run_inner(goals, 1, true)
    }

    fn run_inner<I, R>(&mut self, goals: I, jobs: usize, dry_run: bool) -> Result<(), EngineError>
    where
        I: IntoIterator<Item = R>,
        R: Into<TaskRef>,
    {
        let goal_refs: Vec<TaskRef> = goals.into_iter().map(Into::into).collect();
        let ordered = self.prepare(&goal_refs)?;
        let (count, result) = run_goals(
            ordered,
            jobs,
            self.defines.clone(),
            self.sink.clone(),
            dry_run,
        );
        self.run_count = count;
        result
    }

    /// Validate the registry and produce the minimal job list for the
    /// goals: every dependency reference must resolve, the graph must be
    /// acyclic, and the result is the union of each goal's reachable
    /// subgraph in dependency-first order.
    fn prepare(&self, goal_refs: &[TaskRef]) -> Result<Vec<(Arc<str>, Job)>, EngineError> {
        if goal_refs.is_empty() {
            return Err(EngineError::NoTasksSpecified);
        }

        let mut goal_names: Vec<Arc<str>> = Vec::with_capacity(goal_refs.len());
        for goal in goal_refs {
            goal_names.push(self.tasks[self.resolve_ref(goal)?].name_arc());
        }

        let mut deps_by_task: Vec<Vec<Arc<str>>> = Vec::with_capacity(self.tasks.len());
        for task in &self.tasks {
            let mut deps = Vec::with_capacity(task.dependencies().len());
            for dep in task.dependencies() {
                deps.push(self.tasks[self.resolve_ref(dep)?].name_arc());
            }
            deps_by_task.push(deps);
        }

        let mut graph = Graph::new();
        for task in &self.tasks {
            graph.add_node(task.name());
        }
        for (task, deps) in self.tasks.iter().zip(deps_by_task.iter()) {
            for dep in deps {
                graph.add_edge(task.name(), dep);
            }
        }

        if let Some((from, to)) = graph.detect_cycle() {
            return Err(EngineError::CyclicDependency { from, to });
        }

        let mut seen: HashSet<Arc<str>> = HashSet::new();
        let mut ordered: Vec<(Arc<str>, Job)> = Vec::new();
        for goal in &goal_names {
            for name in graph.topological_sort(Some(goal)) {
                if seen.insert(name.clone()) {
                    let idx = self.index[&name];
                    let job = Job {
                        task: self.tasks[idx].clone(),
                        deps: deps_by_task[idx].clone(),
                    };
                    ordered.push((name, job));
                }
            }
        }

        Ok(ordered)
    }
}

impl Default for Engine {
    fn default() -> Engine {
        Engine::new()
    }
}

/// Builder returned by `Engine::task`.  Dependencies, inputs and outputs
/// are optional; the task is registered when a body is supplied.
pub struct TaskBuilder<'a> {
    engine: &'a mut Engine,
    name: String,
    doc: Option<String>,
    inputs: Vec<InputSpec>,
    outputs: Vec<OutputSpec>,
    deps: Vec<TaskRef>,
}

impl TaskBuilder<'_> {
    /// Attach a documentation string, shown by the driver's task listing.
    pub fn doc(mut self, doc: &str) -> Self {
        self.doc = Some(doc.to_owned());
        self
    }

    pub fn depends_on<I, R>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<TaskRef>,
    {
        self.deps.extend(deps.into_iter().map(Into::into));
        self
    }

    pub fn inputs<I, S>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<InputSpec>,
    {
        self.inputs.extend(inputs.into_iter().map(Into::into));
        self
    }

    pub fn outputs<I, S>(mut self, outputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OutputSpec>,
    {
        self.outputs.extend(outputs.into_iter().map(Into::into));
        self
    }

    /// Register the task with a body that receives the task context.
    pub fn register<F>(self, body: F) -> Result<TaskHandle, EngineError>
    where
        F: Fn(&TaskContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.finish(TaskBody::Contextual(Box::new(body)))
    }

    /// Register the task with a body that takes no arguments.
    pub fn register_nullary<F>(self, body: F) -> Result<TaskHandle, EngineError>
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.finish(TaskBody::Nullary(Box::new(body)))
    }

    fn finish(self, body: TaskBody) -> Result<TaskHandle, EngineError> {
        let task = Task {
            name: Arc::from(self.name.as_str()),
            body,
            inputs: self.inputs,
            outputs: self.outputs,
            deps: self.deps,
            doc: self.doc,
        };
        self.engine.add_task(task)
    }
}
