// Mortar Build Automation
// Copyright (C) 2026 Mortar Contributors
//
// This program is licensed under the GPLv3.0 license (https://github.com/mortar-build/mortar/blob/main/COPYING)

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex, RwLock};
use std::thread::{self, JoinHandle};

use crate::defines::DefineStore;
use crate::engine::EngineError;
use crate::execute::job_io::{flush_output, SharedSink};
use crate::execute::worker::{run_one_job, run_worker, WorkerArgs};
use crate::task::Task;

/// A unit of work handed to the worker pool: one task plus the resolved
/// names of its immediate dependencies.
pub(crate) struct Job {
    pub task: Arc<Task>,
    pub deps: Vec<Arc<str>>,
}

pub(crate) enum JobOutcome {
    Executed,
    Skipped,
    Failed(EngineError),
}

/// Completion message sent from a worker back to the dispatch loop,
/// carrying the task's buffered output.
pub(crate) struct JobCompletion {
    pub task: Arc<str>,
    pub outcome: JobOutcome,
    pub output: Vec<u8>,
}

/// State shared by all workers for the duration of one run: which task
/// bodies actually executed, and each task's realized input/output lists.
pub(crate) struct RunState {
    executed: Mutex<HashSet<Arc<str>>>,
    realized: RwLock<HashMap<Arc<str>, (Vec<PathBuf>, Vec<PathBuf>)>>,
}

impl RunState {
    pub fn new() -> RunState {
        RunState {
            executed: Mutex::new(HashSet::new()),
            realized: RwLock::new(HashMap::new()),
        }
    }

    pub fn mark_executed(&self, task: &Arc<str>) {
        self.executed.lock().unwrap().insert(task.clone());
    }

    pub fn any_executed(&self, tasks: &[Arc<str>]) -> bool {
        let executed = self.executed.lock().unwrap();
        tasks.iter().any(|t| executed.contains(t))
    }

    pub fn executed_count(&self) -> usize {
        self.executed.lock().unwrap().len()
    }

    pub fn record_realized(&self, task: &Arc<str>, inputs: Vec<PathBuf>, outputs: Vec<PathBuf>) {
        self.realized
            .write()
            .unwrap()
            .insert(task.clone(), (inputs, outputs));
    }

    /// The realized outputs of the given tasks, concatenated in order.
    pub fn outputs_of(&self, tasks: &[Arc<str>]) -> Vec<PathBuf> {
        let realized = self.realized.read().unwrap();
        let mut outputs = Vec::new();
        for task in tasks {
            if let Some((_, task_outputs)) = realized.get(task) {
                outputs.extend(task_outputs.iter().cloned());
            }
        }
        outputs
    }
}

/// Run the given jobs, which must already be in dependency-first order.
/// Returns the number of task bodies that executed along with the run
/// result.
pub(crate) fn run_goals(
    ordered: Vec<(Arc<str>, Job)>,
    jobs: usize,
    defines: Arc<DefineStore>,
    sink: SharedSink,
    dry_run: bool,
) -> (usize, Result<(), EngineError>) {
    let state = Arc::new(RunState::new());

    let result = if jobs <= 1 || dry_run {
        run_sequential(ordered, &state, &defines, &sink, dry_run)
    } else {
        let mut executor = TaskExecutor::new(jobs, state.clone(), defines);
        executor.execute(ordered, &sink)
    };

    (state.executed_count(), result)
}

fn run_sequential(
    ordered: Vec<(Arc<str>, Job)>,
    state: &Arc<RunState>,
    defines: &Arc<DefineStore>,
    sink: &SharedSink,
    dry_run: bool,
) -> Result<(), EngineError> {
    for (_, job) in ordered {
        let completion = run_one_job(&job, state, defines, dry_run);
        flush_output(sink, &completion.output);
        if let JobOutcome::Failed(error) = completion.outcome {
            return Err(error);
        }
    }
    Ok(())
}

/// The parallel dispatcher: a pool of worker threads fed through a shared
/// queue, with completion messages flowing back over a channel.
struct TaskExecutor {
    worker_threads: Vec<JoinHandle<()>>,
    job_queue: Arc<(Mutex<Option<VecDeque<Job>>>, Condvar)>,
    message_channel: (Sender<JobCompletion>, Receiver<JobCompletion>),
}

impl TaskExecutor {
    fn new(num_workers: usize, state: Arc<RunState>, defines: Arc<DefineStore>) -> TaskExecutor {
        let job_queue = Arc::new((Mutex::new(Some(VecDeque::new())), Condvar::new()));
        let message_channel = mpsc::channel();

        let mut worker_threads = Vec::with_capacity(num_workers);
        for _ in 0..num_workers {
            let worker_args = WorkerArgs {
                job_queue: job_queue.clone(),
                completion_sender: message_channel.0.clone(),
                state: state.clone(),
                defines: defines.clone(),
            };
            worker_threads.push(thread::spawn(move || run_worker(worker_args)));
        }

        TaskExecutor {
            worker_threads,
            job_queue,
            message_channel,
        }
    }

    fn execute(
        &mut self,
        ordered: Vec<(Arc<str>, Job)>,
        sink: &SharedSink,
    ) -> Result<(), EngineError> {
        let total_jobs = ordered.len();

        let mut dep_edges: HashMap<Arc<str>, Vec<Arc<str>>> = HashMap::new();
        let mut rev_dep_edges: HashMap<Arc<str>, Vec<Arc<str>>> = HashMap::new();
        for (name, job) in ordered.iter() {
            dep_edges.insert(name.clone(), job.deps.clone());
            for dep in job.deps.iter() {
                rev_dep_edges
                    .entry(dep.clone())
                    .or_default()
                    .push(name.clone());
            }
        }

        let mut remaining: HashMap<Arc<str>, Job> = HashMap::new();
        let mut ready: Vec<Arc<str>> = Vec::new();
        for (name, job) in ordered {
            if job.deps.is_empty() {
                ready.push(name.clone());
            }
            remaining.insert(name, job);
        }

        let mut in_progress: HashSet<Arc<str>> = HashSet::new();
        let mut completed: HashSet<Arc<str>> = HashSet::new();
        let mut failure: Option<EngineError> = None;

        for name in ready {
            let job = remaining
                .remove(&name)
                .expect("ready job was just inserted into the remaining set");
            self.push_job(job, &name, &mut in_progress);
        }

        while completed.len() < total_jobs {
            // After a failure, no new work is dispatched; drain what is
            // already running so its output gets flushed
            if failure.is_some() && in_progress.is_empty() {
                break;
            }

            let message = self.message_channel.1.recv().map_err(|_| {
                EngineError::Executor(String::from(
                    "Executor message channel closed before all tasks completed",
                ))
            })?;

            flush_output(sink, &message.output);
            in_progress.remove(&message.task);
            completed.insert(message.task.clone());

            if let JobOutcome::Failed(error) = message.outcome {
                if failure.is_none() {
                    failure = Some(error);
                }
                continue;
            }

            if failure.is_some() {
                continue;
            }

            if let Some(dependents) = rev_dep_edges.get(&message.task) {
                for dependent in dependents {
                    if !remaining.contains_key(dependent) {
                        continue;
                    }
                    let deps_done = dep_edges
                        .get(dependent)
                        .map(|deps| deps.iter().all(|d| completed.contains(d)))
                        .unwrap_or(true);
                    if deps_done {
                        let job = remaining
                            .remove(dependent)
                            .expect("dependent job was just found in the remaining set");
                        let name = dependent.clone();
                        self.push_job(job, &name, &mut in_progress);
                    }
                }
            }
        }

        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn push_job(&self, job: Job, name: &Arc<str>, in_progress: &mut HashSet<Arc<str>>) {
        in_progress.insert(name.clone());
        let (queue_mutex, queue_cvar) = &*self.job_queue;
        {
            let mut queue_opt = queue_mutex.lock().unwrap();
            if let Some(queue) = queue_opt.as_mut() {
                queue.push_back(job);
            }
        }
        queue_cvar.notify_one();
    }
}

impl Drop for TaskExecutor {
    fn drop(&mut self) {
        {
            let (queue_mutex, queue_cvar) = &*self.job_queue;
            let mut queue = queue_mutex.lock().unwrap();
            *queue = None;
            queue_cvar.notify_all();
        }

        for worker in self.worker_threads.drain(..) {
            let _ = worker.join();
        }
    }
}
