// Mortar Build Automation
// Copyright (C) 2026 Mortar Contributors
//
// This program is licensed under the GPLv3.0 license (https://github.com/mortar-build/mortar/blob/main/COPYING)

use std::collections::VecDeque;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Condvar, Mutex};

use crate::context::TaskContext;
use crate::defines::DefineStore;
use crate::engine::EngineError;
use crate::execute::execute::{Job, JobCompletion, JobOutcome, RunState};
use crate::execute::job_io::TaskIo;
use crate::outdated::{detect, DetectError};
use crate::task::TaskBody;

pub(crate) struct WorkerArgs {
    pub job_queue: Arc<(Mutex<Option<VecDeque<Job>>>, Condvar)>,
    pub completion_sender: Sender<JobCompletion>,
    pub state: Arc<RunState>,
    pub defines: Arc<DefineStore>,
}

fn poll_next_job(job_queue: &(Mutex<Option<VecDeque<Job>>>, Condvar)) -> Option<Job> {
    let (queue_mutex, queue_cvar) = job_queue;
    let mut queue_locked = queue_mutex.lock().unwrap();

    loop {
        let job_available = match &*queue_locked {
            Some(queue) => !queue.is_empty(),
            None => {
                return None;
            }
        };

        if job_available {
            break;
        }

        queue_locked = queue_cvar.wait(queue_locked).unwrap();
    }

    let queue = queue_locked
        .as_mut()
        .expect("Job queue should still exist since we are still holding the mutex after validating it exists");

    queue.pop_front()
}

pub(crate) fn run_worker(args: WorkerArgs) {
    loop {
        let job = match poll_next_job(&args.job_queue) {
            Some(job) => job,
            None => {
                return;
            }
        };

        let completion = run_one_job(&job, &args.state, &args.defines, false);
        args.completion_sender
            .send(completion)
            .expect("completion channel should outlive the workers");
    }
}

/// Execute a single job: realize its input/output specifiers, run change
/// detection, and either skip the task or invoke its body with a fresh
/// context.  The task's buffered output rides back in the completion.
pub(crate) fn run_one_job(
    job: &Job,
    state: &Arc<RunState>,
    defines: &Arc<DefineStore>,
    dry_run: bool,
) -> JobCompletion {
    let io = Arc::new(TaskIo::new());
    let outcome = execute_job(job, state, defines, dry_run, &io);
    JobCompletion {
        task: job.task.name_arc(),
        outcome,
        output: io.take(),
    }
}

fn execute_job(
    job: &Job,
    state: &Arc<RunState>,
    defines: &Arc<DefineStore>,
    dry_run: bool,
    io: &Arc<TaskIo>,
) -> JobOutcome {
    let task = &job.task;
    let name = task.name_arc();

    let inputs = match task.resolve_inputs() {
        Ok(inputs) => inputs,
        Err(cause) => {
            return JobOutcome::Failed(EngineError::TaskFailed { task: name, cause });
        }
    };
    let outputs = match task.resolve_outputs(&inputs) {
        Ok(outputs) => outputs,
        Err(cause) => {
            return JobOutcome::Failed(EngineError::TaskFailed { task: name, cause });
        }
    };

    let outdated = match detect(&inputs, &outputs) {
        Ok(outdated) => outdated,
        Err(DetectError::MissingOutputs) => {
            return JobOutcome::Failed(EngineError::MissingOutputs(name));
        }
        Err(DetectError::InputNotFound(path)) => {
            return JobOutcome::Failed(EngineError::InputNotFound { task: name, path });
        }
        Err(DetectError::Io { path, error }) => {
            let cause = anyhow::Error::new(error)
                .context(format!("Error reading metadata of \"{}\"", path.display()));
            return JobOutcome::Failed(EngineError::TaskFailed { task: name, cause });
        }
    };

    // Dependents read these even when the task is skipped
    state.record_realized(&name, inputs.clone(), outputs.clone());

    let unconditional = inputs.is_empty() && outputs.is_empty() && job.deps.is_empty();
    let eligible = !outdated.is_empty() || unconditional || state.any_executed(&job.deps);
    if !eligible {
        return JobOutcome::Skipped;
    }

    state.mark_executed(&name);

    if dry_run {
        io.append_line(&format!("Visited task: \"{}\"", name));
        return JobOutcome::Executed;
    }

    io.append_line(&format!("===== Executing task: \"{}\"", name));

    let result = match &task.body {
        TaskBody::Nullary(body) => body(),
        TaskBody::Contextual(body) => {
            let context = TaskContext {
                task: task.clone(),
                inputs,
                outputs,
                outdated_inputs: outdated.inputs,
                outdated_outputs: outdated.outputs,
                dependency_outputs: state.outputs_of(&job.deps),
                defines: defines.clone(),
                io: io.clone(),
            };
            body(&context)
        }
    };

    match result {
        Ok(()) => JobOutcome::Executed,
        Err(cause) => JobOutcome::Failed(EngineError::TaskFailed { task: name, cause }),
    }
}
