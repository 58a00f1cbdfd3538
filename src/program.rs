// Mortar Build Automation
// Copyright (C) 2026 Mortar Contributors
//
// This program is licensed under the GPLv3.0 license (https://github.com/mortar-build/mortar/blob/main/COPYING)

use std::env;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::OnceLock;

use clap::Parser;

use crate::defines::DefineStore;
use crate::engine::{Engine, EngineError};
use crate::process::SubprocessError;
use crate::returncodes;
use crate::subbuild::{self, subbuild_depth, SubbuildError};

#[derive(Parser, Clone)]
#[command(about = "A task-graph build script", disable_version_flag = true)]
struct CliArgs {
    /// Set the value of a define: -D name or -D name=value
    #[arg(short = 'D', long = "define", value_name = "NAME[=VALUE]", action = clap::ArgAction::Append)]
    define: Vec<String>,

    /// Maximum number of tasks to run in parallel
    #[arg(short = 'j', long = "jobs", value_name = "N")]
    jobs: Option<usize>,

    /// Change to this directory before running tasks
    #[arg(short = 'C', long = "directory", value_name = "DIR")]
    directory: Option<PathBuf>,

    /// Visit out-of-date tasks without executing them
    #[arg(short = 'n', long = "dry-run")]
    dry_run: bool,

    /// List the default tasks and all task names
    #[arg(short = 't', long = "show-tasks")]
    show_tasks: bool,

    /// List documented tasks with their documentation
    #[arg(long = "show-task-info", alias = "ti")]
    show_task_info: bool,

    #[arg(long = "_subbuild_depth", hide = true, value_name = "N")]
    subbuild_depth: Option<usize>,

    #[arg(long = "stdin-defines", hide = true)]
    stdin_defines: bool,

    /// Tasks to run
    tasks: Vec<String>,
}

struct ProgramState {
    args: CliArgs,
    init_dir: PathBuf,
}

static STATE: OnceLock<ProgramState> = OnceLock::new();

fn exit_with(code: u8) -> ! {
    process::exit(code as i32)
}

/// Parse the command line and prepare an engine for the build script:
/// populate the define store (from `-D` arguments and, for a child build
/// script, from stdin), record the subbuild depth, and apply `--directory`.
///
/// Exits the process with `BAD_DEFINE_VALUE` or `BAD_ARGUMENTS` on invalid
/// input.
pub fn init() -> Engine {
    init_from_args(CliArgs::parse())
}

fn init_from_args(args: CliArgs) -> Engine {
    subbuild::init_depth(args.subbuild_depth.unwrap_or(0));
    let depth = subbuild_depth();

    let mut engine = Engine::new();

    let mut defines = DefineStore::new();
    if args.stdin_defines {
        let mut text = String::new();
        if let Err(error) = std::io::stdin().read_to_string(&mut text) {
            eprintln!("Error reading defines from stdin: {}", error);
            exit_with(returncodes::BAD_DEFINE_VALUE);
        }
        let text = text.trim();
        if !text.is_empty() {
            match DefineStore::parse(text) {
                Ok(incoming) => defines.merge(incoming),
                Err(error) => {
                    eprintln!("Error parsing defines from stdin: {}", error);
                    exit_with(returncodes::BAD_DEFINE_VALUE);
                }
            }
        }
    }
    for token in &args.define {
        if let Err(error) = defines.add_arg(token) {
            eprintln!("{}", error);
            exit_with(returncodes::BAD_DEFINE_VALUE);
        }
    }
    engine.set_defines(defines);

    let init_dir = env::current_dir().expect("the current directory should be readable");

    if let Some(dir) = &args.directory {
        if *dir != init_dir {
            engine.print(format!(
                "mortar[{}]: Entering directory \"{}\"",
                depth,
                dir.display()
            ));
            if let Err(error) = env::set_current_dir(dir) {
                eprintln!(
                    "Unable to change directory to \"{}\": {}",
                    dir.display(),
                    error
                );
                exit_with(returncodes::BAD_ARGUMENTS);
            }
        }
    }

    if depth > 0 {
        engine.print(format!("*** enter subbuild[{}]:", depth));
    }

    let _ = STATE.set(ProgramState { args, init_dir });

    engine
}

/// Run the build script and exit the process with the appropriate return
/// code.  `default_goals` are run when no tasks are named on the command
/// line.
pub fn run(pk: &mut Engine, default_goals: &[&str]) -> ! {
    let code = try_run(pk, default_goals);
    exit_with(code)
}

/// Like `run`, but returns the code instead of exiting.
pub fn try_run(pk: &mut Engine, default_goals: &[&str]) -> u8 {
    let state = STATE
        .get()
        .expect("program::init must be called before program::run");
    drive(pk, &state.args, default_goals, &state.init_dir)
}

fn validate_flags(args: &CliArgs) -> Option<u8> {
    if args.jobs == Some(0) {
        eprintln!("Job count must be >= 1.");
        return Some(returncodes::BAD_ARGUMENTS);
    }
    if args.show_tasks && args.show_task_info {
        eprintln!("-t/--show-tasks and --show-task-info cannot be used together.");
        return Some(returncodes::BAD_ARGUMENTS);
    }
    if args.dry_run {
        if args.jobs.is_some() {
            eprintln!("-n/--dry-run and -j/--jobs cannot be used together.");
            return Some(returncodes::BAD_ARGUMENTS);
        }
        if args.show_tasks || args.show_task_info {
            eprintln!("-n/--dry-run and the task listing options cannot be used together.");
            return Some(returncodes::BAD_ARGUMENTS);
        }
    }
    if !args.tasks.is_empty() && (args.show_tasks || args.show_task_info) {
        eprintln!("Run tasks may not be specified when using a task listing option.");
        return Some(returncodes::BAD_ARGUMENTS);
    }
    if args.jobs.is_some() && (args.show_tasks || args.show_task_info) {
        eprintln!("-j/--jobs cannot be used together with a task listing option.");
        return Some(returncodes::BAD_ARGUMENTS);
    }
    None
}

fn list_tasks(pk: &Engine, default_goals: &[&str]) {
    if !default_goals.is_empty() {
        pk.print("# Default tasks");
        for goal in default_goals {
            pk.print(*goal);
        }
        pk.print("");
    }
    pk.print("# All tasks");
    for task in pk.tasks() {
        pk.print(task.name());
    }
}

fn list_task_info(pk: &Engine, default_goals: &[&str]) {
    if !default_goals.is_empty() {
        pk.print("# Default tasks");
        for goal in default_goals {
            pk.print(*goal);
        }
        pk.print("");
    }
    pk.print("# Documented tasks");
    let documented: Vec<_> = pk.tasks().filter(|t| t.doc().is_some()).collect();
    if documented.is_empty() {
        pk.print("No documented tasks present.");
        return;
    }
    let name_width = documented.iter().map(|t| t.name().len()).max().unwrap_or(0);
    for task in documented {
        pk.print(format!(
            "{:name_width$}:  {}",
            task.name(),
            task.doc().unwrap_or(""),
        ));
    }
}

pub(crate) fn return_code_for(error: &EngineError) -> u8 {
    match error {
        EngineError::UndefinedTask(_) => returncodes::UNDEFINED_TASK,
        EngineError::CyclicDependency { .. } => returncodes::CYCLIC_DEPENDENCY,
        EngineError::InputNotFound { .. } => returncodes::TASK_INPUT_NOT_FOUND,
        EngineError::MissingOutputs(_) => returncodes::TASK_OUTPUT_MISSING,
        EngineError::NoTasksSpecified => returncodes::NO_TASKS_SPECIFIED,
        EngineError::TaskFailed { cause, .. } => {
            if cause.downcast_ref::<SubbuildError>().is_some() {
                returncodes::SUBBUILD_EXCEPTION
            } else if cause.downcast_ref::<SubprocessError>().is_some() {
                returncodes::TASK_SUBPROCESS_EXCEPTION
            } else {
                returncodes::TASK_EXCEPTION
            }
        }
        EngineError::RedefinedTask(_) | EngineError::Executor(_) => returncodes::TASK_EXCEPTION,
    }
}

fn drive(pk: &mut Engine, args: &CliArgs, default_goals: &[&str], init_dir: &Path) -> u8 {
    if let Some(code) = validate_flags(args) {
        return code;
    }

    if pk.task_count() == 0 {
        eprintln!("*** No tasks.  Stop.");
        return returncodes::NO_TASKS_DEFINED;
    }

    if args.show_tasks {
        list_tasks(pk, default_goals);
        return returncodes::SUCCESS;
    }
    if args.show_task_info {
        list_task_info(pk, default_goals);
        return returncodes::SUCCESS;
    }

    let goals: Vec<String> = if !args.tasks.is_empty() {
        args.tasks.clone()
    } else {
        default_goals.iter().map(|s| (*s).to_owned()).collect()
    };
    if goals.is_empty() {
        pk.print("No tasks specified.");
        return returncodes::NO_TASKS_SPECIFIED;
    }

    // The script may have changed directories after init; quietly restore
    // the requested working directory before running anything
    if let Some(dir) = &args.directory {
        if env::current_dir().map(|cwd| cwd != *dir).unwrap_or(true) {
            let _ = env::set_current_dir(dir);
        }
    }

    let result = if args.dry_run {
        pk.dry_run(goals.iter())
    } else {
        pk.run(goals.iter(), args.jobs.unwrap_or(1))
    };

    let code = match result {
        Ok(()) => {
            if pk.run_count() == 0 {
                pk.print("Nothing to do, all tasks up to date.");
            }
            returncodes::SUCCESS
        }
        Err(error) => {
            eprintln!("{}", error);
            return_code_for(&error)
        }
    };

    let depth = subbuild_depth();
    if let Ok(cwd) = env::current_dir() {
        if cwd != *init_dir {
            pk.print(format!(
                "mortar[{}]: Leaving directory \"{}\"",
                depth,
                cwd.display()
            ));
            let _ = env::set_current_dir(init_dir);
        }
    }
    if depth > 0 {
        pk.print(format!("*** exit subbuild[{}]:", depth));
    }

    code
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execute::job_io::test_support::SharedBuffer;

    fn parse(args: &[&str]) -> CliArgs {
        CliArgs::parse_from(std::iter::once(&"build-script").chain(args.iter()))
    }

    fn test_engine() -> (Engine, SharedBuffer) {
        let buffer = SharedBuffer::new();
        let engine = Engine::with_output(Box::new(buffer.clone()));
        (engine, buffer)
    }

    #[test]
    fn test_parse_surface() {
        let args = parse(&[
            "-D",
            "VER=[1, 2]",
            "-D",
            "DEBUG",
            "-j",
            "4",
            "compile",
            "link",
        ]);
        assert_eq!(args.define, vec!["VER=[1, 2]", "DEBUG"]);
        assert_eq!(args.jobs, Some(4));
        assert_eq!(args.tasks, vec!["compile", "link"]);

        let args = parse(&["--_subbuild_depth", "2", "--stdin-defines", "-C", "sub"]);
        assert_eq!(args.subbuild_depth, Some(2));
        assert!(args.stdin_defines);
        assert_eq!(args.directory, Some(PathBuf::from("sub")));
    }

    #[test]
    fn test_mutually_exclusive_flags_are_bad_arguments() {
        for case in [
            vec!["-n", "-j", "2"],
            vec!["-n", "-t"],
            vec!["-n", "--show-task-info"],
            vec!["-t", "--show-task-info"],
            vec!["-t", "sometask"],
            vec!["-j", "2", "-t"],
            vec!["-j", "0"],
        ] {
            let args = parse(&case);
            assert_eq!(
                validate_flags(&args),
                Some(returncodes::BAD_ARGUMENTS),
                "case {:?}",
                case
            );
        }

        assert_eq!(validate_flags(&parse(&["-j", "2", "compile"])), None);
    }

    #[test]
    fn test_return_code_mapping() {
        use std::sync::Arc;

        let undefined = EngineError::UndefinedTask(Arc::from("x"));
        assert_eq!(return_code_for(&undefined), returncodes::UNDEFINED_TASK);

        let cyclic = EngineError::CyclicDependency {
            from: Arc::from("x"),
            to: Arc::from("y"),
        };
        assert_eq!(return_code_for(&cyclic), returncodes::CYCLIC_DEPENDENCY);

        let input = EngineError::InputNotFound {
            task: Arc::from("x"),
            path: PathBuf::from("a.c"),
        };
        assert_eq!(return_code_for(&input), returncodes::TASK_INPUT_NOT_FOUND);

        let subprocess = EngineError::TaskFailed {
            task: Arc::from("x"),
            cause: anyhow::Error::new(SubprocessError {
                cmd: vec![String::from("gcc")],
                code: 1,
                output: Vec::new(),
            }),
        };
        assert_eq!(
            return_code_for(&subprocess),
            returncodes::TASK_SUBPROCESS_EXCEPTION
        );

        let child = EngineError::TaskFailed {
            task: Arc::from("x"),
            cause: anyhow::Error::new(SubbuildError {
                cmd: vec![String::from("child")],
                code: 1,
                output: Vec::new(),
            }),
        };
        assert_eq!(return_code_for(&child), returncodes::SUBBUILD_EXCEPTION);

        let plain = EngineError::TaskFailed {
            task: Arc::from("x"),
            cause: anyhow::anyhow!("boom"),
        };
        assert_eq!(return_code_for(&plain), returncodes::TASK_EXCEPTION);
    }

    #[test]
    fn test_drive_with_no_registered_tasks() {
        let (mut pk, _) = test_engine();
        let init_dir = env::current_dir().unwrap();
        let code = drive(&mut pk, &parse(&["compile"]), &[], &init_dir);
        assert_eq!(code, returncodes::NO_TASKS_DEFINED);
    }

    #[test]
    fn test_drive_with_no_goals_at_all() {
        let (mut pk, buffer) = test_engine();
        pk.task("compile").register_nullary(|| Ok(())).unwrap();
        let init_dir = env::current_dir().unwrap();
        let code = drive(&mut pk, &parse(&[]), &[], &init_dir);
        assert_eq!(code, returncodes::NO_TASKS_SPECIFIED);
        assert_eq!(buffer.contents(), "No tasks specified.\n");
    }

    #[test]
    fn test_drive_falls_back_to_default_goals() {
        let (mut pk, buffer) = test_engine();
        pk.task("compile")
            .register(|ctx| {
                ctx.print("compiled");
                Ok(())
            })
            .unwrap();
        let init_dir = env::current_dir().unwrap();
        let code = drive(&mut pk, &parse(&[]), &["compile"], &init_dir);
        assert_eq!(code, returncodes::SUCCESS);
        assert!(buffer.contents().contains("compiled"));
    }

    #[test]
    fn test_drive_maps_cycle_to_return_code() {
        let (mut pk, _) = test_engine();
        pk.task("x")
            .depends_on(["y"])
            .register_nullary(|| Ok(()))
            .unwrap();
        pk.task("y")
            .depends_on(["x"])
            .register_nullary(|| Ok(()))
            .unwrap();
        let init_dir = env::current_dir().unwrap();
        let code = drive(&mut pk, &parse(&["x"]), &[], &init_dir);
        assert_eq!(code, returncodes::CYCLIC_DEPENDENCY);
    }

    #[test]
    fn test_drive_lists_tasks() {
        let (mut pk, buffer) = test_engine();
        pk.task("compile")
            .doc("Compile the sources")
            .register_nullary(|| Ok(()))
            .unwrap();
        pk.task("undocumented").register_nullary(|| Ok(())).unwrap();

        let init_dir = env::current_dir().unwrap();
        let code = drive(&mut pk, &parse(&["-t"]), &["compile"], &init_dir);
        assert_eq!(code, returncodes::SUCCESS);
        let listing = buffer.contents();
        assert!(listing.contains("# Default tasks\ncompile\n"));
        assert!(listing.contains("# All tasks\ncompile\nundocumented\n"));

        let (mut pk, buffer) = test_engine();
        pk.task("compile")
            .doc("Compile the sources")
            .register_nullary(|| Ok(()))
            .unwrap();
        pk.task("undocumented").register_nullary(|| Ok(())).unwrap();
        let code = drive(&mut pk, &parse(&["--show-task-info"]), &[], &init_dir);
        assert_eq!(code, returncodes::SUCCESS);
        let listing = buffer.contents();
        assert!(listing.contains("# Documented tasks"));
        assert!(listing.contains("compile:  Compile the sources"));
        assert!(!listing.contains("undocumented:"));
    }

    #[test]
    fn test_drive_reports_nothing_to_do() {
        let temp_dir = mktemp::Temp::new_dir().unwrap();
        let dir = temp_dir.as_path().to_path_buf();
        let input = dir.join("a.c");
        let output = dir.join("a.o");
        std::fs::write(&input, "x").unwrap();
        std::fs::write(&output, "x").unwrap();

        let (mut pk, buffer) = test_engine();
        pk.task("compile")
            .inputs([input])
            .outputs([output])
            .register(|_| Ok(()))
            .unwrap();

        let init_dir = env::current_dir().unwrap();
        let code = drive(&mut pk, &parse(&["compile"]), &[], &init_dir);
        assert_eq!(code, returncodes::SUCCESS);
        assert_eq!(
            buffer.contents(),
            "Nothing to do, all tasks up to date.\n"
        );
    }
}
