// Mortar Build Automation
// Copyright (C) 2026 Mortar Contributors
//
// This program is licensed under the GPLv3.0 license (https://github.com/mortar-build/mortar/blob/main/COPYING)

//! A task-graph build automation library.  Build scripts are small Rust
//! binaries that register named tasks against an [`Engine`], declare
//! dependencies and input/output files for change detection, and hand
//! control to [`program::run`].  Nested build scripts are invoked as child
//! processes with [`subbuild`], inheriting the parent's defines.

pub mod context;
pub mod defines;
pub mod engine;
pub mod execute;
pub mod graph;
pub mod outdated;
pub mod process;
pub mod program;
pub mod returncodes;
pub mod subbuild;
pub mod task;

pub use context::{CallOptions, CommandArgs, TaskContext};
pub use defines::{DefineStore, Value};
pub use engine::{Engine, EngineError, TaskBuilder};
pub use process::SubprocessError;
pub use subbuild::{subbuild, subbuild_depth, SubbuildError, SubbuildOptions};
pub use task::{glob, pattern, InputSpec, OutputSpec, Task, TaskBody, TaskHandle, TaskRef};
