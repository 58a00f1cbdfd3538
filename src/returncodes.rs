// Mortar Build Automation
// Copyright (C) 2026 Mortar Contributors
//
// This program is licensed under the GPLv3.0 license (https://github.com/mortar-build/mortar/blob/main/COPYING)

//! Stable process return codes used by the build-script driver.

/// The run completed; every requested task succeeded or was up to date.
pub const SUCCESS: u8 = 0;

/// Mutually exclusive command-line options were combined, or an option
/// value was invalid.
pub const BAD_ARGUMENTS: u8 = 2;

/// A `-D` define value could not be parsed as a literal.
pub const BAD_DEFINE_VALUE: u8 = 3;

/// The build script registered no tasks.
pub const NO_TASKS_DEFINED: u8 = 4;

/// No tasks were named on the command line and the script declares no
/// default tasks.
pub const NO_TASKS_SPECIFIED: u8 = 5;

/// A requested task or dependency is not registered.
pub const UNDEFINED_TASK: u8 = 6;

/// The dependency graph contains a cycle.
pub const CYCLIC_DEPENDENCY: u8 = 7;

/// A declared input file did not exist when its task was about to execute.
pub const TASK_INPUT_NOT_FOUND: u8 = 8;

/// A task declared input files without any output files.
pub const TASK_OUTPUT_MISSING: u8 = 9;

/// A subprocess started with `TaskContext::call` exited with a non-zero
/// code.
pub const TASK_SUBPROCESS_EXCEPTION: u8 = 10;

/// A child build script started with `subbuild` exited with a non-zero
/// code.
pub const SUBBUILD_EXCEPTION: u8 = 11;

/// A task body failed with any other error.
pub const TASK_EXCEPTION: u8 = 12;
