// Mortar Build Automation
// Copyright (C) 2026 Mortar Contributors
//
// This program is licensed under the GPLv3.0 license (https://github.com/mortar-build/mortar/blob/main/COPYING)

use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// An input is only considered newer than an output when its modification
/// time exceeds the output's by more than this many seconds.  Filesystems
/// with coarse timestamp granularity would otherwise report spurious
/// changes.
pub const MTIME_TOLERANCE: f64 = 0.1;

/// The subsets of a task's realized inputs and outputs that change
/// detection found out of date.
#[derive(Debug, Default, PartialEq)]
pub struct Outdated {
    pub inputs: Vec<PathBuf>,
    pub outputs: Vec<PathBuf>,
}

impl Outdated {
    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty() && self.outputs.is_empty()
    }
}

#[derive(Debug)]
pub enum DetectError {
    MissingOutputs,
    InputNotFound(PathBuf),
    Io { path: PathBuf, error: io::Error },
}

fn mtime(path: &Path) -> Result<f64, DetectError> {
    let modified = path
        .metadata()
        .and_then(|m| m.modified())
        .map_err(|error| DetectError::Io {
            path: path.to_owned(),
            error,
        })?;
    Ok(modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0))
}

fn input_newer(input: &Path, output: &Path) -> Result<bool, DetectError> {
    Ok(mtime(input)? - mtime(output)? > MTIME_TOLERANCE)
}

/// Decide which of a task's realized inputs and outputs are out of date.
///
/// - No inputs and no outputs: nothing is outdated; the caller decides
///   eligibility from the task's dependencies.
/// - Inputs without outputs: `MissingOutputs`.
/// - Outputs only: the missing outputs are outdated.
/// - A single output: if it is missing, every input is outdated with it;
///   otherwise each input newer than the output marks both outdated.
/// - Equal-length inputs and outputs: compared pairwise by index.
/// - Otherwise (several outputs, counts differ): compared all-to-all; an
///   input is outdated if some output is missing or older than it, an
///   output if it is missing or older than some input.
///
/// All realized inputs must exist; a missing one is `InputNotFound`.
pub fn detect(inputs: &[PathBuf], outputs: &[PathBuf]) -> Result<Outdated, DetectError> {
    if !inputs.is_empty() && outputs.is_empty() {
        return Err(DetectError::MissingOutputs);
    }

    for input in inputs {
        if !input.exists() {
            return Err(DetectError::InputNotFound(input.clone()));
        }
    }

    let mut outdated = Outdated::default();

    if inputs.is_empty() && outputs.is_empty() {
        return Ok(outdated);
    }

    if outputs.len() == 1 {
        let output = &outputs[0];
        if !output.exists() {
            outdated.inputs = inputs.to_vec();
            outdated.outputs.push(output.clone());
            return Ok(outdated);
        }
        for input in inputs {
            if input_newer(input, output)? {
                outdated.inputs.push(input.clone());
            }
        }
        if !outdated.inputs.is_empty() {
            outdated.outputs.push(output.clone());
        }
    } else if inputs.is_empty() {
        for output in outputs {
            if !output.exists() {
                outdated.outputs.push(output.clone());
            }
        }
    } else if inputs.len() == outputs.len() {
        for (input, output) in inputs.iter().zip(outputs.iter()) {
            if !output.exists() || input_newer(input, output)? {
                outdated.inputs.push(input.clone());
                outdated.outputs.push(output.clone());
            }
        }
    } else {
        for output in outputs {
            if !output.exists() {
                outdated.outputs.push(output.clone());
                continue;
            }
            for input in inputs {
                if input_newer(input, output)? {
                    outdated.outputs.push(output.clone());
                    break;
                }
            }
        }
        for input in inputs {
            for output in outputs {
                if !output.exists() || input_newer(input, output)? {
                    outdated.inputs.push(input.clone());
                    break;
                }
            }
        }
    }

    Ok(outdated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::thread;
    use std::time::Duration;

    fn touch(path: &Path) {
        fs::write(path, "x").unwrap();
    }

    #[test]
    fn test_no_inputs_or_outputs_is_never_outdated() {
        let outdated = detect(&[], &[]).unwrap();
        assert!(outdated.is_empty());
    }

    #[test]
    fn test_inputs_without_outputs_is_an_error() {
        let temp_dir = mktemp::Temp::new_dir().unwrap();
        let input = temp_dir.as_path().join("in.txt");
        touch(&input);
        match detect(&[input], &[]) {
            Err(DetectError::MissingOutputs) => {}
            other => panic!("expected MissingOutputs, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_input_is_an_error() {
        let temp_dir = mktemp::Temp::new_dir().unwrap();
        let input = temp_dir.as_path().join("missing.txt");
        let output = temp_dir.as_path().join("out.txt");
        match detect(&[input.clone()], &[output]) {
            Err(DetectError::InputNotFound(path)) => assert_eq!(path, input),
            other => panic!("expected InputNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_outputs_only_outdated_when_missing() {
        let temp_dir = mktemp::Temp::new_dir().unwrap();
        let present = temp_dir.as_path().join("present.txt");
        let missing = temp_dir.as_path().join("missing.txt");
        touch(&present);

        let outdated = detect(&[], &[present.clone(), missing.clone()]).unwrap();
        assert_eq!(outdated.inputs, Vec::<PathBuf>::new());
        assert_eq!(outdated.outputs, vec![missing]);

        let outdated = detect(&[], &[present]).unwrap();
        assert!(outdated.is_empty());
    }

    #[test]
    fn test_single_missing_output_marks_all_inputs() {
        let temp_dir = mktemp::Temp::new_dir().unwrap();
        let in1 = temp_dir.as_path().join("a.c");
        let in2 = temp_dir.as_path().join("b.c");
        let output = temp_dir.as_path().join("main");
        touch(&in1);
        touch(&in2);

        let outdated = detect(&[in1.clone(), in2.clone()], &[output.clone()]).unwrap();
        assert_eq!(outdated.inputs, vec![in1, in2]);
        assert_eq!(outdated.outputs, vec![output]);
    }

    #[test]
    fn test_fresh_output_is_up_to_date() {
        let temp_dir = mktemp::Temp::new_dir().unwrap();
        let input = temp_dir.as_path().join("a.c");
        let output = temp_dir.as_path().join("a.o");
        touch(&input);
        touch(&output);

        // Written within the tolerance window of each other
        let outdated = detect(&[input], &[output]).unwrap();
        assert!(outdated.is_empty());
    }

    #[test]
    fn test_input_newer_than_output_is_outdated() {
        let temp_dir = mktemp::Temp::new_dir().unwrap();
        let input = temp_dir.as_path().join("a.c");
        let output = temp_dir.as_path().join("a.o");
        touch(&output);
        thread::sleep(Duration::from_millis(250));
        touch(&input);

        let outdated = detect(&[input.clone()], &[output.clone()]).unwrap();
        assert_eq!(outdated.inputs, vec![input]);
        assert_eq!(outdated.outputs, vec![output]);
    }

    #[test]
    fn test_paired_detection_marks_only_stale_pairs() {
        let temp_dir = mktemp::Temp::new_dir().unwrap();
        let dir = temp_dir.as_path();
        let in1 = dir.join("a.c");
        let in2 = dir.join("b.c");
        let out1 = dir.join("a.o");
        let out2 = dir.join("b.o");
        touch(&in1);
        touch(&in2);
        touch(&out2);

        let outdated = detect(
            &[in1.clone(), in2.clone()],
            &[out1.clone(), out2.clone()],
        )
        .unwrap();
        assert_eq!(outdated.inputs, vec![in1]);
        assert_eq!(outdated.outputs, vec![out1]);
    }

    #[test]
    fn test_mismatched_counts_compare_all_to_all() {
        let temp_dir = mktemp::Temp::new_dir().unwrap();
        let dir = temp_dir.as_path();
        let input = dir.join("a.c");
        let out1 = dir.join("one.gen");
        let out2 = dir.join("two.gen");
        touch(&input);
        touch(&out1);

        let outdated = detect(&[input.clone()], &[out1, out2.clone()]).unwrap();
        assert_eq!(outdated.inputs, vec![input]);
        assert_eq!(outdated.outputs, vec![out2]);
    }
}
