use std::process::{Command, Output};

use anyhow::{bail, Context, Result};

/// Result of a command execution.
#[derive(Debug)]
pub struct ExecResult {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub code: Option<i32>,
}

impl ExecResult {
    /// Stdout and stderr joined, for error reporting of failed children.
    #[must_use]
    pub fn combined_output(&self) -> String {
        let out = self.stdout.trim();
        let err = self.stderr.trim();
        if err.is_empty() {
            out.to_string()
        } else if out.is_empty() {
            err.to_string()
        } else {
            format!("{out}\n{err}")
        }
    }
}

impl From<Output> for ExecResult {
    fn from(output: Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
            code: output.status.code(),
        }
    }
}

/// Run a command and return its output. Fails if the command exits non-zero,
/// with the child's combined output in the error message.
pub fn run(program: &str, args: &[&str]) -> Result<ExecResult> {
    let output = Command::new(program)
        .args(args)
        .output()
        .with_context(|| format!("failed to execute: {program}"))?;
    let result = ExecResult::from(output);
    if !result.success {
        bail!(
            "{program} failed (exit {}): {}",
            result.code.unwrap_or(-1),
            result.combined_output()
        );
    }
    Ok(result)
}

/// Run a command, allowing failure (returns the result without bailing).
pub fn run_unchecked(program: &str, args: &[&str]) -> Result<ExecResult> {
    let output = Command::new(program)
        .args(args)
        .output()
        .with_context(|| format!("failed to execute: {program}"))?;
    Ok(ExecResult::from(output))
}

/// Check if a program is available on PATH.
#[must_use]
pub fn which(program: &str) -> bool {
    #[cfg(target_os = "windows")]
    let check = Command::new("where").arg(program).output();

    #[cfg(not(target_os = "windows"))]
    let check = Command::new("which").arg(program).output();

    check.is_ok_and(|o| o.status.success())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Helper: run a simple echo command cross-platform.
    fn echo_result(msg: &str) -> Result<ExecResult> {
        #[cfg(windows)]
        {
            run("cmd", &["/C", "echo", msg])
        }
        #[cfg(not(windows))]
        {
            run("echo", &[msg])
        }
    }

    #[test]
    fn run_echo() {
        let result = echo_result("hello").unwrap();
        assert!(result.success, "echo command should succeed");
        assert_eq!(result.stdout.trim(), "hello");
    }

    #[test]
    fn run_failure() {
        #[cfg(windows)]
        let result = run("cmd", &["/C", "exit", "1"]);
        #[cfg(not(windows))]
        let result = run("false", &[]);
        assert!(result.is_err(), "non-zero exit should produce an error");
    }

    #[test]
    fn run_unchecked_failure() {
        #[cfg(windows)]
        let result = run_unchecked("cmd", &["/C", "exit", "1"]).unwrap();
        #[cfg(not(windows))]
        let result = run_unchecked("false", &[]).unwrap();
        assert!(!result.success, "non-zero exit should set success=false");
    }

    #[test]
    fn which_finds_known_program() {
        #[cfg(windows)]
        assert!(which("cmd"), "cmd should be found on Windows");
        #[cfg(not(windows))]
        assert!(which("echo"), "echo should be found on Unix");
    }

    #[test]
    fn which_missing_program() {
        assert!(
            !which("this-program-does-not-exist-12345"),
            "non-existent program should not be found"
        );
    }

    #[test]
    fn combined_output_joins_streams() {
        let result = ExecResult {
            stdout: "out\n".to_string(),
            stderr: "err\n".to_string(),
            success: false,
            code: Some(1),
        };
        assert_eq!(result.combined_output(), "out\nerr");
    }

    #[test]
    fn combined_output_single_stream() {
        let result = ExecResult {
            stdout: String::new(),
            stderr: "err".to_string(),
            success: false,
            code: Some(1),
        };
        assert_eq!(result.combined_output(), "err");
    }
}
