//! External process invocation with captured output.
//!
//! Every pipeline step shells out to an external tool (cargo, the node
//! binary, the container engine). `Cmd` wraps `std::process::Command` so
//! that a failing command always surfaces the program, its arguments, the
//! exit status and stderr verbatim.
//!
//! # Example
//!
//! ```rust,ignore
//! use node_image_builder::process::Cmd;
//!
//! let result = Cmd::new("cargo")
//!     .args(["build", "--release"])
//!     .error_msg("cargo build failed")
//!     .run()?;
//! println!("{}", result.stdout);
//! ```

use anyhow::{bail, Context, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Builder for a synchronous external command.
#[derive(Debug)]
pub struct Cmd {
    program: OsString,
    args: Vec<OsString>,
    current_dir: Option<PathBuf>,
    allow_fail: bool,
    error_msg: Option<String>,
}

/// Captured result of a finished command.
#[derive(Debug)]
pub struct CmdResult {
    /// Exit code, if the process exited normally.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CmdResult {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl Cmd {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            allow_fail: false,
            error_msg: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn arg_path(mut self, path: &Path) -> Self {
        self.args.push(path.as_os_str().to_os_string());
        self
    }

    pub fn current_dir(mut self, dir: &Path) -> Self {
        self.current_dir = Some(dir.to_path_buf());
        self
    }

    /// A non-zero exit is not an error; the caller inspects the result.
    pub fn allow_fail(mut self) -> Self {
        self.allow_fail = true;
        self
    }

    /// First line of the error reported on a non-zero exit.
    pub fn error_msg(mut self, msg: impl Into<String>) -> Self {
        self.error_msg = Some(msg.into());
        self
    }

    pub fn run(self) -> Result<CmdResult> {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }

        let command_line = self.command_line();
        let output = command
            .output()
            .with_context(|| format!("failed to execute '{}'", command_line))?;

        let result = CmdResult {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !output.status.success() && !self.allow_fail {
            let msg = self
                .error_msg
                .unwrap_or_else(|| "command failed".to_string());
            bail!(
                "{}\n  Command: {}\n  Exit code: {}\n  stderr: {}",
                msg,
                command_line,
                result
                    .code
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "killed by signal".to_string()),
                result.stderr.trim()
            );
        }

        Ok(result)
    }

    fn command_line(&self) -> String {
        let mut line = self.program.to_string_lossy().into_owned();
        for arg in &self.args {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_captures_stdout() {
        let result = Cmd::new("echo").arg("hello").run().unwrap();
        assert!(result.success());
        assert_eq!(result.stdout.trim(), "hello");
    }

    #[test]
    fn test_allow_fail_returns_result() {
        let result = Cmd::new("sh")
            .args(["-c", "exit 3"])
            .allow_fail()
            .run()
            .unwrap();
        assert!(!result.success());
        assert_eq!(result.code, Some(3));
    }

    #[test]
    fn test_failure_reports_command_and_stderr() {
        let err = Cmd::new("sh")
            .args(["-c", "echo boom >&2; exit 2"])
            .error_msg("step failed")
            .run()
            .unwrap_err();

        let msg = err.to_string();
        assert!(msg.contains("step failed"));
        assert!(msg.contains("sh -c"));
        assert!(msg.contains("Exit code: 2"));
        assert!(msg.contains("boom"));
    }

    #[test]
    fn test_missing_program_is_an_error() {
        let err = Cmd::new("definitely_not_a_real_command_12345")
            .run()
            .unwrap_err();
        assert!(err.to_string().contains("failed to execute"));
    }
}
