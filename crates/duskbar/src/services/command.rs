//! Command gateway: the only place that spawns external processes.
//!
//! Two modes:
//! - `run_sync` blocks the main loop until the process exits and returns its
//!   stdout. Used for state queries the UI needs right away.
//! - `run_async` starts the process and returns immediately. Used for
//!   mutations; callers follow up with a delayed `run_sync` check.
//!
//! Commands are complete shell strings executed through `sh -c`. The gateway
//! never escapes anything itself: any interpolated value that did not come
//! from us (SSIDs, passwords, device names) must go through [`shell_quote`].

use std::process::{Command, Stdio};
use std::thread;

use tracing::{debug, trace, warn};

/// Result of a synchronous command.
///
/// A non-zero exit and a spawn failure look the same to callers: both are
/// `success == false` with empty stdout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: Vec<u8>,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
        }
    }

    pub fn failed() -> Self {
        Self::default()
    }

    /// Stdout decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Stdout text, or `None` if the command failed.
    pub fn text_if_success(&self) -> Option<String> {
        self.success.then(|| self.text())
    }
}

/// Executes shell command strings.
pub trait CommandRunner {
    fn run_sync(&self, command: &str) -> CommandOutput;
    fn run_async(&self, command: &str);
}

/// Production runner backed by `sh -c`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellRunner;

impl CommandRunner for ShellRunner {
    fn run_sync(&self, command: &str) -> CommandOutput {
        trace!("ShellRunner: sync `{}`", command);
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .output();

        match output {
            Ok(output) if output.status.success() => CommandOutput::ok(output.stdout),
            Ok(output) => {
                debug!(
                    "ShellRunner: `{}` exited with {}: {}",
                    command,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                );
                CommandOutput::failed()
            }
            Err(e) => {
                warn!("ShellRunner: failed to spawn `{}`: {}", command, e);
                CommandOutput::failed()
            }
        }
    }

    fn run_async(&self, command: &str) {
        trace!("ShellRunner: async `{}`", command);
        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        match child {
            Ok(mut child) => {
                // Reap off the main loop so finished children don't linger as zombies.
                let command = command.to_string();
                thread::spawn(move || match child.wait() {
                    Ok(status) if !status.success() => {
                        debug!("ShellRunner: `{}` exited with {}", command, status);
                    }
                    Ok(_) => {}
                    Err(e) => debug!("ShellRunner: wait on `{}` failed: {}", command, e),
                });
            }
            Err(e) => warn!("ShellRunner: failed to spawn `{}`: {}", command, e),
        }
    }
}

/// Quote a value for safe interpolation into a shell command.
///
/// Wraps the value in single quotes and rewrites each embedded `'` as `'\''`.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_quote_plain() {
        assert_eq!(shell_quote("HomeNet"), "'HomeNet'");
    }

    #[test]
    fn test_shell_quote_spaces_and_metacharacters() {
        assert_eq!(shell_quote("Cafe WiFi 5G"), "'Cafe WiFi 5G'");
        assert_eq!(shell_quote("a;rm -rf ~ $(id) `x`"), "'a;rm -rf ~ $(id) `x`'");
        assert_eq!(shell_quote("say \"hi\""), "'say \"hi\"'");
    }

    #[test]
    fn test_shell_quote_embedded_single_quotes() {
        assert_eq!(shell_quote("Bob's iPhone"), r"'Bob'\''s iPhone'");
        assert_eq!(shell_quote("''"), r"''\'''\'''");
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn test_shell_quote_survives_real_shell() {
        let runner = ShellRunner;
        for value in ["Bob's iPhone", "p@ss w'o\"rd $HOME", "`uname`"] {
            let out = runner.run_sync(&format!("printf %s {}", shell_quote(value)));
            assert!(out.success);
            assert_eq!(out.text(), value);
        }
    }

    #[test]
    fn test_run_sync_failure_has_empty_output() {
        let out = ShellRunner.run_sync("echo partial; exit 3");
        assert!(!out.success);
        assert!(out.stdout.is_empty());
        assert_eq!(out.text_if_success(), None);
    }

    #[test]
    fn test_run_sync_missing_binary_is_failure() {
        let out = ShellRunner.run_sync("duskbar-definitely-not-installed --flag");
        assert_eq!(out, CommandOutput::failed());
    }

    #[test]
    fn test_text_decodes_lossily() {
        let out = CommandOutput::ok(vec![b'o', b'k', 0xff]);
        assert_eq!(out.text(), "ok\u{fffd}");
    }
}
