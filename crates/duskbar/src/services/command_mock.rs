//! Scripted [`CommandRunner`] for tests.
//!
//! Responses are matched by exact command first, then by the longest
//! registered prefix. Unmatched synchronous commands fail, which is how the
//! real gateway reports a missing tool.

use std::cell::RefCell;

use super::command::{CommandOutput, CommandRunner};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Sync,
    Async,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub command: String,
    pub mode: Mode,
}

#[derive(Default)]
pub struct RecordingRunner {
    log: RefCell<Vec<Invocation>>,
    responses: RefCell<Vec<(String, CommandOutput)>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer commands starting with `prefix` with `stdout` (replacing any
    /// earlier answer for the same prefix).
    pub fn respond(&self, prefix: &str, stdout: &str) {
        self.set(prefix, CommandOutput::ok(stdout));
    }

    /// Make commands starting with `prefix` fail.
    pub fn fail(&self, prefix: &str) {
        self.set(prefix, CommandOutput::failed());
    }

    fn set(&self, prefix: &str, output: CommandOutput) {
        let mut responses = self.responses.borrow_mut();
        responses.retain(|(p, _)| p != prefix);
        responses.push((prefix.to_string(), output));
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.log.borrow().clone()
    }

    pub fn async_commands(&self) -> Vec<String> {
        self.commands_with(Mode::Async)
    }

    pub fn sync_commands(&self) -> Vec<String> {
        self.commands_with(Mode::Sync)
    }

    fn commands_with(&self, mode: Mode) -> Vec<String> {
        self.log
            .borrow()
            .iter()
            .filter(|i| i.mode == mode)
            .map(|i| i.command.clone())
            .collect()
    }

    /// Number of recorded commands (either mode) starting with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.log
            .borrow()
            .iter()
            .filter(|i| i.command.starts_with(prefix))
            .count()
    }

    pub fn clear_log(&self) {
        self.log.borrow_mut().clear();
    }

    fn lookup(&self, command: &str) -> CommandOutput {
        let responses = self.responses.borrow();
        if let Some((_, out)) = responses.iter().find(|(p, _)| p == command) {
            return out.clone();
        }
        responses
            .iter()
            .filter(|(p, _)| command.starts_with(p.as_str()))
            .max_by_key(|(p, _)| p.len())
            .map(|(_, out)| out.clone())
            .unwrap_or_default()
    }
}

impl CommandRunner for RecordingRunner {
    fn run_sync(&self, command: &str) -> CommandOutput {
        self.log.borrow_mut().push(Invocation {
            command: command.to_string(),
            mode: Mode::Sync,
        });
        self.lookup(command)
    }

    fn run_async(&self, command: &str) {
        self.log.borrow_mut().push(Invocation {
            command: command.to_string(),
            mode: Mode::Async,
        });
    }
}
