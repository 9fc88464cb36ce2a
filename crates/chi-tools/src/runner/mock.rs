//! Mock Command Runner
//!
//! For tests and dry runs. Nothing is executed: commands are recorded and
//! answered from canned rules.

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use super::{CommandOutput, CommandRunner};
use crate::error::{Result, ToolError};

#[derive(Clone, Debug)]
enum Canned {
    Output(CommandOutput),
    TimedOut,
}

/// Command runner that records calls instead of executing them
#[derive(Debug, Default)]
pub struct MockRunner {
    programs: HashSet<String>,
    rules: Vec<(String, Canned)>,
    calls: Mutex<Vec<String>>,
    spawned: Mutex<Vec<String>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend `program` is installed
    pub fn with_program(mut self, program: &str) -> Self {
        self.programs.insert(program.to_string());
        self
    }

    /// Answer commands whose command line starts with `prefix`.
    /// Earlier rules win; unmatched commands succeed with empty output.
    pub fn respond(mut self, prefix: &str, output: CommandOutput) -> Self {
        self.rules.push((prefix.to_string(), Canned::Output(output)));
        self
    }

    /// Make commands starting with `prefix` time out
    pub fn time_out(mut self, prefix: &str) -> Self {
        self.rules.push((prefix.to_string(), Canned::TimedOut));
        self
    }

    /// Command lines run so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Command lines spawned detached, in order
    pub fn spawned(&self) -> Vec<String> {
        self.spawned.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn answer(&self, line: String, timeout: Duration) -> Result<CommandOutput> {
        let canned = self
            .rules
            .iter()
            .find(|(prefix, _)| line.starts_with(prefix.as_str()))
            .map(|(_, canned)| canned.clone());
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.clone());

        match canned {
            Some(Canned::Output(output)) => Ok(output),
            Some(Canned::TimedOut) => Err(ToolError::Timeout {
                command: line,
                secs: timeout.as_secs(),
            }),
            None => Ok(CommandOutput::ok("")),
        }
    }
}

fn command_line(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait]
impl CommandRunner for MockRunner {
    fn which(&self, program: &str) -> Option<PathBuf> {
        self.programs
            .contains(program)
            .then(|| PathBuf::from("/usr/bin").join(program))
    }

    async fn run(&self, program: &str, args: &[&str], timeout: Duration) -> Result<CommandOutput> {
        self.answer(command_line(program, args), timeout)
    }

    async fn run_shell(&self, command: &str, timeout: Duration) -> Result<CommandOutput> {
        self.answer(command.to_string(), timeout)
    }

    fn spawn_detached(&self, program: &str, args: &[&str]) -> Result<()> {
        let line = command_line(program, args);
        if !self.programs.contains(program) && !program.starts_with('/') {
            return Err(ToolError::Spawn {
                program: program.to_string(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            });
        }
        self.spawned
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line);
        Ok(())
    }
}
