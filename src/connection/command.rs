// Jetpack
// Copyright (C) Riff Labs Limited <team@riff.cc>
// Based on Jetporch by Michael DeHaan <michael@michaeldehaan.net> + contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// long with this program.  If not, see <http://www.gnu.org/licenses/>.

use crate::error::Result;

#[derive(Debug, Clone, PartialEq)]
pub struct CommandResult {
    pub cmd: String,
    pub out: String,
    pub rc: i32,
}

impl CommandResult {
    pub fn is_ok(&self) -> bool {
        self.rc == 0
    }

    /// Lines an installer printed as errors or warnings.
    pub fn problem_lines(&self) -> Vec<String> {
        self.out.lines()
            .filter(|line| line.contains("Error:") || line.contains("WARNING:"))
            .map(|line| line.trim().to_string())
            .collect()
    }
}

/// Runs shell commands on the machine the tool executes on.
pub trait CommandRunner: Send + Sync {
    fn run(&self, cmd: &str) -> Result<CommandResult>;

    /// Like `run`, with extra environment variables.
    fn run_with_env(&self, cmd: &str, env: &[(&str, &str)]) -> Result<CommandResult>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_problem_lines() {
        let result = CommandResult {
            cmd: String::from("./setup.sh --install --yes"),
            out: String::from("Verifying archive\nError: /opt has less than 1GB free\nWARNING: lvm tools missing\nDone"),
            rc: 1,
        };
        assert!(!result.is_ok());
        assert_eq!(result.problem_lines(), vec![
            String::from("Error: /opt has less than 1GB free"),
            String::from("WARNING: lvm tools missing"),
        ]);
    }
}
