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

//! Local command execution.
//!
//! All commands are wrapped with `sh -c "LANG=C ..."` so installer output
//! is parseable regardless of the host locale.

use crate::connection::command::{CommandResult, CommandRunner};
use crate::error::{CohesityError, Result};
use std::process::Command;

pub struct LocalCommandRunner;

impl LocalCommandRunner {
    pub fn new() -> Self {
        LocalCommandRunner
    }
}

impl Default for LocalCommandRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRunner for LocalCommandRunner {
    fn run(&self, cmd: &str) -> Result<CommandResult> {
        self.run_with_env(cmd, &[])
    }

    fn run_with_env(&self, cmd: &str, env: &[(&str, &str)]) -> Result<CommandResult> {
        let mut base = Command::new("sh");
        let command = base
            .arg("-c")
            .arg(format!("LANG=C {}", cmd))
            .envs(env.iter().map(|(k, v)| (*k, *v)));

        let output = command.output()
            .map_err(|e| CohesityError::Io(std::io::Error::new(e.kind(), format!("failed to run '{}': {}", cmd, e))))?;

        let mut out = convert_out(&output.stdout, &output.stderr);
        trim_newlines(&mut out);
        Ok(CommandResult {
            cmd: cmd.to_string(),
            out,
            // killed by a signal
            rc: output.status.code().unwrap_or(418),
        })
    }
}

pub fn convert_out(output: &[u8], err: &[u8]) -> String {
    let mut base = String::from_utf8_lossy(output).into_owned();
    let rest = String::from_utf8_lossy(err);
    if !rest.is_empty() {
        if !base.is_empty() && !base.ends_with('\n') {
            base.push('\n');
        }
        base.push_str(&rest);
    }
    base
}

fn trim_newlines(s: &mut String) {
    if s.ends_with('\n') {
        s.pop();
        if s.ends_with('\r') {
            s.pop();
        }
    }
}
