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

use clap::Parser;
use jetpack_cohesity::cli::{Cli, Commands};
use jetpack_cohesity::util::yaml::show_yaml_error_in_context;
use jetpack_cohesity::{CohesityError, ModuleRunner, Result, TerminalOutputHandler};
use serde_json::json;
use std::process;
use std::sync::Arc;

fn main() {
    let cli = Cli::parse();
    let code = match liftoff(&cli) {
        Ok(code) => code,
        Err(e) => {
            report_failure(&cli, &e);
            1
        }
    };
    process::exit(code)
}

fn liftoff(cli: &Cli) -> Result<i32> {
    let config = cli.config()?;
    match &cli.command {
        Commands::Module(module) => {
            let runner = ModuleRunner::new(config);
            let result = runner.run_module(&module.name, module.load()?)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(0)
        }
        Commands::Run(run) => {
            let verbosity = config.verbosity;
            let runner = ModuleRunner::new(config)
                .with_output_handler(Arc::new(TerminalOutputHandler::new(verbosity)));
            let tasks = match runner.load_task_file(&run.tasks) {
                Ok(tasks) => tasks,
                Err(CohesityError::Yaml(e)) => {
                    let contents = std::fs::read_to_string(&run.tasks).unwrap_or_default();
                    show_yaml_error_in_context(&e, &run.tasks, &contents);
                    return Ok(1);
                }
                Err(e) => return Err(e),
            };
            let result = runner.run_tasks(&run.tasks.display().to_string(), &tasks);
            Ok(if result.success { 0 } else { 1 })
        }
    }
}

fn report_failure(cli: &Cli, e: &CohesityError) {
    match cli.command {
        Commands::Module(_) => {
            let mut failure = json!({"failed": true, "changed": false, "msg": e.msg()});
            if let Some(details) = e.error_details() {
                failure["error_details"] = json!(details);
            }
            println!("{}", failure);
        }
        Commands::Run(_) => eprintln!("ERROR: {}", e),
    }
}
