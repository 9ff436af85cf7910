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

use crate::config::ClusterConfig;
use crate::error::{CohesityError, Result};
use crate::util::yaml::{blend_variables, parse_extra_vars};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "jetp-cohesity", version, about = "Idempotent lifecycle automation for Cohesity clusters", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub connection: ConnectionFlags,

    /// Report what would change without changing it
    #[arg(long, global = true)]
    pub check: bool,

    /// Increase output detail (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Connection defaults. Unset flags fall back to COHESITY_CLUSTER,
/// COHESITY_USERNAME, COHESITY_PASSWORD and COHESITY_DOMAIN.
#[derive(Args, Debug, Default)]
pub struct ConnectionFlags {
    #[arg(long, global = true)]
    pub cluster: Option<String>,

    #[arg(long, global = true)]
    pub username: Option<String>,

    #[arg(long, global = true)]
    pub password: Option<String>,

    #[arg(long, global = true)]
    pub domain: Option<String>,

    /// Skip TLS certificate validation
    #[arg(long, global = true)]
    pub insecure: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one module and print its JSON result
    Module(ModuleArgs),
    /// Run a task file
    Run(RunArgs),
}

#[derive(Args, Debug)]
pub struct ModuleArgs {
    /// Module name, e.g. cohesity_job
    pub name: String,

    /// JSON or YAML file holding the module arguments
    #[arg(long)]
    pub args: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    pub tasks: PathBuf,

    /// Extra template variables: key=value or @vars.yml
    #[arg(short = 'e', long = "extra-vars")]
    pub extra_vars: Vec<String>,
}

impl Cli {
    /// The run configuration: flags first, then the environment.
    pub fn config(&self) -> Result<ClusterConfig> {
        let mut config = ClusterConfig::new()
            .check_mode(self.check)
            .verbosity(u32::from(self.verbose));
        let flags = &self.connection;
        config.cluster = flags.cluster.clone();
        config.username = flags.username.clone();
        config.password = flags.password.clone();
        config.domain = flags.domain.clone();
        if flags.insecure {
            config = config.insecure();
        }
        if let Commands::Run(run) = &self.command {
            let mut vars = serde_yaml::Value::Mapping(Default::default());
            for arg in &run.extra_vars {
                blend_variables(&mut vars, parse_extra_vars(arg)?);
            }
            config = config.extra_vars(vars);
        }
        Ok(config.from_env())
    }
}

impl ModuleArgs {
    /// The argument document, or an empty one when no file was given.
    pub fn load(&self) -> Result<Value> {
        let path = match &self.args {
            Some(path) => path,
            None => return Ok(Value::Object(Default::default())),
        };
        let contents = std::fs::read_to_string(path)
            .map_err(|e| CohesityError::Config(format!("unable to read module arguments {}: {}", path.display(), e)))?;
        // YAML is a superset of JSON
        let args: Value = serde_yaml::from_str(&contents)?;
        Ok(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_module_command() {
        let cli = Cli::try_parse_from([
            "jetp-cohesity", "module", "cohesity_job", "--cluster", "lab.example.com", "--check", "--insecure",
        ]).unwrap();
        let config = cli.config().unwrap();
        assert_eq!(config.cluster.as_deref(), Some("lab.example.com"));
        assert!(config.check_mode);
        assert!(!config.validate_certs);
        assert!(matches!(cli.command, Commands::Module(ref m) if m.name == "cohesity_job"));
    }

    #[test]
    fn test_run_command_merges_extra_vars() {
        let cli = Cli::try_parse_from([
            "jetp-cohesity", "run", "tasks.yml", "-e", "job=nightly", "-e", "wait=5", "-vv",
        ]).unwrap();
        let config = cli.config().unwrap();
        assert_eq!(config.extra_vars["job"], "nightly");
        assert_eq!(config.extra_vars["wait"], 5);
        assert_eq!(config.verbosity, 2);
    }

    #[test]
    fn test_module_args_accept_json() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"name": "nightly", "state": "started"}}"#).unwrap();
        let args = ModuleArgs { name: String::from("cohesity_job"), args: Some(file.path().to_path_buf()) };
        assert_eq!(args.load().unwrap()["state"], "started");
    }
}
