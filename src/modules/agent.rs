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

//! Linux agent lifecycle on the machine the tool runs on.
//!
//! Everything here goes through the [`CommandRunner`] in the module context,
//! including the existence checks, so a run can be scripted end to end.

use crate::client::Method;
use crate::config::ConnectionArgs;
use crate::connection::{CommandResult, CommandRunner};
use crate::error::{CohesityError, Result};
use crate::modules::common::connection_args;
use crate::reconcile::{
    Classification, DesiredState, ModuleContext, OnTimeout, Outcome, PollPlan, ResourceKind, ResourcePolicy,
    StatusSnapshot, StatusValue, Submission,
};
use crate::tasks::TaskRequestType;
use expanduser::expanduser;
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

pub const MODULE: &str = "cohesity_agent";

const POLL_SECS: u64 = 5;
const DEFAULT_INSTALLER_NAME: &str = "cohesity-agent-installer";
const PARTIAL_INSTALL: &str = "Cohesity Agent is partially installed";

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatingSystem {
    RedHat,
    CentOS,
    Debian,
    Ubuntu,
    #[serde(rename = "SLES")]
    Sles,
}

impl OperatingSystem {
    fn package_type(&self) -> &'static str {
        match self {
            OperatingSystem::RedHat | OperatingSystem::CentOS => "kRPM",
            OperatingSystem::Sles => "kSuseRPM",
            OperatingSystem::Debian | OperatingSystem::Ubuntu => "kDEB",
        }
    }

    fn uses_dpkg(&self) -> bool {
        matches!(self, OperatingSystem::Debian | OperatingSystem::Ubuntu)
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct AgentTask {
    pub name: Option<String>,
    #[serde(default)]
    pub state: DesiredState,
    pub download_location: Option<String>,
    #[serde(default = "service_account")]
    pub service_user: String,
    #[serde(default = "service_account")]
    pub service_group: String,
    #[serde(default = "yes")]
    pub create_user: bool,
    #[serde(default)]
    pub file_based: bool,
    #[serde(default)]
    pub native_package: bool,
    pub download_uri: Option<String>,
    pub operating_system: Option<OperatingSystem>,
    #[serde(default = "one")]
    pub wait_minutes: u64,
    pub cluster: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub domain: Option<String>,
    pub validate_certs: Option<bool>,
}

fn service_account() -> String {
    String::from("cohesityagent")
}

fn yes() -> bool {
    true
}

fn one() -> u64 {
    1
}

impl AgentTask {
    pub fn connection(&self) -> ConnectionArgs {
        connection_args!(self)
    }

    pub fn evaluate(&self) -> AgentAction {
        AgentAction { args: self.clone(), paths: AgentPaths::default() }
    }
}

/// Where an installed agent lives on the host.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentPaths {
    pub init_script: PathBuf,
    pub install_dir: PathBuf,
}

impl Default for AgentPaths {
    fn default() -> Self {
        Self {
            init_script: PathBuf::from("/etc/init.d/cohesity-agent"),
            install_dir: PathBuf::from("/etc/cohesity-agent"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AgentStatus {
    NotInstalled,
    /// Leftovers of an install that cannot report a version.
    Unknown,
    Installed(String),
}

impl StatusValue for AgentStatus {
    fn classify(&self, desired: DesiredState) -> Classification {
        match (self, desired) {
            (AgentStatus::NotInstalled, DesiredState::Absent) => Classification::Satisfied,
            (AgentStatus::NotInstalled, _) => Classification::Unsatisfied,
            (AgentStatus::Unknown, _) => Classification::Ambiguous(String::from(PARTIAL_INSTALL)),
            (AgentStatus::Installed(_), DesiredState::Absent) => Classification::Unsatisfied,
            (AgentStatus::Installed(_), _) => Classification::Satisfied,
        }
    }

    fn label(&self) -> String {
        match self {
            AgentStatus::NotInstalled => String::from("absent"),
            AgentStatus::Unknown => String::from("unknown"),
            AgentStatus::Installed(version) => version.clone(),
        }
    }
}

/// The last word of the first line starting with `Version`.
pub fn parse_version(out: &str) -> Option<String> {
    out.lines()
        .find(|line| line.starts_with("Version"))
        .and_then(|line| line.split_whitespace().last())
        .map(|v| v.to_string())
}

/// File name from a `content-disposition` header value.
fn disposition_filename(header: Option<&str>) -> String {
    header
        .and_then(|h| h.split('=').nth(1))
        .map(|name| name.trim().trim_matches('"').to_string())
        .filter(|name| !name.is_empty() && !name.contains('/'))
        .unwrap_or_else(|| String::from(DEFAULT_INSTALLER_NAME))
}

fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes).iter().map(|b| format!("{:02x}", b)).collect()
}

fn quote(path: &Path) -> String {
    shlex::try_quote(&path.to_string_lossy())
        .map(|q| q.into_owned())
        .unwrap_or_else(|_| path.to_string_lossy().into_owned())
}

fn check(result: CommandResult, msg: &str) -> Result<CommandResult> {
    if result.is_ok() {
        return Ok(result);
    }
    let details = match result.problem_lines() {
        lines if lines.is_empty() => format!("'{}' exited with {}: {}", result.cmd, result.rc, result.out),
        lines => lines.join("\n"),
    };
    Err(CohesityError::TaskFailed { msg: msg.to_string(), details })
}

struct Installer {
    file: PathBuf,
    sha256: String,
}

#[derive(Debug, Clone)]
pub struct AgentAction {
    args: AgentTask,
    paths: AgentPaths,
}

impl AgentAction {
    pub fn with_paths(mut self, paths: AgentPaths) -> Self {
        self.paths = paths;
        self
    }

    fn exists(&self, commands: &dyn CommandRunner, flag: &str, path: &Path) -> Result<bool> {
        Ok(commands.run(&format!("test {} {}", flag, quote(path)))?.is_ok())
    }

    fn status(&self, commands: &dyn CommandRunner) -> Result<AgentStatus> {
        if self.exists(commands, "-x", &self.paths.init_script)? {
            let out = commands.run(&format!("{} version", quote(&self.paths.init_script)))?;
            return Ok(parse_version(&out.out).map(AgentStatus::Installed).unwrap_or(AgentStatus::Unknown));
        }
        if self.exists(commands, "-d", &self.paths.install_dir)? {
            return Ok(AgentStatus::Unknown);
        }
        Ok(AgentStatus::NotInstalled)
    }

    /// Agent processes left running by an install that was removed by hand.
    fn kill_orphans(&self, commands: &dyn CommandRunner) -> Result<()> {
        let found = commands.run("ps -aux | grep crux/bin/linux_agent | grep -v grep | awk '{print $2}'")?;
        for pid in found.out.lines().map(str::trim).filter(|p| !p.is_empty()) {
            let killed = commands.run(&format!("kill -9 {}", pid))?;
            if !killed.is_ok() && !killed.out.contains("No such process") {
                return Err(CohesityError::TaskFailed {
                    msg: String::from("Failed to remove an orphaned Cohesity Agent service which is still running"),
                    details: format!("process {}: {}", pid, killed.out),
                });
            }
        }
        Ok(())
    }

    fn download_path(&self) -> String {
        if let Some(uri) = self.args.download_uri.as_ref().filter(|u| !u.is_empty()) {
            return uri.clone();
        }
        let package = match (self.args.native_package, self.args.operating_system) {
            (true, Some(os)) => os.package_type(),
            _ => "kScript",
        };
        format!("/public/physicalAgents/download?hostType=kLinux&pkgType={}", package)
    }

    fn download(&self, ctx: &ModuleContext, dir: &Path) -> Result<Installer> {
        let response = ctx.session.execute(Method::Get, &self.download_path(), None)?;
        if !response.is_success() {
            return Err(CohesityError::Http {
                status: response.status,
                message: format!("Failed to download the Cohesity Agent: {}", response.server_message()),
            });
        }
        let file = dir.join(disposition_filename(response.header("content-disposition")));
        fs::write(&file, &response.body)?;
        fs::set_permissions(&file, fs::Permissions::from_mode(0o755))?;
        ctx.output.info(&format!("downloaded {} ({} bytes)", file.display(), response.body.len()));
        Ok(Installer { file, sha256: sha256_hex(&response.body) })
    }

    /// Unpack a script installer next to itself and return the directory.
    fn extract(&self, commands: &dyn CommandRunner, installer: &Installer) -> Result<PathBuf> {
        let parent = installer.file.parent().unwrap_or_else(|| Path::new("."));
        let target = parent.join("install_files");
        fs::create_dir_all(&target)?;
        let cmd = format!("{} --nox11 --noexec --target {}", quote(&installer.file), quote(&target));
        check(commands.run(&cmd)?, PARTIAL_INSTALL)?;
        Ok(target)
    }

    fn install_options(&self) -> String {
        let mut opts = vec![format!("--create-user {}", u8::from(self.args.create_user))];
        if !self.args.service_user.is_empty() {
            opts.push(format!("--service-user {}", self.args.service_user));
        }
        if !self.args.service_group.is_empty() {
            opts.push(format!("--service-group {}", self.args.service_group));
        }
        if self.args.file_based {
            opts.push(String::from("--skip-lvm-check"));
        }
        opts.join(" ")
    }

    fn install(&self, ctx: &ModuleContext) -> Result<Submission> {
        let commands = ctx.commands.as_ref();
        self.kill_orphans(commands)?;

        let workspace = Workspace::open(self.args.download_location.as_deref())?;
        let installer = self.download(ctx, workspace.path())?;

        match self.args.operating_system.filter(|_| self.args.native_package) {
            Some(os) => {
                let tool = if os.uses_dpkg() { "dpkg -i" } else { "rpm -i" };
                let cmd = format!("{} {}", tool, quote(&installer.file));
                check(commands.run_with_env(&cmd, &[("COHESITYUSER", self.args.service_user.as_str())])?, PARTIAL_INSTALL)?;
            }
            None => {
                let target = self.extract(commands, &installer)?;
                let cmd = format!("{}/setup.sh --install --yes {}", quote(&target), self.install_options());
                let result = check(commands.run(&cmd)?, PARTIAL_INSTALL);
                workspace.discard(ctx, &target);
                result?;
            }
        }

        Ok(Submission::new()
            .with_data("filename", json!(installer.file.to_string_lossy()))
            .with_data("sha256", json!(installer.sha256)))
    }

    fn uninstall(&self, ctx: &ModuleContext) -> Result<Submission> {
        let commands = ctx.commands.as_ref();

        if let Some(os) = self.args.operating_system.filter(|_| self.args.native_package) {
            let cmd = if os.uses_dpkg() { "dpkg -P cohesity-agent" } else { "rpm -e cohesity-agent" };
            check(commands.run(cmd)?, "Failed to uninstall cohesity agent")?;
            let cmd = format!("rm -rf {}", quote(&self.paths.install_dir));
            check(commands.run(&cmd)?, "The cohesity agent is uninstalled but failed to remove the install directory")?;
            return Ok(Submission::new());
        }

        let uninstall = "setup.sh --full-uninstall --yes";
        let installed_setup = self.paths.install_dir.join("setup.sh");
        if self.exists(commands, "-x", &installed_setup)? {
            check(commands.run(&format!("{} --full-uninstall --yes", quote(&installed_setup)))?, PARTIAL_INSTALL)?;
            return Ok(Submission::new());
        }

        let workspace = Workspace::open(self.args.download_location.as_deref())?;
        let installer = self.download(ctx, workspace.path())?;
        let target = self.extract(commands, &installer)?;
        let result = check(commands.run(&format!("{}/{}", quote(&target), uninstall))?, PARTIAL_INSTALL);
        workspace.discard(ctx, &target);
        result?;
        Ok(Submission::new().with_data("sha256", json!(installer.sha256)))
    }
}

/// Download directory: the one asked for, or a temporary one removed on drop.
struct Workspace {
    dir: PathBuf,
    temp: Option<tempfile::TempDir>,
}

impl Workspace {
    fn open(location: Option<&str>) -> Result<Self> {
        match location.filter(|l| !l.is_empty()) {
            Some(location) => {
                let dir = expanduser(location)?;
                fs::create_dir_all(&dir)?;
                Ok(Self { dir, temp: None })
            }
            None => {
                let temp = tempfile::Builder::new().prefix("jetp-cohesity.").tempdir()?;
                Ok(Self { dir: temp.path().to_path_buf(), temp: Some(temp) })
            }
        }
    }

    fn path(&self) -> &Path {
        &self.dir
    }

    /// Remove extracted files from a directory the user chose.
    fn discard(&self, ctx: &ModuleContext, extracted: &Path) {
        if self.temp.is_none() {
            if let Err(e) = fs::remove_dir_all(extracted) {
                ctx.output.warning(&format!("could not remove {}: {}", extracted.display(), e));
            }
        }
    }
}

impl ResourcePolicy for AgentAction {
    type Status = AgentStatus;

    fn kind(&self) -> ResourceKind {
        ResourceKind::Agent
    }

    fn target(&self) -> String {
        self.args.name.clone().unwrap_or_else(|| String::from("cohesity-agent"))
    }

    fn desired(&self) -> DesiredState {
        self.args.state
    }

    fn validate(&self) -> Result<()> {
        match self.args.state {
            DesiredState::Present | DesiredState::Absent => {}
            other => return Err(CohesityError::Parameter(format!("state must be present or absent, not {}", other))),
        }
        if self.args.native_package && self.args.operating_system.is_none() {
            return Err(CohesityError::Parameter(String::from("operating_system is required when native_package is set")));
        }
        Ok(())
    }

    fn probe(&self, ctx: &ModuleContext) -> Result<StatusSnapshot<AgentStatus>> {
        let status = self.status(ctx.commands.as_ref())?;
        let version = match &status {
            AgentStatus::Installed(v) => json!(v),
            AgentStatus::Unknown => json!("unknown"),
            AgentStatus::NotInstalled => json!(false),
        };
        Ok(StatusSnapshot::new(status).with_detail("version", version))
    }

    fn submit(&self, ctx: &ModuleContext, action: TaskRequestType, _snapshot: &StatusSnapshot<AgentStatus>) -> Result<Submission> {
        match action {
            TaskRequestType::Create => self.install(ctx),
            TaskRequestType::Remove => self.uninstall(ctx),
            other => Err(CohesityError::Other(format!("the agent module does not support {}", other))),
        }
    }

    fn poll_plan(&self, _action: TaskRequestType) -> Option<PollPlan> {
        Some(PollPlan::new(POLL_SECS, self.args.wait_minutes, OnTimeout::Fail))
    }

    fn message(&self, outcome: Outcome, _status: Option<&AgentStatus>) -> String {
        let msg = match outcome {
            Outcome::Unchanged if self.args.state == DesiredState::Absent => "Agent is currently not installed.  No changes.",
            Outcome::Unchanged => "Agent is currently installed.  No changes",
            Outcome::WouldChange(TaskRequestType::Remove) => "Agent is currently installed.  This action would uninstall the Agent.",
            Outcome::WouldChange(_) => "Agent is currently not installed.  This action would install the Agent.",
            Outcome::Submitted(TaskRequestType::Remove) | Outcome::Completed(TaskRequestType::Remove) => "Successfully Removed the Cohesity agent",
            Outcome::Submitted(_) | Outcome::Completed(_) => "Successfully Installed the Cohesity agent",
            Outcome::Accepted(_) | Outcome::TimedOut(_) | Outcome::Failed(_) => PARTIAL_INSTALL,
        };
        msg.to_string()
    }
}
