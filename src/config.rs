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

use crate::error::{CohesityError, Result};
use serde::Deserialize;

pub const DEFAULT_DOMAIN: &str = "LOCAL";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

pub const ENV_CLUSTER: &str = "COHESITY_CLUSTER";
pub const ENV_USERNAME: &str = "COHESITY_USERNAME";
pub const ENV_PASSWORD: &str = "COHESITY_PASSWORD";
pub const ENV_DOMAIN: &str = "COHESITY_DOMAIN";

/// Defaults shared by every module invocation in one run
#[derive(Clone, Debug)]
pub struct ClusterConfig {
    pub cluster: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub domain: Option<String>,
    pub validate_certs: bool,
    pub check_mode: bool,
    pub verbosity: u32,
    pub extra_vars: serde_yaml::Value,
    pub request_timeout_secs: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            cluster: None,
            username: None,
            password: None,
            domain: None,
            validate_certs: true,
            check_mode: false,
            verbosity: 0,
            extra_vars: serde_yaml::Value::Mapping(Default::default()),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl ClusterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cluster(mut self, cluster: impl Into<String>) -> Self {
        self.cluster = Some(cluster.into());
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn validate_certs(mut self, validate: bool) -> Self {
        self.validate_certs = validate;
        self
    }

    pub fn insecure(mut self) -> Self {
        self.validate_certs = false;
        self
    }

    pub fn check_mode(mut self, check: bool) -> Self {
        self.check_mode = check;
        self
    }

    pub fn verbosity(mut self, verbosity: u32) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn extra_vars(mut self, vars: serde_yaml::Value) -> Self {
        self.extra_vars = vars;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = secs;
        self
    }

    /// Fill any unset connection field from the COHESITY_* environment variables.
    pub fn from_env(self) -> Self {
        self.from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.cluster.is_none() {
            self.cluster = lookup(ENV_CLUSTER);
        }
        if self.username.is_none() {
            self.username = lookup(ENV_USERNAME);
        }
        if self.password.is_none() {
            self.password = lookup(ENV_PASSWORD);
        }
        if self.domain.is_none() {
            self.domain = lookup(ENV_DOMAIN);
        }
        self
    }

    /// Merge per-task connection arguments over these defaults.
    pub fn resolve(&self, args: &ConnectionArgs) -> Result<ResolvedConnection> {
        let cluster = args.cluster.clone().or_else(|| self.cluster.clone())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| CohesityError::Parameter(String::from("missing required argument: cluster")))?;
        let username = args.username.clone().or_else(|| self.username.clone())
            .filter(|u| !u.is_empty())
            .ok_or_else(|| CohesityError::Parameter(String::from("missing required argument: username")))?;
        let password = args.password.clone().or_else(|| self.password.clone())
            .ok_or_else(|| CohesityError::Parameter(String::from("missing required argument: password")))?;
        Ok(ResolvedConnection {
            cluster,
            username,
            password,
            domain: args.domain.clone().or_else(|| self.domain.clone()),
            validate_certs: args.validate_certs.unwrap_or(self.validate_certs),
            request_timeout_secs: self.request_timeout_secs,
        })
    }
}

/// Connection arguments a single task may carry.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct ConnectionArgs {
    pub cluster: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub domain: Option<String>,
    pub validate_certs: Option<bool>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedConnection {
    pub cluster: String,
    pub username: String,
    pub password: String,
    pub domain: Option<String>,
    pub validate_certs: bool,
    pub request_timeout_secs: u64,
}

impl ResolvedConnection {
    /// Key used to share one authenticated session between tasks.
    pub fn session_key(&self) -> String {
        format!("{}|{}|{}", self.cluster, self.username, self.domain.as_deref().unwrap_or(""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = ClusterConfig::new();
        assert!(config.validate_certs);
        assert!(!config.check_mode);
        assert_eq!(config.request_timeout_secs, DEFAULT_REQUEST_TIMEOUT_SECS);
    }

    #[test]
    fn test_task_arguments_override_defaults() {
        let config = ClusterConfig::new()
            .cluster("cohesity-01.example.com")
            .username("admin")
            .password("secret");
        let args = ConnectionArgs {
            cluster: Some(String::from("cohesity-02.example.com")),
            validate_certs: Some(false),
            ..Default::default()
        };
        let resolved = config.resolve(&args).unwrap();
        assert_eq!(resolved.cluster, "cohesity-02.example.com");
        assert_eq!(resolved.username, "admin");
        assert!(!resolved.validate_certs);
    }

    #[test]
    fn test_missing_cluster_is_a_parameter_error() {
        let config = ClusterConfig::new().username("admin").password("secret");
        let err = config.resolve(&ConnectionArgs::default()).unwrap_err();
        assert!(matches!(err, CohesityError::Parameter(_)));
    }

    #[test]
    fn test_environment_fills_only_unset_fields() {
        let config = ClusterConfig::new()
            .username("admin")
            .from_lookup(|key| match key {
                ENV_CLUSTER => Some(String::from("from-env")),
                ENV_USERNAME => Some(String::from("ignored")),
                _ => None,
            });
        assert_eq!(config.cluster.as_deref(), Some("from-env"));
        assert_eq!(config.username.as_deref(), Some("admin"));
        assert!(config.password.is_none());
    }
}
