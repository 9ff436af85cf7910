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

use std::error::Error as StdError;
use std::fmt;
use std::io;

/// Main error type for cluster automation
#[derive(Debug)]
pub enum CohesityError {
    /// Configuration errors
    Config(String),

    /// A module argument is missing or malformed
    Parameter(String),

    /// Credentials rejected or token exchange failed
    Auth(String),

    /// The cluster could not be reached or the reply could not be read
    Transport(String),

    /// The cluster answered with a non-2xx status
    Http { status: u16, message: String },

    /// A probe returned a state that needs an operator to look at it
    AmbiguousState(String),

    /// The poll budget ran out where confirmation was required
    Timeout(String),

    /// An operation reached a terminal state carrying an error
    TaskFailed { msg: String, details: String },

    /// Something the operation depends on does not exist
    NotFound(String),

    /// Template errors
    Template(String),

    /// IO errors
    Io(io::Error),

    /// YAML parsing errors
    Yaml(serde_yaml::Error),

    /// JSON parsing errors
    Json(serde_json::Error),

    /// Other errors
    Other(String),
}

impl CohesityError {
    /// The short message reported as `msg` when a module fails.
    pub fn msg(&self) -> String {
        match self {
            CohesityError::TaskFailed { msg, .. } => msg.clone(),
            CohesityError::Timeout(msg) => msg.clone(),
            CohesityError::AmbiguousState(msg) => msg.clone(),
            _ => self.to_string(),
        }
    }

    /// Server supplied detail, passed through untouched.
    pub fn error_details(&self) -> Option<&str> {
        match self {
            CohesityError::TaskFailed { details, .. } => Some(details),
            CohesityError::Http { message, .. } => Some(message),
            CohesityError::Auth(msg) => Some(msg),
            _ => None,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            CohesityError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl fmt::Display for CohesityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CohesityError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CohesityError::Parameter(msg) => write!(f, "Parameter error: {}", msg),
            CohesityError::Auth(msg) => write!(f, "Authentication error: {}", msg),
            CohesityError::Transport(msg) => write!(f, "Transport error: {}", msg),
            CohesityError::Http { status, message } => write!(f, "Cluster API returned status {}: {}", status, message),
            CohesityError::AmbiguousState(msg) => write!(f, "Ambiguous state: {}", msg),
            CohesityError::Timeout(msg) => write!(f, "Timed out: {}", msg),
            CohesityError::TaskFailed { msg, details } => write!(f, "{}: {}", msg, details),
            CohesityError::NotFound(msg) => write!(f, "Not found: {}", msg),
            CohesityError::Template(msg) => write!(f, "Template error: {}", msg),
            CohesityError::Io(err) => write!(f, "IO error: {}", err),
            CohesityError::Yaml(err) => write!(f, "YAML error: {}", err),
            CohesityError::Json(err) => write!(f, "JSON error: {}", err),
            CohesityError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl StdError for CohesityError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            CohesityError::Io(err) => Some(err),
            CohesityError::Yaml(err) => Some(err),
            CohesityError::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for CohesityError {
    fn from(err: io::Error) -> Self {
        CohesityError::Io(err)
    }
}

impl From<serde_yaml::Error> for CohesityError {
    fn from(err: serde_yaml::Error) -> Self {
        CohesityError::Yaml(err)
    }
}

impl From<serde_json::Error> for CohesityError {
    fn from(err: serde_json::Error) -> Self {
        CohesityError::Json(err)
    }
}

impl From<String> for CohesityError {
    fn from(err: String) -> Self {
        CohesityError::Other(err)
    }
}

impl From<&str> for CohesityError {
    fn from(err: &str) -> Self {
        CohesityError::Other(err.to_string())
    }
}

/// Result type alias for cluster operations
pub type Result<T> = std::result::Result<T, CohesityError>;
