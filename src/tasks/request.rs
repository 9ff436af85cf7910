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

use crate::reconcile::DesiredState;
use std::fmt;

/// What a module is asked to do after its status has been probed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskRequestType {
    Query,
    Create,
    Remove,
    Modify,
    Start,
    Stop,
    Passive,
}

impl TaskRequestType {
    pub fn for_state(desired: DesiredState) -> Self {
        match desired {
            DesiredState::Present => TaskRequestType::Create,
            DesiredState::Absent => TaskRequestType::Remove,
            DesiredState::Started => TaskRequestType::Start,
            DesiredState::Stopped => TaskRequestType::Stop,
        }
    }

    pub fn verb(&self) -> &'static str {
        match self {
            TaskRequestType::Query => "query",
            TaskRequestType::Create => "create",
            TaskRequestType::Remove => "remove",
            TaskRequestType::Modify => "modify",
            TaskRequestType::Start => "start",
            TaskRequestType::Stop => "stop",
            TaskRequestType::Passive => "gather",
        }
    }

    pub fn is_mutating(&self) -> bool {
        !matches!(self, TaskRequestType::Query | TaskRequestType::Passive)
    }
}

impl fmt::Display for TaskRequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.verb())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_state() {
        assert_eq!(TaskRequestType::for_state(DesiredState::Present), TaskRequestType::Create);
        assert_eq!(TaskRequestType::for_state(DesiredState::Absent), TaskRequestType::Remove);
        assert_eq!(TaskRequestType::for_state(DesiredState::Started), TaskRequestType::Start);
        assert_eq!(TaskRequestType::for_state(DesiredState::Stopped), TaskRequestType::Stop);
    }

    #[test]
    fn test_passive_is_not_mutating() {
        assert!(!TaskRequestType::Passive.is_mutating());
        assert!(!TaskRequestType::Query.is_mutating());
        assert!(TaskRequestType::Stop.is_mutating());
    }
}
