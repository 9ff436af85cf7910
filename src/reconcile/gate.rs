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

//! Idempotency gate: does the probed status already satisfy the request?

use crate::error::{CohesityError, Result};
use crate::reconcile::state::{Classification, DesiredState, StatusSnapshot, StatusValue};
use crate::tasks::TaskRequestType;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Gate {
    Satisfied,
    Needs(TaskRequestType),
}

/// The default decision: satisfied statuses are a no-op, unsatisfied ones
/// need the action that reaches `desired`, ambiguous ones stop everything.
pub fn evaluate<S: StatusValue>(desired: DesiredState, snapshot: &StatusSnapshot<S>) -> Result<Gate> {
    match snapshot.status.classify(desired) {
        Classification::Satisfied => Ok(Gate::Satisfied),
        Classification::Unsatisfied => Ok(Gate::Needs(TaskRequestType::for_state(desired))),
        Classification::Ambiguous(reason) => Err(CohesityError::AmbiguousState(reason)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug)]
    enum Install {
        Missing,
        Unknown,
        Installed,
    }

    impl StatusValue for Install {
        fn classify(&self, desired: DesiredState) -> Classification {
            match (self, desired) {
                (Install::Unknown, _) => Classification::Ambiguous(String::from("partially installed")),
                (Install::Installed, DesiredState::Present) | (Install::Missing, DesiredState::Absent) => Classification::Satisfied,
                _ => Classification::Unsatisfied,
            }
        }
        fn label(&self) -> String {
            format!("{:?}", self)
        }
    }

    #[test]
    fn test_satisfied_is_a_noop() {
        let gate = evaluate(DesiredState::Present, &StatusSnapshot::new(Install::Installed)).unwrap();
        assert_eq!(gate, Gate::Satisfied);
    }

    #[test]
    fn test_unsatisfied_needs_the_matching_action() {
        let gate = evaluate(DesiredState::Absent, &StatusSnapshot::new(Install::Installed)).unwrap();
        assert_eq!(gate, Gate::Needs(TaskRequestType::Remove));
        let gate = evaluate(DesiredState::Present, &StatusSnapshot::new(Install::Missing)).unwrap();
        assert_eq!(gate, Gate::Needs(TaskRequestType::Create));
    }

    #[test]
    fn test_ambiguous_refuses_either_direction() {
        for desired in [DesiredState::Present, DesiredState::Absent] {
            let err = evaluate(desired, &StatusSnapshot::new(Install::Unknown)).unwrap_err();
            assert!(matches!(err, CohesityError::AmbiguousState(_)));
        }
    }
}
