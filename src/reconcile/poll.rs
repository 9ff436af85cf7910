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

//! Poll-until-terminal loop.
//!
//! Probes on a fixed interval until the status is terminal or
//! `ceil(timeout_minutes * 60 / interval)` probes have been made. At least
//! one probe is always made. A probe error ends the loop at once.

use crate::error::Result;
use crate::reconcile::state::StatusSnapshot;
use std::thread;
use std::time::Duration;

pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Blocks the calling thread.
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// What to report when the budget runs out before a terminal state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OnTimeout {
    /// The request was accepted; report it as changed but unconfirmed.
    Accept,
    /// Confirmation is mandatory; fail.
    Fail,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PollPlan {
    pub interval: Duration,
    pub timeout_minutes: u64,
    pub on_timeout: OnTimeout,
}

impl PollPlan {
    pub fn new(interval_secs: u64, timeout_minutes: u64, on_timeout: OnTimeout) -> Self {
        Self {
            interval: Duration::from_secs(interval_secs),
            timeout_minutes,
            on_timeout,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        let budget = self.timeout_minutes.saturating_mul(60);
        let interval = self.interval.as_secs().max(1);
        let attempts = budget.div_ceil(interval).max(1);
        u32::try_from(attempts).unwrap_or(u32::MAX)
    }
}

/// Verdict on one polled snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Terminal {
    InFlight,
    Reached,
    Failed(String),
}

#[derive(Debug)]
pub enum PollOutcome<S> {
    Reached { snapshot: StatusSnapshot<S>, attempts: u32 },
    Failed { snapshot: StatusSnapshot<S>, details: String, attempts: u32 },
    TimedOut { last: Option<StatusSnapshot<S>>, attempts: u32 },
}

impl<S> PollOutcome<S> {
    pub fn attempts(&self) -> u32 {
        match self {
            PollOutcome::Reached { attempts, .. } => *attempts,
            PollOutcome::Failed { attempts, .. } => *attempts,
            PollOutcome::TimedOut { attempts, .. } => *attempts,
        }
    }
}

/// Probe until `terminal` says the operation has settled.
///
/// `observe` sees every snapshot with its 1-based attempt number. There is
/// no sleep after the final attempt.
pub fn poll_until_terminal<S, P, T, O>(
    plan: &PollPlan,
    sleeper: &dyn Sleeper,
    mut probe: P,
    terminal: T,
    mut observe: O,
) -> Result<PollOutcome<S>>
where
    P: FnMut() -> Result<StatusSnapshot<S>>,
    T: Fn(&StatusSnapshot<S>) -> Terminal,
    O: FnMut(u32, u32, &StatusSnapshot<S>),
{
    let max_attempts = plan.max_attempts();
    let mut last = None;

    for attempt in 1..=max_attempts {
        let snapshot = probe()?;
        observe(attempt, max_attempts, &snapshot);

        match terminal(&snapshot) {
            Terminal::Reached => return Ok(PollOutcome::Reached { snapshot, attempts: attempt }),
            Terminal::Failed(details) => return Ok(PollOutcome::Failed { snapshot, details, attempts: attempt }),
            Terminal::InFlight => {}
        }

        last = Some(snapshot);
        if attempt < max_attempts {
            sleeper.sleep(plan.interval);
        }
    }

    Ok(PollOutcome::TimedOut { last, attempts: max_attempts })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CohesityError;
    use crate::reconcile::state::{Classification, DesiredState, StatusValue};
    use std::sync::Mutex;

    #[derive(Clone, Debug, PartialEq)]
    struct Label(&'static str);

    impl StatusValue for Label {
        fn classify(&self, _desired: DesiredState) -> Classification {
            Classification::Unsatisfied
        }
        fn label(&self) -> String {
            self.0.to_string()
        }
    }

    #[derive(Default)]
    struct CountingSleeper {
        naps: Mutex<Vec<Duration>>,
    }

    impl Sleeper for CountingSleeper {
        fn sleep(&self, duration: Duration) {
            self.naps.lock().unwrap().push(duration);
        }
    }

    fn by_label(snapshot: &StatusSnapshot<Label>) -> Terminal {
        match snapshot.status.0 {
            "kFinished" => Terminal::Reached,
            "kFailed" => Terminal::Failed(snapshot.error.clone().unwrap_or_default()),
            _ => Terminal::InFlight,
        }
    }

    #[test]
    fn test_max_attempts_rounds_up() {
        assert_eq!(PollPlan::new(30, 1, OnTimeout::Accept).max_attempts(), 2);
        assert_eq!(PollPlan::new(90, 30, OnTimeout::Accept).max_attempts(), 20);
        assert_eq!(PollPlan::new(120, 1, OnTimeout::Accept).max_attempts(), 1);
        assert_eq!(PollPlan::new(60, 0, OnTimeout::Fail).max_attempts(), 1);
    }

    #[test]
    fn test_zero_budget_still_looks_once() {
        let plan = PollPlan::new(60, 0, OnTimeout::Fail);
        let sleeper = CountingSleeper::default();
        let mut probes = 0;
        let outcome = poll_until_terminal(
            &plan,
            &sleeper,
            || { probes += 1; Ok(StatusSnapshot::new(Label("kFinished"))) },
            by_label,
            |_, _, _| {},
        ).unwrap();

        assert_eq!(probes, 1);
        assert!(matches!(outcome, PollOutcome::Reached { attempts: 1, .. }));
        assert!(sleeper.naps.lock().unwrap().is_empty());
    }

    #[test]
    fn test_poll_bound_respected() {
        let plan = PollPlan::new(30, 1, OnTimeout::Accept);
        let sleeper = CountingSleeper::default();
        let mut probes = 0;
        let outcome = poll_until_terminal(
            &plan,
            &sleeper,
            || { probes += 1; Ok(StatusSnapshot::new(Label("kRunning"))) },
            by_label,
            |_, _, _| {},
        ).unwrap();

        assert_eq!(probes, 2);
        assert!(matches!(outcome, PollOutcome::TimedOut { attempts: 2, .. }));
        assert_eq!(sleeper.naps.lock().unwrap().as_slice(), &[Duration::from_secs(30)]);
    }

    #[test]
    fn test_stops_at_terminal_state() {
        let plan = PollPlan::new(5, 10, OnTimeout::Fail);
        let mut statuses = vec!["kFinished", "kRunning"];
        let outcome = poll_until_terminal(
            &plan,
            &NoSleep,
            || Ok(StatusSnapshot::new(Label(statuses.pop().unwrap()))),
            by_label,
            |_, _, _| {},
        ).unwrap();
        assert_eq!(outcome.attempts(), 2);
        assert!(matches!(outcome, PollOutcome::Reached { .. }));
    }

    #[test]
    fn test_error_detail_is_returned_verbatim() {
        let plan = PollPlan::new(5, 1, OnTimeout::Accept);
        let outcome = poll_until_terminal(
            &plan,
            &NoSleep,
            || Ok(StatusSnapshot::new(Label("kFailed")).with_error(Some(String::from("Snapshot 7 expired.")))),
            by_label,
            |_, _, _| {},
        ).unwrap();
        match outcome {
            PollOutcome::Failed { details, .. } => assert_eq!(details, "Snapshot 7 expired."),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_probe_error_propagates_immediately() {
        let plan = PollPlan::new(5, 10, OnTimeout::Accept);
        let mut probes = 0;
        let result = poll_until_terminal(
            &plan,
            &NoSleep,
            || -> crate::error::Result<StatusSnapshot<Label>> {
                probes += 1;
                Err(CohesityError::Transport(String::from("connection refused")))
            },
            by_label,
            |_, _, _| {},
        );
        assert!(matches!(result, Err(CohesityError::Transport(_))));
        assert_eq!(probes, 1);
    }

    struct NoSleep;

    impl Sleeper for NoSleep {
        fn sleep(&self, _duration: Duration) {}
    }
}
