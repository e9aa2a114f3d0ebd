use patrol_types::{MachineState, NavigationResult, Pose};
use tracing::info;

use super::{navigate, redirect_successor};
use crate::state_machine::{State, StateMachine};

/// Drive to `target`.  Arrival completes the waiting requester and moves on
/// to observing; failure with nothing queued aborts back to idle.  A waiting
/// redirect beats either outcome.
pub(crate) async fn run(machine: &StateMachine, target: Pose) -> State {
    let outcome = navigate(machine, MachineState::GoingToInvestigate, &target).await;

    machine
        .coordinator
        .settle(MachineState::GoingToInvestigate, |core, message| {
            if let Some(message) = message {
                return Some(redirect_successor(message.intent));
            }
            match outcome {
                NavigationResult::Succeeded => {
                    info!(%target, "investigation target reached");
                    core.report_investigation_reached();
                    Some(State::Investigating)
                }
                NavigationResult::Failed | NavigationResult::Preempted => {
                    info!(%target, ?outcome, "investigation aborted");
                    core.abort_investigation();
                    Some(State::Idle)
                }
            }
        })
        .unwrap_or(State::Idle)
}
