use patrol_types::MachineState;
use tokio::time::{MissedTickBehavior, interval};
use tracing::debug;

use super::redirect_successor;
use crate::state_machine::{State, StateMachine};

/// Observe the investigated spot until a redirect arrives.
pub(crate) async fn run(machine: &StateMachine) -> State {
    let mailbox = machine.coordinator.mailbox(MachineState::Investigating);
    let mut ticks = interval(machine.observation_period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut observations = 0u64;

    loop {
        tokio::select! {
            _ = ticks.tick() => {
                observations += 1;
                debug!(observations, "observing");
            }
            _ = mailbox.pending() => {
                let next = machine
                    .coordinator
                    .settle(MachineState::Investigating, |_, message| {
                        message.map(|m| redirect_successor(m.intent))
                    });
                if let Some(next) = next {
                    debug!(observations, "investigation finished");
                    return next;
                }
            }
        }
    }
}
