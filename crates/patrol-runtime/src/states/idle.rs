use patrol_types::{Intent, MachineState};
use tracing::warn;

use super::redirect_successor;
use crate::state_machine::{State, StateMachine};

/// Wait for an investigate or patrol request.  A stop is ignored.
pub(crate) async fn run(machine: &StateMachine) -> State {
    let mailbox = machine.coordinator.mailbox(MachineState::Idle);
    loop {
        mailbox.pending().await;
        let next = machine
            .coordinator
            .settle(MachineState::Idle, |_, message| match message?.intent {
                Intent::Stop => {
                    warn!("stop delivered while idle; ignored");
                    None
                }
                intent => Some(redirect_successor(intent)),
            });
        if let Some(next) = next {
            return next;
        }
    }
}
