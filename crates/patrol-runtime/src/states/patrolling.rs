use patrol_types::{
    AgentStatus, Intent, MachineState, NavigationResult, PatrolError, PatrolRoute, RedirectMessage,
};
use tracing::{error, warn};

use super::{navigate, redirect_successor};
use crate::state_machine::{State, StateMachine};

/// Drive to the waypoint at `cursor`, then advance around the loop.
pub(crate) async fn run(machine: &StateMachine, route: PatrolRoute, cursor: usize) -> State {
    let Some(target) = route.pose(cursor).cloned() else {
        warn!(cursor, waypoints = route.len(), "patrol cursor out of range");
        return machine
            .coordinator
            .settle(MachineState::Patrolling, |_, message| {
                Some(message.map_or(State::Idle, |m| redirect_successor(m.intent)))
            })
            .unwrap_or(State::Idle);
    };

    let outcome = navigate(machine, MachineState::Patrolling, &target).await;

    machine
        .coordinator
        .settle(MachineState::Patrolling, |core, message| match message {
            // The dispatcher treats patrol-while-patrolling as a no-op, so
            // such a redirect breaks the protocol. The running route is kept.
            Some(RedirectMessage {
                intent: Intent::Patrol { .. },
                issued_at: AgentStatus::Patrolling,
            }) => {
                let violation = PatrolError::ProtocolViolation {
                    status: core.status(),
                    state: MachineState::Patrolling,
                    details: "patrol redirect issued while already patrolling".to_string(),
                };
                error!(%violation, "keeping current route");
                let step = usize::from(outcome == NavigationResult::Succeeded);
                Some(State::patrol(route, cursor + step))
            }
            Some(message) => Some(redirect_successor(message.intent)),
            None => match outcome {
                NavigationResult::Succeeded => Some(State::patrol(route, cursor + 1)),
                NavigationResult::Failed | NavigationResult::Preempted => {
                    warn!(%target, cursor, ?outcome, "patrol leg did not complete; stopping");
                    Some(State::Idle)
                }
            },
        })
        .unwrap_or(State::Idle)
}
