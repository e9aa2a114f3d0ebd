//! Per-state behaviour.  Every `run` function returns the successor state and
//! hands over through [`Coordinator::settle`][crate::coordinator::Coordinator::settle].

pub(crate) mod going_to_investigate;
pub(crate) mod idle;
pub(crate) mod investigating;
pub(crate) mod patrolling;

use patrol_middleware::Topic;
use patrol_types::{Event, EventPayload, Intent, MachineState, NavigationResult, Pose};
use tracing::{debug, warn};

use crate::state_machine::{State, StateMachine};

const SOURCE: &str = "patrol-runtime::navigation";

/// The state a redirect with `intent` leads to.
pub(crate) fn redirect_successor(intent: Intent) -> State {
    match intent {
        Intent::Stop => State::Idle,
        Intent::Investigate(target) => State::GoingToInvestigate { target },
        Intent::Patrol { route, cursor } => State::patrol(route, cursor),
    }
}

/// Drive to `target` on behalf of `state`.
///
/// Returns early with [`NavigationResult::Preempted`] once a redirect lands in
/// `state`'s mailbox; the goal is cancelled by id so a stale cancel can never
/// hit a later goal.  The redirect itself is left for the caller to settle.
pub(crate) async fn navigate(
    machine: &StateMachine,
    state: MachineState,
    target: &Pose,
) -> NavigationResult {
    let mailbox = machine.coordinator.mailbox(state);
    if mailbox.has_pending() {
        return NavigationResult::Preempted;
    }

    let navigator = &machine.navigator;
    let goal = match navigator.send_goal(target.clone()).await {
        Ok(goal) => goal,
        Err(e) => {
            warn!(%state, %target, error = %e, "navigation goal rejected");
            return NavigationResult::Failed;
        }
    };
    debug!(%state, goal = %goal, %target, "navigation goal sent");

    let result = tokio::select! {
        result = navigator.wait_for_result(goal) => result,
        _ = mailbox.pending() => {
            debug!(%state, goal = %goal, "redirect pending; cancelling goal");
            navigator.cancel_goal(goal).await;
            navigator.wait_for_result(goal).await
        }
    };

    if result == NavigationResult::Failed {
        warn!(%state, goal = %goal, %target, "navigation failed");
    }
    machine.coordinator.bus().publish_to(
        Topic::Navigation,
        Event::new(
            SOURCE,
            EventPayload::NavigationFinished {
                goal,
                target: target.clone(),
                result,
            },
        ),
    );
    result
}
