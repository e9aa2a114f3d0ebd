//! [`StateMachine`] – the four behavioural states and the loop that runs them.
//!
//! Each state owns the agent while it is active and returns exactly one
//! successor.  There is no terminal state: [`StateMachine::run`] keeps going
//! until the task is dropped.
//!
//! ```text
//!           investigate               reached
//!   IDLE ─────────────────▶ GOING_TO_INVESTIGATE ──────────▶ INVESTIGATING
//!    ▲ │                         │ failed                       │
//!    │ │ patrol                  ▼                              │
//!    │ └──────────────────────▶ PATROLLING ◀────────────────────┘
//!    └──────────── stop ─────────┘          (any state may be redirected)
//! ```

use std::sync::Arc;
use std::time::Duration;

use patrol_hal::NavigationGoalClient;
use patrol_middleware::Topic;
use patrol_types::{Event, EventPayload, MachineState, PatrolRoute, Pose};
use tracing::{info, warn};

use crate::coordinator::Coordinator;
use crate::states;

const SOURCE: &str = "patrol-runtime::state_machine";

/// A state together with the data it was entered with.
#[derive(Debug, Clone, PartialEq)]
pub enum State {
    Idle,
    GoingToInvestigate { target: Pose },
    Investigating,
    Patrolling { route: PatrolRoute, cursor: usize },
}

impl State {
    /// Patrol `route` starting at `cursor`, wrapped into range.  An empty
    /// route has nothing to patrol and yields [`State::Idle`].
    pub fn patrol(route: PatrolRoute, cursor: usize) -> Self {
        if route.is_empty() {
            warn!("empty patrol route; falling back to idle");
            return State::Idle;
        }
        let cursor = cursor % route.len();
        State::Patrolling { route, cursor }
    }

    pub fn kind(&self) -> MachineState {
        match self {
            State::Idle => MachineState::Idle,
            State::GoingToInvestigate { .. } => MachineState::GoingToInvestigate,
            State::Investigating => MachineState::Investigating,
            State::Patrolling { .. } => MachineState::Patrolling,
        }
    }

    fn entered_payload(&self) -> EventPayload {
        let (target, cursor) = match self {
            State::GoingToInvestigate { target } => (Some(target.clone()), None),
            State::Patrolling { route, cursor } => (route.pose(*cursor).cloned(), Some(*cursor)),
            State::Idle | State::Investigating => (None, None),
        };
        EventPayload::StateEntered {
            state: self.kind(),
            target,
            cursor,
        }
    }
}

/// Runs the active state and hands over to its successor, forever.
pub struct StateMachine {
    pub(crate) coordinator: Arc<Coordinator>,
    pub(crate) navigator: Arc<dyn NavigationGoalClient>,
    pub(crate) observation_period: Duration,
}

impl StateMachine {
    pub(crate) fn new(
        coordinator: Arc<Coordinator>,
        navigator: Arc<dyn NavigationGoalClient>,
        observation_period: Duration,
    ) -> Self {
        Self {
            coordinator,
            navigator,
            observation_period,
        }
    }

    /// Run from [`State::Idle`] until the surrounding task is dropped.
    pub async fn run(&self) {
        let mut state = State::Idle;
        loop {
            state = self.step(state).await;
        }
    }

    /// Run one activation of `state` and return its successor.
    pub async fn step(&self, state: State) -> State {
        let kind = state.kind();
        info!(state = %kind, "entering state");
        self.publish(state.entered_payload());

        let next = match state {
            State::Idle => states::idle::run(self).await,
            State::GoingToInvestigate { target } => {
                states::going_to_investigate::run(self, target).await
            }
            State::Investigating => states::investigating::run(self).await,
            State::Patrolling { route, cursor } => {
                states::patrolling::run(self, route, cursor).await
            }
        };

        self.publish(EventPayload::StateExited {
            state: kind,
            successor: next.kind(),
        });
        next
    }

    pub(crate) fn publish(&self, payload: EventPayload) {
        self.coordinator
            .bus()
            .publish_to(Topic::StateMachine, Event::new(SOURCE, payload));
    }
}
