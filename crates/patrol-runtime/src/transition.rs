//! The dispatcher's transition table.
//!
//! | status \ incoming | stop | investigate | patrol |
//! |---|---|---|---|
//! | `available` | no-op | → `going_to_investigate`, notify | → `patrolling`, notify |
//! | `going_to_investigate` | → `available`, preempt | stay, preempt | → `patrolling`, preempt |
//! | `investigating` | → `available`, redirect | → `going_to_investigate`, redirect | → `patrolling`, redirect |
//! | `patrolling` | → `available`, preempt | → `going_to_investigate`, preempt | no-op |
//!
//! The lookup is an exhaustive `match`, so every status/intent pair has an
//! entry by construction.
//!
//! Only `next_status` and the no-op check steer the dispatcher.  The
//! [`Delivery`] column describes what the receiving state ends up doing and
//! is logged with every posted redirect.  No state reads it: every effective
//! request is posted the same way, and the navigating states
//! (`GoingToInvestigate`, `Patrolling`) cancel their own goal on any redirect,
//! which is exactly the `preempt` rows.

use patrol_types::{AgentStatus, IntentKind};

/// How the active state is told about a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Nothing is posted; the request does not change course.
    Ignore,
    /// Wake the idle state.
    Notify,
    /// Redirect a state that has no navigation goal in flight.
    Redirect,
    /// Cancel the in-flight navigation goal, then redirect.
    Preempt,
}

/// Result of a table lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// New status, or `None` to leave it unchanged.
    pub next_status: Option<AgentStatus>,
    pub delivery: Delivery,
}

impl Transition {
    const fn to(status: AgentStatus, delivery: Delivery) -> Self {
        Self {
            next_status: Some(status),
            delivery,
        }
    }

    const NOOP: Transition = Transition {
        next_status: None,
        delivery: Delivery::Ignore,
    };

    pub fn is_noop(&self) -> bool {
        self.delivery == Delivery::Ignore
    }
}

/// Look up the transition for an `incoming` intent while in `status`.
pub fn lookup(status: AgentStatus, incoming: IntentKind) -> Transition {
    use AgentStatus::*;
    use Delivery::*;

    match (status, incoming) {
        (Available, IntentKind::Stop) => Transition::NOOP,
        (Available, IntentKind::Investigate) => Transition::to(GoingToInvestigate, Notify),
        (Available, IntentKind::Patrol) => Transition::to(Patrolling, Notify),

        (GoingToInvestigate, IntentKind::Stop) => Transition::to(Available, Preempt),
        (GoingToInvestigate, IntentKind::Investigate) => Transition {
            next_status: None,
            delivery: Preempt,
        },
        (GoingToInvestigate, IntentKind::Patrol) => Transition::to(Patrolling, Preempt),

        (Investigating, IntentKind::Stop) => Transition::to(Available, Redirect),
        (Investigating, IntentKind::Investigate) => Transition::to(GoingToInvestigate, Redirect),
        (Investigating, IntentKind::Patrol) => Transition::to(Patrolling, Redirect),

        (Patrolling, IntentKind::Stop) => Transition::to(Available, Preempt),
        (Patrolling, IntentKind::Investigate) => Transition::to(GoingToInvestigate, Preempt),
        (Patrolling, IntentKind::Patrol) => Transition::NOOP,
    }
}
