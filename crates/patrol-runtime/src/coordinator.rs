//! Shared coordination core between the dispatcher and the state machine.
//!
//! Holds the agent status, which state is currently active, the pending
//! investigation outcome, and one [`RedirectMailbox`] per state.  Both sides
//! take the same lock for every decision, so the dispatcher's
//! status-update-plus-post and a state's take-mailbox-plus-hand-over never
//! interleave.  Lock order is always core first, then mailbox.

use std::sync::{Mutex, MutexGuard, PoisonError};

use patrol_middleware::{EventBus, Topic};
use patrol_types::{
    AgentStatus, Event, EventPayload, MachineState, PatrolError, PatrolRequestOutcome,
    PatrolResponse, RedirectMessage,
};
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info};

use crate::mailbox::RedirectMailbox;
use crate::state_machine::State;

const SOURCE: &str = "patrol-runtime::coordinator";

pub(crate) struct Coordinator {
    core: Mutex<CoreState>,
    mailboxes: [RedirectMailbox; 4],
    status_rx: watch::Receiver<AgentStatus>,
    bus: EventBus,
}

impl Coordinator {
    pub(crate) fn new(bus: EventBus) -> Self {
        let (status_tx, status_rx) = watch::channel(AgentStatus::Available);
        Self {
            core: Mutex::new(CoreState {
                status: AgentStatus::Available,
                active: MachineState::Idle,
                pending_outcome: None,
                halted: false,
                status_tx,
                bus: bus.clone(),
            }),
            mailboxes: Default::default(),
            status_rx,
            bus,
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, CoreState> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn mailbox(&self, state: MachineState) -> &RedirectMailbox {
        &self.mailboxes[state.index()]
    }

    pub(crate) fn status(&self) -> AgentStatus {
        *self.status_rx.borrow()
    }

    pub(crate) fn watch_status(&self) -> watch::Receiver<AgentStatus> {
        self.status_rx.clone()
    }

    pub(crate) fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Atomically take `from`'s mailbox and decide the successor state.
    ///
    /// `decide` receives the waiting redirect, if any.  Returning `None`
    /// keeps `from` active.  Otherwise the successor becomes the active
    /// state and the status is brought in line with it.
    pub(crate) fn settle<F>(&self, from: MachineState, decide: F) -> Option<State>
    where
        F: FnOnce(&mut CoreState, Option<RedirectMessage>) -> Option<State>,
    {
        let mut core = self.lock();
        let message = self.mailbox(from).take();
        let redirected = message.is_some();
        let next = decide(&mut core, message)?;

        let expected = next.kind().status();
        if redirected && core.status != expected {
            let violation = PatrolError::ProtocolViolation {
                status: core.status,
                state: next.kind(),
                details: format!("redirect out of {from} disagrees with the dispatched status"),
            };
            error!(%violation, "status forced to match the active state");
        }
        core.set_status(expected);
        core.active = next.kind();
        debug!(%from, to = %next.kind(), "hand-over settled");
        Some(next)
    }
}

/// State guarded by the coordinator lock.
pub(crate) struct CoreState {
    status: AgentStatus,
    active: MachineState,
    pending_outcome: Option<oneshot::Sender<PatrolResponse>>,
    halted: bool,
    status_tx: watch::Sender<AgentStatus>,
    bus: EventBus,
}

impl CoreState {
    pub(crate) fn status(&self) -> AgentStatus {
        self.status
    }

    pub(crate) fn active(&self) -> MachineState {
        self.active
    }

    /// `true` once no state machine reads the mailboxes any more.
    pub(crate) fn is_halted(&self) -> bool {
        self.halted
    }

    /// Mark the state machine as gone and answer a waiting investigate
    /// requester with `response`.
    pub(crate) fn halt(&mut self, response: PatrolResponse) {
        self.halted = true;
        if let Some(waiter) = self.pending_outcome.take() {
            let _ = waiter.send(response);
        }
    }

    pub(crate) fn set_status(&mut self, to: AgentStatus) {
        let from = self.status;
        if from == to {
            return;
        }
        self.status = to;
        self.status_tx.send_replace(to);
        info!(%from, %to, "agent status changed");
        self.bus.publish_to(
            Topic::StateMachine,
            Event::new(SOURCE, EventPayload::StatusChanged { from, to }),
        );
    }

    /// Resolve a still-pending investigation outcome as superseded.
    pub(crate) fn supersede_pending(&mut self) {
        if let Some(waiter) = self.pending_outcome.take() {
            debug!("pending investigation outcome superseded");
            let _ = waiter.send(PatrolResponse::Superseded);
        }
    }

    /// Register a caller that waits for the agent to reach its
    /// investigation target.
    pub(crate) fn await_investigation(&mut self) -> oneshot::Receiver<PatrolResponse> {
        self.supersede_pending();
        let (tx, rx) = oneshot::channel();
        self.pending_outcome = Some(tx);
        rx
    }

    /// The investigation target was reached: status becomes
    /// [`AgentStatus::Investigating`] and the waiting caller completes.
    pub(crate) fn report_investigation_reached(&mut self) {
        self.set_status(AgentStatus::Investigating);
        if let Some(waiter) = self.pending_outcome.take() {
            let _ = waiter.send(PatrolResponse::Completed(PatrolRequestOutcome {
                status: AgentStatus::Investigating,
            }));
        }
    }

    /// The investigation target could not be reached and nothing replaced
    /// it; the agent falls back to available.
    pub(crate) fn abort_investigation(&mut self) {
        if let Some(waiter) = self.pending_outcome.take() {
            let _ = waiter.send(PatrolResponse::Aborted(PatrolRequestOutcome {
                status: AgentStatus::Available,
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use patrol_types::{Intent, Pose};

    fn coordinator() -> Coordinator {
        Coordinator::new(EventBus::default())
    }

    #[test]
    fn starts_available_and_idle() {
        let c = coordinator();
        assert_eq!(c.status(), AgentStatus::Available);
        assert_eq!(c.lock().active(), MachineState::Idle);
    }

    #[test]
    fn settle_without_successor_keeps_state() {
        let c = coordinator();
        assert!(c.settle(MachineState::Idle, |_, _| None).is_none());
        assert_eq!(c.lock().active(), MachineState::Idle);
    }

    #[test]
    fn settle_hands_over_and_aligns_status() {
        let c = coordinator();
        let target = Pose::planar("map", 1.0, 1.0, 0.0);
        c.mailbox(MachineState::Idle).post(RedirectMessage {
            intent: Intent::Investigate(target.clone()),
            issued_at: AgentStatus::Available,
        });
        c.lock().set_status(AgentStatus::GoingToInvestigate);

        let next = c.settle(MachineState::Idle, |_, message| match message?.intent {
            Intent::Investigate(pose) => Some(State::GoingToInvestigate { target: pose }),
            _ => None,
        });
        assert_eq!(next, Some(State::GoingToInvestigate { target }));
        assert_eq!(c.lock().active(), MachineState::GoingToInvestigate);
        assert!(!c.mailbox(MachineState::Idle).has_pending());
        assert_eq!(c.status(), AgentStatus::GoingToInvestigate);
    }

    #[tokio::test]
    async fn newer_waiter_supersedes_older() {
        let c = coordinator();
        let first = c.lock().await_investigation();
        let second = c.lock().await_investigation();
        assert_eq!(first.await.ok(), Some(PatrolResponse::Superseded));

        c.lock().report_investigation_reached();
        assert_eq!(
            second.await.ok(),
            Some(PatrolResponse::Completed(PatrolRequestOutcome {
                status: AgentStatus::Investigating
            }))
        );
        assert_eq!(c.status(), AgentStatus::Investigating);
    }

    #[tokio::test]
    async fn abort_resolves_waiter_as_available() {
        let c = coordinator();
        let waiter = c.lock().await_investigation();
        c.lock().abort_investigation();
        assert_eq!(
            waiter.await.ok(),
            Some(PatrolResponse::Aborted(PatrolRequestOutcome {
                status: AgentStatus::Available
            }))
        );
    }

    #[tokio::test]
    async fn halt_answers_waiter_and_sticks() {
        let c = coordinator();
        let waiter = c.lock().await_investigation();
        let aborted = PatrolResponse::Aborted(PatrolRequestOutcome {
            status: AgentStatus::GoingToInvestigate,
        });
        c.lock().halt(aborted);
        assert_eq!(waiter.await.ok(), Some(aborted));
        assert!(c.lock().is_halted());
    }

    #[tokio::test]
    async fn status_changes_are_watchable() {
        let c = coordinator();
        let mut rx = c.watch_status();
        c.lock().set_status(AgentStatus::Patrolling);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), AgentStatus::Patrolling);
    }
}
