//! [`PatrolDispatcher`] – the requester-facing entry point.
//!
//! Every request is validated, classified by route length, and run through
//! the [transition table](crate::transition).  Anything other than a no-op
//! updates the status and posts a [`RedirectMessage`] into the mailbox of the
//! state that is active right now.
//!
//! Investigate requests stay open until the agent reaches the pose, gives up
//! on it, or a newer request supersedes them.  All other requests complete
//! immediately with the status they produced.

use std::sync::Arc;

use patrol_middleware::{EventBus, Topic};
use patrol_types::{
    AgentStatus, Event, EventPayload, Intent, IntentKind, PatrolError, PatrolRequestOutcome,
    PatrolResponse, PatrolRoute, RedirectMessage,
};
use tokio::sync::watch;
use tracing::{debug, info, instrument};

use crate::coordinator::Coordinator;
use crate::transition::lookup;

const SOURCE: &str = "patrol-runtime::dispatcher";

/// Cheap to clone; all clones drive the same agent.
#[derive(Clone)]
pub struct PatrolDispatcher {
    coordinator: Arc<Coordinator>,
}

impl PatrolDispatcher {
    pub(crate) fn new(coordinator: Arc<Coordinator>) -> Self {
        Self { coordinator }
    }

    /// Submit a route: empty stops, one pose investigates, more patrol.
    ///
    /// # Errors
    ///
    /// [`PatrolError::MalformedRequest`] when the route fails validation.
    /// Nothing about the agent changes in that case.
    /// [`PatrolError::Channel`] once the state machine has stopped.
    #[instrument(skip_all, fields(waypoints = route.len()))]
    pub async fn submit(&self, route: PatrolRoute) -> Result<PatrolResponse, PatrolError> {
        route.validate()?;
        let waypoints = route.len();
        let intent = Intent::classify(route);
        let kind = intent.kind();

        let (status, waiter) = {
            let mut core = self.coordinator.lock();
            if core.is_halted() {
                return Err(PatrolError::Channel(
                    "state machine is not running".to_string(),
                ));
            }
            core.supersede_pending();

            let current = core.status();
            info!(intent = %kind, status = %current, "patrol request received");
            self.coordinator.bus().publish_to(
                Topic::Requests,
                Event::new(
                    SOURCE,
                    EventPayload::RequestReceived {
                        intent: kind,
                        waypoints,
                        status: current,
                    },
                ),
            );

            let transition = lookup(current, kind);
            if transition.is_noop() {
                debug!(intent = %kind, status = %current, "request does not change course");
                (current, None)
            } else {
                let active = core.active();
                let replaced = self.coordinator.mailbox(active).post(RedirectMessage {
                    intent,
                    issued_at: current,
                });
                if let Some(old) = replaced {
                    debug!(state = %active, dropped = %old.intent.kind(), "unconsumed redirect replaced");
                }
                debug!(state = %active, delivery = ?transition.delivery, "redirect posted");
                if let Some(next) = transition.next_status {
                    core.set_status(next);
                }
                let waiter = (kind == IntentKind::Investigate).then(|| core.await_investigation());
                (core.status(), waiter)
            }
        };

        match waiter {
            Some(rx) => Ok(rx.await.unwrap_or(PatrolResponse::Superseded)),
            None => Ok(PatrolResponse::Completed(PatrolRequestOutcome { status })),
        }
    }

    /// Current status snapshot.
    pub fn status(&self) -> AgentStatus {
        self.coordinator.status()
    }

    /// Subscribe to status changes.
    pub fn watch_status(&self) -> watch::Receiver<AgentStatus> {
        self.coordinator.watch_status()
    }

    pub fn bus(&self) -> &EventBus {
        self.coordinator.bus()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use patrol_types::{MachineState, Pose};
    use std::time::Duration;

    fn dispatcher() -> PatrolDispatcher {
        PatrolDispatcher::new(Arc::new(Coordinator::new(EventBus::default())))
    }

    fn pose(x: f64, y: f64) -> Pose {
        Pose::planar("map", x, y, 0.0)
    }

    fn loop_route() -> PatrolRoute {
        vec![pose(0.0, 0.0), pose(1.0, 0.0), pose(1.0, 1.0)].into()
    }

    #[tokio::test]
    async fn stop_while_available_is_noop() {
        let d = dispatcher();
        let response = d.submit(PatrolRoute::stop()).await.unwrap();
        assert_eq!(
            response,
            PatrolResponse::Completed(PatrolRequestOutcome {
                status: AgentStatus::Available
            })
        );
        assert!(!d.coordinator.mailbox(MachineState::Idle).has_pending());
    }

    #[tokio::test]
    async fn patrol_completes_immediately_and_notifies_idle() {
        let d = dispatcher();
        let response = d.submit(loop_route()).await.unwrap();
        assert_eq!(response.status(), Some(AgentStatus::Patrolling));
        assert_eq!(d.status(), AgentStatus::Patrolling);

        let message = d.coordinator.mailbox(MachineState::Idle).take().unwrap();
        assert_eq!(message.issued_at, AgentStatus::Available);
        assert_eq!(message.intent.kind(), IntentKind::Patrol);
    }

    #[tokio::test]
    async fn malformed_route_is_rejected_without_side_effects() {
        let d = dispatcher();
        let bad: PatrolRoute = vec![Pose::planar("map", f64::NAN, 0.0, 0.0)].into();
        let result = d.submit(bad).await;
        assert!(matches!(result, Err(PatrolError::MalformedRequest(_))));
        assert_eq!(d.status(), AgentStatus::Available);
        assert!(!d.coordinator.mailbox(MachineState::Idle).has_pending());
    }

    #[tokio::test]
    async fn later_request_supersedes_waiting_investigation() {
        let d = dispatcher();
        let first = {
            let d = d.clone();
            tokio::spawn(async move { d.submit(vec![pose(2.0, 2.0)].into()).await })
        };
        let mut status = d.watch_status();
        tokio::time::timeout(
            Duration::from_secs(1),
            status.wait_for(|s| *s == AgentStatus::GoingToInvestigate),
        )
        .await
        .unwrap()
        .unwrap();

        d.submit(PatrolRoute::stop()).await.unwrap();
        let first = tokio::time::timeout(Duration::from_secs(1), first)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(first, PatrolResponse::Superseded);
        assert_eq!(d.status(), AgentStatus::Available);

        // The stop replaced the unconsumed investigate in the idle mailbox.
        let message = d.coordinator.mailbox(MachineState::Idle).take().unwrap();
        assert_eq!(message.intent, Intent::Stop);
    }

    #[tokio::test]
    async fn halted_agent_refuses_requests() {
        let d = dispatcher();
        d.coordinator.lock().halt(PatrolResponse::Superseded);
        let result = d.submit(loop_route()).await;
        assert!(matches!(result, Err(PatrolError::Channel(_))));
        assert_eq!(d.status(), AgentStatus::Available);
    }

    #[tokio::test]
    async fn requests_are_published() {
        let d = dispatcher();
        let mut rx = d.bus().subscribe_to(Topic::Requests);
        d.submit(loop_route()).await.unwrap();
        let event = rx.recv().await.unwrap();
        match event.payload {
            EventPayload::RequestReceived {
                intent,
                waypoints,
                status,
            } => {
                assert_eq!(intent, IntentKind::Patrol);
                assert_eq!(waypoints, 3);
                assert_eq!(status, AgentStatus::Available);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
