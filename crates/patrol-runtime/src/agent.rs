//! [`PatrolAgent`] – wires a dispatcher and a running state machine around a
//! navigation client.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use patrol_hal::SimNavigator;
//! use patrol_runtime::{PatrolAgent, PatrolConfig};
//! use patrol_types::PatrolRoute;
//!
//! # async fn demo() -> Result<(), patrol_types::PatrolError> {
//! let agent = PatrolAgent::spawn(PatrolConfig::default(), Arc::new(SimNavigator::new(0.5)))?;
//! let response = agent.dispatcher().submit(PatrolRoute::stop()).await?;
//! println!("{response:?}");
//! agent.shutdown().await;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use patrol_hal::NavigationGoalClient;
use patrol_middleware::EventBus;
use patrol_middleware::bus::DEFAULT_CAPACITY;
use patrol_types::{PatrolError, PatrolRequestOutcome, PatrolResponse};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{Instrument, error, info, info_span, warn};

use crate::coordinator::Coordinator;
use crate::dispatcher::PatrolDispatcher;
use crate::state_machine::StateMachine;

/// Runtime settings for one agent.
#[derive(Debug, Clone)]
pub struct PatrolConfig {
    /// Name used in log spans.
    pub agent_name: String,
    /// Interval between observation ticks while investigating.
    pub observation_period: Duration,
    /// Per-topic buffer of the event bus.
    pub bus_capacity: usize,
}

impl Default for PatrolConfig {
    fn default() -> Self {
        Self {
            agent_name: "patrol".to_string(),
            observation_period: Duration::from_millis(500),
            bus_capacity: DEFAULT_CAPACITY,
        }
    }
}

impl PatrolConfig {
    /// # Errors
    ///
    /// [`PatrolError::Config`] for a zero observation period or bus capacity.
    pub fn validate(&self) -> Result<(), PatrolError> {
        if self.observation_period.is_zero() {
            return Err(PatrolError::Config(
                "observation period must be non-zero".to_string(),
            ));
        }
        if self.bus_capacity == 0 {
            return Err(PatrolError::Config(
                "event bus capacity must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// A running agent.  Dropping it without [`shutdown`][Self::shutdown]
/// stops the state machine but leaves an outstanding goal with the
/// navigator.
///
/// Should the state machine task die, a waiting investigate requester is
/// answered with [`PatrolResponse::Aborted`] and later requests fail with
/// [`PatrolError::Channel`].
pub struct PatrolAgent {
    dispatcher: PatrolDispatcher,
    coordinator: Arc<Coordinator>,
    navigator: Arc<dyn NavigationGoalClient>,
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl PatrolAgent {
    /// Start the state machine in `Idle` on the current Tokio runtime.
    ///
    /// # Errors
    ///
    /// [`PatrolError::Config`] when `config` fails validation.
    pub fn spawn(
        config: PatrolConfig,
        navigator: Arc<dyn NavigationGoalClient>,
    ) -> Result<Self, PatrolError> {
        config.validate()?;

        let coordinator = Arc::new(Coordinator::new(EventBus::new(config.bus_capacity)));
        let machine = StateMachine::new(
            Arc::clone(&coordinator),
            Arc::clone(&navigator),
            config.observation_period,
        );

        let (stop_tx, stop_rx) = oneshot::channel();
        let span = info_span!("agent", name = %config.agent_name);
        let supervised = Arc::clone(&coordinator);
        let task = tokio::spawn(
            async move {
                info!("state machine started");
                let mut machine_task =
                    tokio::spawn(async move { machine.run().await }.in_current_span());
                tokio::select! {
                    ended = &mut machine_task => {
                        match ended {
                            Err(e) => error!(error = %e, "state machine task died"),
                            Ok(()) => error!("state machine returned"),
                        }
                        let mut core = supervised.lock();
                        let status = core.status();
                        core.halt(PatrolResponse::Aborted(PatrolRequestOutcome { status }));
                    }
                    _ = stop_rx => {
                        machine_task.abort();
                        let _ = machine_task.await;
                        info!("state machine stopped");
                    }
                }
            }
            .instrument(span),
        );

        Ok(Self {
            dispatcher: PatrolDispatcher::new(Arc::clone(&coordinator)),
            coordinator,
            navigator,
            stop_tx,
            task,
        })
    }

    pub fn dispatcher(&self) -> PatrolDispatcher {
        self.dispatcher.clone()
    }

    pub fn bus(&self) -> EventBus {
        self.coordinator.bus().clone()
    }

    /// Stop the state machine, cancel any outstanding goal, and release a
    /// waiting investigate requester.
    pub async fn shutdown(self) {
        let _ = self.stop_tx.send(());
        if let Err(e) = self.task.await {
            warn!(error = %e, "state machine task ended abnormally");
        }
        self.navigator.cancel_all().await;
        self.coordinator.lock().halt(PatrolResponse::Superseded);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use patrol_hal::{ScriptedNavigator, SimNavigator};
    use patrol_middleware::Topic;
    use patrol_types::{
        AgentStatus, EventPayload, GoalId, MachineState, NavigationResult, PatrolRoute,
        Pose,
    };
    use tokio::sync::watch;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(2);

    fn pose(x: f64, y: f64) -> Pose {
        Pose::planar("map", x, y, 0.0)
    }

    fn square() -> PatrolRoute {
        vec![pose(0.0, 0.0), pose(4.0, 0.0), pose(4.0, 4.0)].into()
    }

    fn start() -> (PatrolAgent, Arc<ScriptedNavigator>) {
        let nav = Arc::new(ScriptedNavigator::new());
        let config = PatrolConfig {
            observation_period: Duration::from_millis(10),
            ..PatrolConfig::default()
        };
        let agent = PatrolAgent::spawn(config, nav.clone()).unwrap();
        (agent, nav)
    }

    async fn wait_status(rx: &mut watch::Receiver<AgentStatus>, want: AgentStatus) {
        timeout(WAIT, rx.wait_for(|s| *s == want))
            .await
            .unwrap_or_else(|_| panic!("status never became {want}"))
            .unwrap();
    }

    /// Wait until `count` goals were sent and a goal is outstanding.
    async fn wait_goal(nav: &ScriptedNavigator, count: usize) -> Pose {
        timeout(WAIT, nav.wait_for_goals(count)).await.unwrap();
        timeout(WAIT, async {
            loop {
                if let Some((_, pose)) = nav.current_goal() {
                    return pose;
                }
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap()
    }

    /// Navigator whose driver blows up on the first goal.
    struct PanickingNavigator;

    #[async_trait]
    impl NavigationGoalClient for PanickingNavigator {
        async fn send_goal(&self, _target: Pose) -> Result<GoalId, PatrolError> {
            panic!("navigation driver crashed");
        }

        async fn cancel_goal(&self, _goal: GoalId) {}

        async fn cancel_all(&self) {}

        async fn wait_for_result(&self, _goal: GoalId) -> NavigationResult {
            NavigationResult::Failed
        }
    }

    /// Drain `StateEntered` events that are already buffered.
    fn entered_states(events: &mut patrol_middleware::TopicReceiver) -> Vec<MachineState> {
        let mut entered = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let EventPayload::StateEntered { state, .. } = event.payload {
                entered.push(state);
            }
        }
        entered
    }

    #[test]
    fn zero_settings_are_rejected() {
        let config = PatrolConfig {
            bus_capacity: 0,
            ..PatrolConfig::default()
        };
        assert!(matches!(config.validate(), Err(PatrolError::Config(_))));

        let config = PatrolConfig {
            observation_period: Duration::ZERO,
            ..PatrolConfig::default()
        };
        assert!(matches!(config.validate(), Err(PatrolError::Config(_))));
    }

    #[tokio::test]
    async fn investigate_completes_on_arrival() {
        let (agent, nav) = start();
        let dispatcher = agent.dispatcher();
        let request = tokio::spawn({
            let d = dispatcher.clone();
            async move { d.submit(vec![pose(3.0, 1.0)].into()).await }
        });

        assert_eq!(wait_goal(&nav, 1).await, pose(3.0, 1.0));
        assert_eq!(dispatcher.status(), AgentStatus::GoingToInvestigate);
        nav.resolve_current(NavigationResult::Succeeded);

        let response = timeout(WAIT, request).await.unwrap().unwrap().unwrap();
        assert_eq!(
            response,
            PatrolResponse::Completed(PatrolRequestOutcome {
                status: AgentStatus::Investigating
            })
        );
        assert_eq!(dispatcher.status(), AgentStatus::Investigating);
        agent.shutdown().await;
    }

    #[tokio::test]
    async fn failed_investigation_aborts_to_available() {
        let (agent, nav) = start();
        let dispatcher = agent.dispatcher();
        let request = tokio::spawn({
            let d = dispatcher.clone();
            async move { d.submit(vec![pose(9.0, 9.0)].into()).await }
        });

        wait_goal(&nav, 1).await;
        nav.resolve_current(NavigationResult::Failed);

        let response = timeout(WAIT, request).await.unwrap().unwrap().unwrap();
        assert_eq!(
            response,
            PatrolResponse::Aborted(PatrolRequestOutcome {
                status: AgentStatus::Available
            })
        );
        let mut status = dispatcher.watch_status();
        wait_status(&mut status, AgentStatus::Available).await;
        agent.shutdown().await;
    }

    #[tokio::test]
    async fn patrol_cursor_cycles_through_route() {
        let (agent, nav) = start();
        let dispatcher = agent.dispatcher();

        let response = dispatcher.submit(square()).await.unwrap();
        assert_eq!(response.status(), Some(AgentStatus::Patrolling));

        let expected = [pose(0.0, 0.0), pose(4.0, 0.0), pose(4.0, 4.0), pose(0.0, 0.0)];
        for (i, want) in expected.iter().enumerate() {
            assert_eq!(&wait_goal(&nav, i + 1).await, want, "leg {i}");
            nav.resolve_current(NavigationResult::Succeeded);
        }
        assert_eq!(dispatcher.status(), AgentStatus::Patrolling);
        agent.shutdown().await;
    }

    #[tokio::test]
    async fn patrol_while_patrolling_keeps_goal() {
        let (agent, nav) = start();
        let dispatcher = agent.dispatcher();
        dispatcher.submit(square()).await.unwrap();
        wait_goal(&nav, 1).await;

        let other: PatrolRoute = vec![pose(7.0, 7.0), pose(8.0, 8.0)].into();
        let response = dispatcher.submit(other).await.unwrap();
        assert_eq!(response.status(), Some(AgentStatus::Patrolling));

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(nav.cancelled_goals().is_empty());
        assert_eq!(nav.sent_goals().len(), 1);
        agent.shutdown().await;
    }

    #[tokio::test]
    async fn stop_preempts_patrol() {
        let (agent, nav) = start();
        let dispatcher = agent.dispatcher();
        dispatcher.submit(square()).await.unwrap();
        wait_goal(&nav, 1).await;

        let response = dispatcher.submit(PatrolRoute::stop()).await.unwrap();
        assert_eq!(response.status(), Some(AgentStatus::Available));

        let cancelled = timeout(WAIT, async {
            loop {
                if !nav.cancelled_goals().is_empty() {
                    return nav.cancelled_goals();
                }
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(cancelled.len(), 1);
        assert_eq!(dispatcher.status(), AgentStatus::Available);
        agent.shutdown().await;
    }

    #[tokio::test]
    async fn investigate_during_patrol_then_patrol_again() {
        let (agent, nav) = start();
        let dispatcher = agent.dispatcher();
        dispatcher.submit(square()).await.unwrap();
        wait_goal(&nav, 1).await;

        let request = tokio::spawn({
            let d = dispatcher.clone();
            async move { d.submit(vec![pose(2.0, 2.0)].into()).await }
        });
        assert_eq!(wait_goal(&nav, 2).await, pose(2.0, 2.0));
        nav.resolve_current(NavigationResult::Succeeded);
        let response = timeout(WAIT, request).await.unwrap().unwrap().unwrap();
        assert!(response.is_completed());

        // Investigating has no goal in flight; the redirect needs no cancel.
        let before = nav.cancelled_goals().len();
        dispatcher.submit(square()).await.unwrap();
        assert_eq!(wait_goal(&nav, 3).await, pose(0.0, 0.0));
        assert_eq!(nav.cancelled_goals().len(), before);
        assert_eq!(dispatcher.status(), AgentStatus::Patrolling);
        agent.shutdown().await;
    }

    #[tokio::test]
    async fn reinvestigate_supersedes_and_retargets() {
        let (agent, nav) = start();
        let dispatcher = agent.dispatcher();
        let mut events = agent.bus().subscribe_to(Topic::StateMachine);
        let first = tokio::spawn({
            let d = dispatcher.clone();
            async move { d.submit(vec![pose(1.0, 0.0)].into()).await }
        });
        wait_goal(&nav, 1).await;
        let (first_goal, _) = nav.current_goal().unwrap();

        let second = tokio::spawn({
            let d = dispatcher.clone();
            async move { d.submit(vec![pose(5.0, 5.0)].into()).await }
        });
        let first = timeout(WAIT, first).await.unwrap().unwrap().unwrap();
        assert_eq!(first, PatrolResponse::Superseded);

        assert_eq!(wait_goal(&nav, 2).await, pose(5.0, 5.0));
        assert_eq!(dispatcher.status(), AgentStatus::GoingToInvestigate);
        nav.resolve_current(NavigationResult::Succeeded);
        let second = timeout(WAIT, second).await.unwrap().unwrap().unwrap();
        assert!(second.is_completed());

        // The old goal was cancelled and the agent never passed through Idle.
        assert!(nav.cancelled_goals().contains(&first_goal));
        let entered = entered_states(&mut events);
        let legs: Vec<usize> = entered
            .iter()
            .enumerate()
            .filter(|(_, s)| **s == MachineState::GoingToInvestigate)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(legs.len(), 2, "entered: {entered:?}");
        assert!(
            !entered[legs[0]..legs[1]].contains(&MachineState::Idle),
            "entered: {entered:?}"
        );
        agent.shutdown().await;
    }

    #[tokio::test]
    async fn stop_while_investigating_returns_to_idle() {
        let (agent, nav) = start();
        let dispatcher = agent.dispatcher();
        let mut events = agent.bus().subscribe_to(Topic::StateMachine);
        let request = tokio::spawn({
            let d = dispatcher.clone();
            async move { d.submit(vec![pose(2.0, 3.0)].into()).await }
        });
        wait_goal(&nav, 1).await;
        nav.resolve_current(NavigationResult::Succeeded);
        let response = timeout(WAIT, request).await.unwrap().unwrap().unwrap();
        assert!(response.is_completed());

        let response = dispatcher.submit(PatrolRoute::stop()).await.unwrap();
        assert_eq!(response.status(), Some(AgentStatus::Available));

        timeout(WAIT, async {
            loop {
                let event = events.recv().await.unwrap();
                if let EventPayload::StateExited {
                    state: MachineState::Investigating,
                    successor,
                } = event.payload
                {
                    assert_eq!(successor, MachineState::Idle);
                    return;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(dispatcher.status(), AgentStatus::Available);
        agent.shutdown().await;
    }

    #[tokio::test]
    async fn state_changes_are_published() {
        let (agent, nav) = start();
        let mut events = agent.bus().subscribe_to(Topic::StateMachine);
        agent.dispatcher().submit(square()).await.unwrap();
        wait_goal(&nav, 1).await;
        assert!(entered_states(&mut events).contains(&MachineState::Patrolling));
        agent.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_cancels_goal_and_releases_requester() {
        let (agent, nav) = start();
        let request = tokio::spawn({
            let d = agent.dispatcher();
            async move { d.submit(vec![pose(6.0, 0.0)].into()).await }
        });
        wait_goal(&nav, 1).await;

        agent.shutdown().await;
        assert_eq!(nav.cancelled_goals().len(), 1);
        let response = timeout(WAIT, request).await.unwrap().unwrap().unwrap();
        assert_eq!(response, PatrolResponse::Superseded);
    }

    #[tokio::test]
    async fn crashed_state_machine_releases_requester() {
        let config = PatrolConfig {
            observation_period: Duration::from_millis(10),
            ..PatrolConfig::default()
        };
        let agent = PatrolAgent::spawn(config, Arc::new(PanickingNavigator)).unwrap();
        let dispatcher = agent.dispatcher();

        let response = timeout(WAIT, dispatcher.submit(vec![pose(1.0, 1.0)].into()))
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(response, PatrolResponse::Aborted(_)), "{response:?}");

        let next = dispatcher.submit(PatrolRoute::stop()).await;
        assert!(matches!(next, Err(PatrolError::Channel(_))), "{next:?}");
        agent.shutdown().await;
    }

    #[tokio::test]
    async fn sim_target_out_of_range_aborts_and_agent_recovers() {
        let config = PatrolConfig {
            observation_period: Duration::from_millis(10),
            ..PatrolConfig::default()
        };
        let agent = PatrolAgent::spawn(config, Arc::new(SimNavigator::new(100.0))).unwrap();
        let dispatcher = agent.dispatcher();

        let response = timeout(WAIT, dispatcher.submit(vec![pose(1e20, 0.0)].into()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            response,
            PatrolResponse::Aborted(PatrolRequestOutcome {
                status: AgentStatus::Available
            })
        );

        let response = timeout(WAIT, dispatcher.submit(vec![pose(0.5, 0.0)].into()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            response,
            PatrolResponse::Completed(PatrolRequestOutcome {
                status: AgentStatus::Investigating
            })
        );
        agent.shutdown().await;
    }
}
