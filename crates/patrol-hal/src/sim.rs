//! In-process navigation simulator for running the agent without a robot.
//!
//! [`SimNavigator`] moves a virtual agent in a straight line towards each goal
//! at a fixed speed.  Goals succeed on arrival, resolve to
//! [`NavigationResult::Preempted`] when cancelled (the agent stops where it
//! is), and fail immediately when the target lies outside the optional
//! workspace rectangle, which stands in for a planner that finds no path.
//! A target so far away that its travel time overflows also fails.
//!
//! # Example
//!
//! ```rust
//! use patrol_hal::sim::SimNavigator;
//! use patrol_types::Position;
//!
//! let nav = SimNavigator::new(0.5)
//!     .with_start(Position { x: 1.0, y: 1.0, z: 0.0 })
//!     .with_workspace((-10.0, -10.0), (10.0, 10.0));
//!
//! assert_eq!(nav.position().x, 1.0);
//! ```

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use patrol_types::{GoalId, NavigationResult, PatrolError, Pose, Position};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::navigation::{GoalTable, NavigationGoalClient, await_slot, lock};

/// Slowest speed the simulator accepts, in metres per second.
const MIN_SPEED_MPS: f64 = 0.01;

struct ActiveGoal {
    id: GoalId,
    from: Position,
    to: Position,
    started: Instant,
    duration: Duration,
    arrival: JoinHandle<()>,
}

impl ActiveGoal {
    /// Where the agent is along the straight-line leg right now.
    fn interpolate(&self) -> Position {
        let fraction = if self.duration.is_zero() {
            1.0
        } else {
            (self.started.elapsed().as_secs_f64() / self.duration.as_secs_f64()).min(1.0)
        };
        Position {
            x: self.from.x + (self.to.x - self.from.x) * fraction,
            y: self.from.y + (self.to.y - self.from.y) * fraction,
            z: self.from.z + (self.to.z - self.from.z) * fraction,
        }
    }
}

fn distance(a: Position, b: Position) -> f64 {
    ((b.x - a.x).powi(2) + (b.y - a.y).powi(2) + (b.z - a.z).powi(2)).sqrt()
}

#[derive(Default)]
struct SimState {
    table: GoalTable,
    position: Position,
    active: Option<ActiveGoal>,
}

impl SimState {
    /// Stop the active leg, if any, leaving the agent where it currently is.
    fn halt(&mut self) -> Option<GoalId> {
        let active = self.active.take()?;
        active.arrival.abort();
        self.position = active.interpolate();
        self.table.resolve(active.id, NavigationResult::Preempted);
        Some(active.id)
    }
}

/// Straight-line navigation simulator.  See the [module docs](self).
pub struct SimNavigator {
    speed_mps: f64,
    workspace: Option<((f64, f64), (f64, f64))>,
    state: Arc<Mutex<SimState>>,
}

impl SimNavigator {
    /// Create a simulator that travels at `speed_mps` metres per second.
    pub fn new(speed_mps: f64) -> Self {
        Self {
            speed_mps: speed_mps.max(MIN_SPEED_MPS),
            workspace: None,
            state: Arc::new(Mutex::new(SimState::default())),
        }
    }

    /// Place the agent at `position` before any goal is sent.
    pub fn with_start(self, position: Position) -> Self {
        lock(&self.state).position = position;
        self
    }

    /// Reject targets outside the axis-aligned rectangle `min`..`max`.
    pub fn with_workspace(mut self, min: (f64, f64), max: (f64, f64)) -> Self {
        self.workspace = Some((min, max));
        self
    }

    /// Current simulated position.
    pub fn position(&self) -> Position {
        let state = lock(&self.state);
        match &state.active {
            Some(active) => active.interpolate(),
            None => state.position,
        }
    }

    fn reachable(&self, target: &Position) -> bool {
        match self.workspace {
            Some(((min_x, min_y), (max_x, max_y))) => {
                (min_x..=max_x).contains(&target.x) && (min_y..=max_y).contains(&target.y)
            }
            None => true,
        }
    }
}

#[async_trait]
impl NavigationGoalClient for SimNavigator {
    async fn send_goal(&self, target: Pose) -> Result<GoalId, PatrolError> {
        target
            .validate()
            .map_err(|e| PatrolError::Navigation(format!("rejected target {target}: {e}")))?;

        let mut state = lock(&self.state);
        if let Some(old) = state.halt() {
            debug!(goal = %old, "sim goal preempted by new goal");
        }
        let (id, _) = state.table.open();
        let to = target.position();

        if !self.reachable(&to) {
            info!(goal = %id, %target, "sim target outside workspace; goal failed");
            state.table.resolve(id, NavigationResult::Failed);
            return Ok(id);
        }

        let from = state.position;
        let Ok(duration) = Duration::try_from_secs_f64(distance(from, to) / self.speed_mps) else {
            info!(goal = %id, %target, "sim target too far to schedule; goal failed");
            state.table.resolve(id, NavigationResult::Failed);
            return Ok(id);
        };

        let shared = Arc::clone(&self.state);
        let arrival = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let mut state = lock(&shared);
            if state.active.as_ref().map(|a| a.id) == Some(id) {
                state.active = None;
                state.position = to;
                state.table.resolve(id, NavigationResult::Succeeded);
            }
        });

        debug!(goal = %id, %target, ?duration, "sim goal accepted");
        state.active = Some(ActiveGoal {
            id,
            from,
            to,
            started: Instant::now(),
            duration,
            arrival,
        });
        Ok(id)
    }

    async fn cancel_goal(&self, goal: GoalId) {
        let mut state = lock(&self.state);
        if state.active.as_ref().map(|a| a.id) == Some(goal) {
            state.halt();
        }
    }

    async fn cancel_all(&self) {
        lock(&self.state).halt();
    }

    async fn wait_for_result(&self, goal: GoalId) -> NavigationResult {
        let slot = lock(&self.state).table.subscribe(goal);
        await_slot(slot).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> SimNavigator {
        SimNavigator::new(100.0)
    }

    #[tokio::test]
    async fn goal_succeeds_on_arrival() {
        let nav = fast();
        let goal = nav.send_goal(Pose::planar("map", 1.0, 0.0, 0.0)).await.unwrap();
        assert_eq!(nav.wait_for_result(goal).await, NavigationResult::Succeeded);
        assert!((nav.position().x - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn cancel_preempts_and_stops_midway() {
        let nav = SimNavigator::new(1.0);
        let goal = nav.send_goal(Pose::planar("map", 100.0, 0.0, 0.0)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        nav.cancel_goal(goal).await;

        assert_eq!(nav.wait_for_result(goal).await, NavigationResult::Preempted);
        let x = nav.position().x;
        assert!(x > 0.0 && x < 100.0, "agent should stop part-way, got {x}");
    }

    #[tokio::test]
    async fn target_outside_workspace_fails() {
        let nav = fast().with_workspace((-1.0, -1.0), (1.0, 1.0));
        let goal = nav.send_goal(Pose::planar("map", 5.0, 0.0, 0.0)).await.unwrap();
        assert_eq!(nav.wait_for_result(goal).await, NavigationResult::Failed);
    }

    #[tokio::test]
    async fn new_goal_preempts_outstanding_goal() {
        let nav = SimNavigator::new(1.0);
        let first = nav.send_goal(Pose::planar("map", 50.0, 0.0, 0.0)).await.unwrap();
        let second = nav.send_goal(Pose::planar("map", 0.0, 0.0, 0.0)).await.unwrap();
        assert_ne!(first, second);
        assert_eq!(nav.wait_for_result(second).await, NavigationResult::Succeeded);
    }

    #[tokio::test]
    async fn stale_cancel_does_not_touch_current_goal() {
        let nav = fast();
        let first = nav.send_goal(Pose::planar("map", 0.5, 0.0, 0.0)).await.unwrap();
        assert_eq!(nav.wait_for_result(first).await, NavigationResult::Succeeded);

        let second = nav.send_goal(Pose::planar("map", 1.0, 0.0, 0.0)).await.unwrap();
        nav.cancel_goal(first).await;
        assert_eq!(nav.wait_for_result(second).await, NavigationResult::Succeeded);
    }

    #[tokio::test]
    async fn cancel_all_without_goal_is_noop() {
        let nav = fast();
        nav.cancel_all().await;
        assert_eq!(nav.position(), Position::default());
    }

    #[tokio::test]
    async fn unreachably_far_target_fails() {
        let nav = SimNavigator::new(0.5);
        let goal = nav.send_goal(Pose::planar("map", 1e20, 0.0, 0.0)).await.unwrap();
        assert_eq!(nav.wait_for_result(goal).await, NavigationResult::Failed);
        assert_eq!(nav.position(), Position::default());

        // The simulator keeps working afterwards.
        let next = nav.send_goal(Pose::planar("map", 0.0, 0.0, 0.0)).await.unwrap();
        assert_eq!(nav.wait_for_result(next).await, NavigationResult::Succeeded);
    }

    #[tokio::test]
    async fn malformed_target_is_rejected() {
        let nav = fast();
        let result = nav.send_goal(Pose::planar("map", f64::INFINITY, 0.0, 0.0)).await;
        assert!(matches!(result, Err(PatrolError::Navigation(_))));
    }
}
