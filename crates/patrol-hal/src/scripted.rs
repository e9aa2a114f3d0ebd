//! Hand-driven navigation client for headless tests.
//!
//! [`ScriptedNavigator`] accepts goals and leaves them outstanding until the
//! test decides their fate with [`resolve_current`][ScriptedNavigator::resolve_current].
//! Every sent pose and every cancellation is recorded so tests can assert on
//! exactly what the state machine asked for.

use std::sync::Mutex;

use async_trait::async_trait;
use patrol_types::{GoalId, NavigationResult, PatrolError, Pose};
use tokio::sync::watch;
use tracing::debug;

use crate::navigation::{GoalTable, NavigationGoalClient, await_slot, lock};

#[derive(Default)]
struct Script {
    table: GoalTable,
    sent: Vec<(GoalId, Pose)>,
    cancelled: Vec<GoalId>,
}

/// Navigation test double.  Goals only finish when the test says so, or when
/// they are cancelled (→ [`NavigationResult::Preempted`]).
pub struct ScriptedNavigator {
    script: Mutex<Script>,
    sent_count: watch::Sender<usize>,
}

impl ScriptedNavigator {
    pub fn new() -> Self {
        let (sent_count, _) = watch::channel(0);
        Self {
            script: Mutex::new(Script::default()),
            sent_count,
        }
    }

    /// Every pose sent so far, oldest first.
    pub fn sent_goals(&self) -> Vec<Pose> {
        lock(&self.script).sent.iter().map(|(_, pose)| pose.clone()).collect()
    }

    /// Goals that were cancelled while still outstanding.
    pub fn cancelled_goals(&self) -> Vec<GoalId> {
        lock(&self.script).cancelled.clone()
    }

    /// The outstanding goal and its target, if any.
    pub fn current_goal(&self) -> Option<(GoalId, Pose)> {
        let script = lock(&self.script);
        let current = script.table.current()?;
        script.sent.iter().find(|(id, _)| *id == current).cloned()
    }

    /// Finish the outstanding goal with `result`.  Returns the goal that was
    /// resolved, or `None` when nothing was outstanding.
    pub fn resolve_current(&self, result: NavigationResult) -> Option<GoalId> {
        let mut script = lock(&self.script);
        let goal = script.table.current()?;
        script.table.resolve(goal, result).then_some(goal)
    }

    /// Wait until at least `count` goals have been sent, then return them all.
    pub async fn wait_for_goals(&self, count: usize) -> Vec<Pose> {
        let mut rx = self.sent_count.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|sent| *sent >= count).await;
        self.sent_goals()
    }
}

impl Default for ScriptedNavigator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NavigationGoalClient for ScriptedNavigator {
    async fn send_goal(&self, target: Pose) -> Result<GoalId, PatrolError> {
        let mut script = lock(&self.script);
        let (id, preempted) = script.table.open();
        if let Some(old) = preempted {
            script.cancelled.push(old);
        }
        debug!(goal = %id, %target, "scripted goal accepted");
        script.sent.push((id, target));
        let count = script.sent.len();
        drop(script);
        self.sent_count.send_replace(count);
        Ok(id)
    }

    async fn cancel_goal(&self, goal: GoalId) {
        let mut script = lock(&self.script);
        if script.table.resolve(goal, NavigationResult::Preempted) {
            script.cancelled.push(goal);
        }
    }

    async fn cancel_all(&self) {
        let mut script = lock(&self.script);
        if let Some(goal) = script.table.current() {
            script.table.resolve(goal, NavigationResult::Preempted);
            script.cancelled.push(goal);
        }
    }

    async fn wait_for_result(&self, goal: GoalId) -> NavigationResult {
        let slot = lock(&self.script).table.subscribe(goal);
        await_slot(slot).await
    }
}
