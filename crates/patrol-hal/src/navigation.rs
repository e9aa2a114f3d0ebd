//! Generic [`NavigationGoalClient`] trait for anything that can drive the
//! agent to a target pose.
//!
//! Drivers implement this trait and the runtime only ever talks to the trait,
//! so a costmap planner, a simulator, or a test script can be swapped in
//! without touching the state machine.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use patrol_types::{GoalId, NavigationResult, PatrolError, Pose};
use tokio::sync::watch;

/// Client side of a navigation action: one outstanding goal at a time.
///
/// # Contract
///
/// * `send_goal` while a goal is outstanding preempts the old goal first.
/// * `cancel_goal` on a goal that is no longer outstanding is a no-op, so a
///   state can never cancel a goal that belongs to someone else.
/// * `cancel_all` with nothing outstanding is a no-op.
/// * `wait_for_result` returns the terminal [`NavigationResult`]; a
///   cancelled goal resolves to [`NavigationResult::Preempted`].  Waiting on
///   an unknown goal yields [`NavigationResult::Failed`].
#[async_trait]
pub trait NavigationGoalClient: Send + Sync {
    /// Start driving towards `target`.
    ///
    /// # Errors
    ///
    /// Returns [`PatrolError::Navigation`] when the goal cannot be submitted
    /// (e.g. the navigation server is unreachable).
    async fn send_goal(&self, target: Pose) -> Result<GoalId, PatrolError>;

    async fn cancel_goal(&self, goal: GoalId);

    async fn cancel_all(&self);

    async fn wait_for_result(&self, goal: GoalId) -> NavigationResult;
}

// ────────────────────────────────────────────────────────────────────────────
// Goal bookkeeping shared by the bundled drivers
// ────────────────────────────────────────────────────────────────────────────

/// Per-goal result slots.  A slot holds `None` while the goal is outstanding
/// and is written exactly once with its terminal result.
#[derive(Default)]
pub(crate) struct GoalTable {
    goals: HashMap<GoalId, watch::Sender<Option<NavigationResult>>>,
    current: Option<GoalId>,
}

impl GoalTable {
    /// Register a new goal as the current one.  The previous current goal, if
    /// still outstanding, resolves to `Preempted`.  Finished goals are pruned.
    pub(crate) fn open(&mut self) -> (GoalId, Option<GoalId>) {
        let preempted = self
            .current
            .take()
            .filter(|old| self.resolve(*old, NavigationResult::Preempted));
        self.goals.retain(|_, slot| slot.borrow().is_none());

        let id = GoalId::new();
        let (tx, _) = watch::channel(None);
        self.goals.insert(id, tx);
        self.current = Some(id);
        (id, preempted)
    }

    /// Write the terminal result of `goal`.  Returns `false` when the goal is
    /// unknown or already finished.
    pub(crate) fn resolve(&mut self, goal: GoalId, result: NavigationResult) -> bool {
        let Some(slot) = self.goals.get(&goal) else {
            return false;
        };
        let written = slot.send_if_modified(|value| {
            if value.is_none() {
                *value = Some(result);
                true
            } else {
                false
            }
        });
        if written && self.current == Some(goal) {
            self.current = None;
        }
        written
    }

    pub(crate) fn current(&self) -> Option<GoalId> {
        self.current
    }

    pub(crate) fn subscribe(&self, goal: GoalId) -> Option<watch::Receiver<Option<NavigationResult>>> {
        self.goals.get(&goal).map(watch::Sender::subscribe)
    }
}

/// Await the terminal value of a goal slot.
pub(crate) async fn await_slot(
    slot: Option<watch::Receiver<Option<NavigationResult>>>,
) -> NavigationResult {
    let Some(mut rx) = slot else {
        return NavigationResult::Failed;
    };
    match rx.wait_for(Option::is_some).await {
        Ok(value) => (*value).unwrap_or(NavigationResult::Failed),
        Err(_) => NavigationResult::Failed,
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
