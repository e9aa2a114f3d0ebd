//! `patrol-types` – shared vocabulary of the patrol agent.
//!
//! Every crate in the workspace speaks in these types: the [`Pose`] targets
//! handed to the navigation collaborator, the [`PatrolRoute`] payloads that
//! arrive with each request, the closed [`Intent`] a route classifies into,
//! the requester-facing [`AgentStatus`], and the [`Event`] envelope published
//! on the event bus.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ─────────────────────────────────────────────────────────────────────────────
// Geometry
// ─────────────────────────────────────────────────────────────────────────────

/// Cartesian position in metres.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

/// Orientation quaternion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Orientation {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Orientation {
    /// Rotation of `yaw` radians about the vertical axis.
    pub fn from_yaw(yaw: f64) -> Self {
        let half = yaw / 2.0;
        Self {
            x: 0.0,
            y: 0.0,
            z: half.sin(),
            w: half.cos(),
        }
    }

    /// Heading about the vertical axis, in radians.
    pub fn yaw(&self) -> f64 {
        let siny_cosp = 2.0 * (self.w * self.z + self.x * self.y);
        let cosy_cosp = 1.0 - 2.0 * (self.y * self.y + self.z * self.z);
        siny_cosp.atan2(cosy_cosp)
    }

    fn norm(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w).sqrt()
    }
}

impl Default for Orientation {
    fn default() -> Self {
        Self::from_yaw(0.0)
    }
}

/// A navigation target: position plus orientation in a named frame.
///
/// Poses are immutable once constructed; the fields are only readable through
/// accessors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    #[serde(default = "default_frame")]
    frame_id: String,
    position: Position,
    #[serde(default)]
    orientation: Orientation,
}

fn default_frame() -> String {
    "map".to_string()
}

impl Pose {
    pub fn new(frame_id: impl Into<String>, position: Position, orientation: Orientation) -> Self {
        Self {
            frame_id: frame_id.into(),
            position,
            orientation,
        }
    }

    /// Ground-plane pose at (`x`, `y`) facing `yaw` radians.
    pub fn planar(frame_id: impl Into<String>, x: f64, y: f64, yaw: f64) -> Self {
        Self::new(frame_id, Position { x, y, z: 0.0 }, Orientation::from_yaw(yaw))
    }

    pub fn frame_id(&self) -> &str {
        &self.frame_id
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// Euclidean distance between the two positions, ignoring orientation.
    pub fn distance_to(&self, other: &Pose) -> f64 {
        let dx = self.position.x - other.position.x;
        let dy = self.position.y - other.position.y;
        let dz = self.position.z - other.position.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Check that every component is finite and the quaternion is non-zero.
    ///
    /// # Errors
    ///
    /// Returns [`PatrolError::MalformedRequest`] describing the first defect.
    pub fn validate(&self) -> Result<(), PatrolError> {
        let p = self.position;
        if ![p.x, p.y, p.z].iter().all(|v| v.is_finite()) {
            return Err(PatrolError::MalformedRequest(format!(
                "pose position ({}, {}, {}) is not finite",
                p.x, p.y, p.z
            )));
        }
        let q = self.orientation;
        if ![q.x, q.y, q.z, q.w].iter().all(|v| v.is_finite()) || q.norm() < 1e-9 {
            return Err(PatrolError::MalformedRequest(
                "pose orientation is not a valid quaternion".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({:.2}, {:.2}, yaw {:.2})",
            self.frame_id,
            self.position.x,
            self.position.y,
            self.orientation.yaw()
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Requests
// ─────────────────────────────────────────────────────────────────────────────

/// Ordered list of poses carried by an incoming patrol request.
///
/// Zero poses means "stop", one pose means "investigate", more than one means
/// "patrol this loop".  See [`Intent::classify`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PatrolRoute {
    #[serde(default)]
    poses: Vec<Pose>,
}

impl PatrolRoute {
    pub fn new(poses: Vec<Pose>) -> Self {
        Self { poses }
    }

    /// The empty route, i.e. a stop request.
    pub fn stop() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.poses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }

    pub fn pose(&self, index: usize) -> Option<&Pose> {
        self.poses.get(index)
    }

    pub fn poses(&self) -> &[Pose] {
        &self.poses
    }

    /// Parse a request payload such as
    /// `{"poses": [{"frame_id": "map", "position": {"x": 1.0, "y": 2.0}}]}`
    /// and validate it.
    ///
    /// # Errors
    ///
    /// Returns [`PatrolError::MalformedRequest`] if the JSON does not describe
    /// a route or the route fails [`validate`][Self::validate].
    pub fn from_json(raw: &str) -> Result<Self, PatrolError> {
        let route: PatrolRoute = serde_json::from_str(raw)
            .map_err(|e| PatrolError::MalformedRequest(format!("unparseable route: {e}")))?;
        route.validate()?;
        Ok(route)
    }

    /// Reject routes that must never reach the state machine: poses with
    /// non-finite values or degenerate orientations, and routes that mix
    /// coordinate frames.
    pub fn validate(&self) -> Result<(), PatrolError> {
        for (index, pose) in self.poses.iter().enumerate() {
            pose.validate().map_err(|e| match e {
                PatrolError::MalformedRequest(msg) => {
                    PatrolError::MalformedRequest(format!("waypoint {index}: {msg}"))
                }
                other => other,
            })?;
        }
        if let Some(first) = self.poses.first() {
            if let Some(odd) = self.poses.iter().find(|p| p.frame_id != first.frame_id) {
                return Err(PatrolError::MalformedRequest(format!(
                    "route mixes frames '{}' and '{}'",
                    first.frame_id, odd.frame_id
                )));
            }
        }
        Ok(())
    }
}

impl From<Vec<Pose>> for PatrolRoute {
    fn from(poses: Vec<Pose>) -> Self {
        Self::new(poses)
    }
}

/// The classified meaning of an incoming route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "payload", rename_all = "snake_case")]
pub enum Intent {
    /// Stop whatever is running and become available.
    Stop,
    /// Drive to a single point of interest and observe it.
    Investigate(Pose),
    /// Cycle through a closed loop of waypoints starting at `cursor`.
    Patrol { route: PatrolRoute, cursor: usize },
}

impl Intent {
    /// Classify a route by its length: 0 → [`Intent::Stop`],
    /// 1 → [`Intent::Investigate`], more → [`Intent::Patrol`] at cursor 0.
    pub fn classify(route: PatrolRoute) -> Self {
        let mut poses = route.poses;
        match poses.len() {
            0 => Intent::Stop,
            1 => poses.pop().map_or(Intent::Stop, Intent::Investigate),
            _ => Intent::Patrol {
                route: PatrolRoute { poses },
                cursor: 0,
            },
        }
    }

    pub fn kind(&self) -> IntentKind {
        match self {
            Intent::Stop => IntentKind::Stop,
            Intent::Investigate(_) => IntentKind::Investigate,
            Intent::Patrol { .. } => IntentKind::Patrol,
        }
    }
}

/// Action tag of an [`Intent`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    Stop,
    Investigate,
    Patrol,
}

impl fmt::Display for IntentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntentKind::Stop => write!(f, "stop"),
            IntentKind::Investigate => write!(f, "investigate"),
            IntentKind::Patrol => write!(f, "patrol"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Status & state
// ─────────────────────────────────────────────────────────────────────────────

/// High-level status reported to requesters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    #[default]
    Available,
    GoingToInvestigate,
    Investigating,
    Patrolling,
}

impl AgentStatus {
    /// The state-machine state that corresponds to this status.
    pub fn state(self) -> MachineState {
        match self {
            AgentStatus::Available => MachineState::Idle,
            AgentStatus::GoingToInvestigate => MachineState::GoingToInvestigate,
            AgentStatus::Investigating => MachineState::Investigating,
            AgentStatus::Patrolling => MachineState::Patrolling,
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentStatus::Available => write!(f, "available"),
            AgentStatus::GoingToInvestigate => write!(f, "going_to_investigate"),
            AgentStatus::Investigating => write!(f, "investigating"),
            AgentStatus::Patrolling => write!(f, "patrolling"),
        }
    }
}

/// The four mutually exclusive behavioural states of the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MachineState {
    Idle,
    GoingToInvestigate,
    Investigating,
    Patrolling,
}

impl MachineState {
    pub const ALL: [MachineState; 4] = [
        MachineState::Idle,
        MachineState::GoingToInvestigate,
        MachineState::Investigating,
        MachineState::Patrolling,
    ];

    /// The status that is reported while this state is active.
    pub fn status(self) -> AgentStatus {
        match self {
            MachineState::Idle => AgentStatus::Available,
            MachineState::GoingToInvestigate => AgentStatus::GoingToInvestigate,
            MachineState::Investigating => AgentStatus::Investigating,
            MachineState::Patrolling => AgentStatus::Patrolling,
        }
    }

    /// Dense index, used to address per-state storage.
    pub fn index(self) -> usize {
        match self {
            MachineState::Idle => 0,
            MachineState::GoingToInvestigate => 1,
            MachineState::Investigating => 2,
            MachineState::Patrolling => 3,
        }
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MachineState::Idle => write!(f, "IDLE"),
            MachineState::GoingToInvestigate => write!(f, "GOING_TO_INVESTIGATE"),
            MachineState::Investigating => write!(f, "INVESTIGATING"),
            MachineState::Patrolling => write!(f, "PATROLLING"),
        }
    }
}

/// An intent handed to the active state, stamped with the status the
/// dispatcher observed when it issued the redirect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedirectMessage {
    pub intent: Intent,
    pub issued_at: AgentStatus,
}

// ─────────────────────────────────────────────────────────────────────────────
// Outcomes
// ─────────────────────────────────────────────────────────────────────────────

/// Status snapshot returned to a requester.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatrolRequestOutcome {
    pub status: AgentStatus,
}

/// Final answer to a patrol request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum PatrolResponse {
    /// The request is done; `status` is the agent status at completion.
    Completed(PatrolRequestOutcome),
    /// A newer request arrived before this one completed.
    Superseded,
    /// The investigated pose could not be reached and nothing replaced it.
    Aborted(PatrolRequestOutcome),
}

impl PatrolResponse {
    pub fn status(&self) -> Option<AgentStatus> {
        match self {
            PatrolResponse::Completed(outcome) | PatrolResponse::Aborted(outcome) => {
                Some(outcome.status)
            }
            PatrolResponse::Superseded => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, PatrolResponse::Completed(_))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Navigation
// ─────────────────────────────────────────────────────────────────────────────

/// Identifier of one navigation goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GoalId(pub Uuid);

impl GoalId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for GoalId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GoalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Terminal result of a navigation goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationResult {
    Succeeded,
    Failed,
    Preempted,
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

/// Unified event wrapper for the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g. `"patrol-runtime::dispatcher"`
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data routed over the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    /// A patrol request was accepted by the dispatcher.
    RequestReceived {
        intent: IntentKind,
        waypoints: usize,
        status: AgentStatus,
    },
    StatusChanged {
        from: AgentStatus,
        to: AgentStatus,
    },
    StateEntered {
        state: MachineState,
        target: Option<Pose>,
        cursor: Option<usize>,
    },
    StateExited {
        state: MachineState,
        successor: MachineState,
    },
    NavigationFinished {
        goal: GoalId,
        target: Pose,
        result: NavigationResult,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Workspace-wide error type.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PatrolError {
    #[error("Malformed Request: {0}")]
    MalformedRequest(String),

    #[error("Protocol Violation in {state} (status {status}): {details}")]
    ProtocolViolation {
        status: AgentStatus,
        state: MachineState,
        details: String,
    },

    #[error("Navigation Failure: {0}")]
    Navigation(String),

    #[error("Channel Error: {0}")]
    Channel(String),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Serialization Error: {0}")]
    Serialization(String),
}
