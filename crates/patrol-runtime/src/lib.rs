//! `patrol-runtime` – request dispatch and the patrol state machine.
//!
//! # Modules
//!
//! - [`dispatcher`] – [`PatrolDispatcher`][dispatcher::PatrolDispatcher]:
//!   validates and classifies incoming routes, applies the
//!   [`transition`] table, and hands redirects to the active state.
//! - [`mailbox`] – [`RedirectMailbox`][mailbox::RedirectMailbox]: the
//!   one-slot, latest-wins channel between dispatcher and states.
//! - [`state_machine`] – [`StateMachine`][state_machine::StateMachine]: runs
//!   Idle, GoingToInvestigate, Investigating and Patrolling, one at a time.
//! - [`agent`] – [`PatrolAgent`][agent::PatrolAgent]: spawns the machine on
//!   Tokio around a [`NavigationGoalClient`][patrol_hal::NavigationGoalClient].
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: global
//!   subscriber with optional OTLP export.
//!
//! # Ownership
//!
//! The status lives in the dispatcher's core.  States never write it
//! directly: they report arrival or failure, and hand over to a successor,
//! under the same lock the dispatcher takes for each request.

pub mod agent;
mod coordinator;
pub mod dispatcher;
pub mod mailbox;
pub mod state_machine;
mod states;
pub mod telemetry;
pub mod transition;

pub use agent::{PatrolAgent, PatrolConfig};
pub use dispatcher::PatrolDispatcher;
pub use mailbox::RedirectMailbox;
pub use state_machine::{State, StateMachine};
pub use telemetry::{TracerProviderGuard, init_tracing};
