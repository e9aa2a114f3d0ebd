//! `patrol-middleware` – event routing for the patrol agent.
//!
//! The state machine and dispatcher never talk to observers directly.  They
//! publish [`Event`][patrol_types::Event]s onto the [`EventBus`] and any
//! introspection tooling (the CLI echo, a dashboard, a recorder) subscribes.
//!
//! # Modules
//!
//! - [`bus`] – topic-partitioned publish/subscribe bus built on Tokio
//!   broadcast channels.

pub mod bus;

pub use bus::{EventBus, Topic, TopicReceiver};
