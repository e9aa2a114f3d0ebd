//! `patrol-hal` – navigation abstraction layer.
//!
//! The state machine drives the agent exclusively through the
//! [`NavigationGoalClient`] trait.  Concrete drivers live here:
//!
//! - [`sim`] – [`SimNavigator`][sim::SimNavigator]: straight-line motion
//!   simulator used by the CLI when no robot is attached.
//! - [`scripted`] – [`ScriptedNavigator`][scripted::ScriptedNavigator]: a
//!   test double whose goals finish only when the test resolves them.

pub mod navigation;
pub mod scripted;
pub mod sim;

pub use navigation::NavigationGoalClient;
pub use scripted::ScriptedNavigator;
pub use sim::SimNavigator;
