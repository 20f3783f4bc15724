//! Layers wrapped around the route table.
//!
//! The chain, outermost first: [`AccessLog`] (when a sink is configured),
//! then [`HostGuard`], then the [`Router`](crate::Router).

pub mod access_log;
pub mod guard;

pub use access_log::AccessLog;
pub use guard::HostGuard;
