//! Subcommand implementations.

pub mod send;
pub mod serve;

pub use send::SendArgs;
pub use serve::{register_demo_routes, ActorRegistry};
