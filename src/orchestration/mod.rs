//! Background entry points into the agent.
//!
//! [`manager::SubagentManager`] supervises spawned sub-agents and
//! [`heartbeat::Heartbeat`] invokes the agent on a timer. Both run the same
//! [`crate::agent::Agent`] as the foreground path and report through records
//! and events instead of return values.

pub mod heartbeat;
pub mod manager;
pub mod types;
