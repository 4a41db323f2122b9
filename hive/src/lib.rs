//! Orchestration engine for a tree of tool-calling language-model agents.
//!
//! A single objective is handed to a root agent, which decomposes it by
//! hiring children; every agent is driven by a model that answers its
//! pending chats with tool calls. The crate is split like this:
//!
//! - **[`core`]**: Pure, deterministic types (ids, roles and the capability
//!   table, chat entries, errors). No I/O.
//! - **[`io`]**: Side-effecting adapters (config, process execution,
//!   sandboxes, the model backend, prompt rendering).
//!
//! [`agent`], [`registry`] and [`tools`] hold agent state, message routing
//! and tool resolution; [`hive`] ties them together into the run context and
//! the post-order scheduler.

pub mod agent;
pub mod core;
pub mod exit_codes;
pub mod hive;
pub mod io;
pub mod logging;
pub mod registry;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod tools;
