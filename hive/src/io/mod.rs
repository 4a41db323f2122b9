//! Side-effecting adapters: configuration, processes, sandboxes, the model
//! backend and prompt rendering.

pub mod config;
pub mod model;
pub mod process;
pub mod prompt;
pub mod sandbox;
