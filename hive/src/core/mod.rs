//! Deterministic, pure logic shared by the orchestration engine.
//!
//! Core modules must be free of I/O side effects. They define identifiers,
//! roles and their capability table, chat views, the model wire types and the
//! error taxonomy.

pub mod chat;
pub mod error;
pub mod ids;
pub mod role;
pub mod types;
