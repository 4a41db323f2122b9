//! Process-unique, human-legible agent identifiers.
//!
//! Ids combine a monotonic base36 counter with a short random suffix. The
//! counter alone guarantees uniqueness for the lifetime of one generator; the
//! suffix keeps ids from different runs visually distinct in logs.

use std::borrow::Borrow;
use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const SUFFIX_LEN: usize = 3;
const EXTERNAL_ID: &str = "user";

/// Identifier of a participant in the agent tree.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Fixed id of the driver's endpoint. Generated ids always contain a `-`,
    /// so this can never collide with one.
    pub fn external() -> Self {
        Self(EXTERNAL_ID.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for AgentId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AgentId {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

/// Generates ids that are unique for the lifetime of the generator.
#[derive(Debug, Default)]
pub struct IdGenerator {
    issued: u64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> AgentId {
        self.issued += 1;
        let mut rng = rand::thread_rng();
        let suffix: String = (0..SUFFIX_LEN)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect();
        AgentId(format!("{}-{}", base36(self.issued), suffix))
    }
}

fn base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(ALPHABET[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}
