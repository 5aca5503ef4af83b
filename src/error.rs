//! Crate-wide error type.
//!
//! A flat enum with a `Display` impl and no dependency on an external
//! error-boilerplate crate.

use std::fmt;

/// Errors surfaced by the engine, task runtime, and access gate.
///
/// Task handlers never propagate these as panics — on `Err` they publish a
/// best-effort `error` event and leave the last-saved state untouched.
#[derive(Debug)]
pub enum SimError {
    /// No simulation exists for the given id (or it expired).
    NotFound(String),
    /// The requester is not the owner and is not the matching guest.
    AccessDenied,
    /// The scenario key doesn't match any entry in the scenario catalog.
    InvalidScenario(String),
    /// The action text couldn't be dispatched in the current state.
    InvalidAction(String),
    /// State serialization/deserialization failed.
    Serialization(serde_json::Error),
    /// The LLM oracle returned an error instead of a usable reply.
    Oracle(String),
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimError::NotFound(id) => write!(f, "no simulation found for id '{}'", id),
            SimError::AccessDenied => write!(f, "access denied"),
            SimError::InvalidScenario(key) => write!(f, "invalid scenario key '{}'", key),
            SimError::InvalidAction(text) => write!(f, "action not applicable: '{}'", text),
            SimError::Serialization(e) => write!(f, "serialization failure: {}", e),
            SimError::Oracle(reason) => write!(f, "oracle error: {}", reason),
        }
    }
}

impl std::error::Error for SimError {}

impl From<serde_json::Error> for SimError {
    fn from(e: serde_json::Error) -> Self {
        SimError::Serialization(e)
    }
}

pub type SimResult<T> = Result<T, SimError>;
