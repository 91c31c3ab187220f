// src/models/actor.rs
//! The caller on whose behalf an operation runs.

use std::fmt;

/// Authenticated user or anonymous caller.
///
/// Resolution from request credentials happens at the HTTP boundary; services
/// only see this type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Actor {
    User(String),
    Anonymous,
}

impl Actor {
    pub fn user(id: impl Into<String>) -> Self {
        Actor::User(id.into())
    }

    /// Actor id for authenticated callers.
    pub fn id(&self) -> Option<&str> {
        match self {
            Actor::User(id) => Some(id.as_str()),
            Actor::Anonymous => None,
        }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::User(id) => write!(f, "user:{}", id),
            Actor::Anonymous => f.write_str("anonymous"),
        }
    }
}
