//! Actors that may drive a workflow.
//!
//! The caller's identity is resolved by the authentication layer; the engine
//! only ever sees an [`ActorContext`] naming the kind of actor and, for human
//! actors, the user behind the request.

use reportek_core::UserId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kinds of entities that can act on a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorKind {
    /// The engine itself, used by automatic transitions.
    System,
    /// Workflow managers, support staff.
    Admin,
    /// Users reporting on an obligation.
    Reporter,
    /// Users acting as client representatives.
    Client,
    /// Users acting as delivery auditors.
    Auditor,
}

impl ActorKind {
    /// All actor kinds, in declaration order.
    pub const ALL: [ActorKind; 5] = [
        Self::System,
        Self::Admin,
        Self::Reporter,
        Self::Client,
        Self::Auditor,
    ];

    /// Returns the snake_case name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Admin => "admin",
            Self::Reporter => "reporter",
            Self::Client => "client",
            Self::Auditor => "auditor",
        }
    }

    #[must_use]
    pub fn is_system(&self) -> bool {
        matches!(self, Self::System)
    }
}

impl fmt::Display for ActorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when an actor kind name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownActorKind(pub String);

impl fmt::Display for UnknownActorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown actor kind: {}", self.0)
    }
}

impl std::error::Error for UnknownActorKind {}

impl FromStr for ActorKind {
    type Err = UnknownActorKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownActorKind(s.to_string()))
    }
}

/// Who is asking for a transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorContext {
    pub kind: ActorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserId>,
}

impl ActorContext {
    /// The engine acting on its own behalf.
    #[must_use]
    pub fn system() -> Self {
        Self {
            kind: ActorKind::System,
            user: None,
        }
    }

    /// A human actor of the given kind.
    #[must_use]
    pub fn user(kind: ActorKind, user: UserId) -> Self {
        Self {
            kind,
            user: Some(user),
        }
    }

    /// An actor of the given kind with no resolved user.
    #[must_use]
    pub fn anonymous(kind: ActorKind) -> Self {
        Self { kind, user: None }
    }

    #[must_use]
    pub fn is_system(&self) -> bool {
        self.kind.is_system()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("Reporter".parse::<ActorKind>(), Ok(ActorKind::Reporter));
        assert_eq!(" auditor ".parse::<ActorKind>(), Ok(ActorKind::Auditor));
        assert!("robot".parse::<ActorKind>().is_err());
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&ActorKind::Client).expect("serialize");
        assert_eq!(json, "\"client\"");
    }

    #[test]
    fn system_context_has_no_user() {
        let ctx = ActorContext::system();
        assert!(ctx.is_system());
        assert!(ctx.user.is_none());

        let user = UserId::new();
        let ctx = ActorContext::user(ActorKind::Admin, user);
        assert!(!ctx.is_system());
        assert_eq!(ctx.user, Some(user));
    }
}
