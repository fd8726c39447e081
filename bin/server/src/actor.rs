//! Actor extraction from request headers.
//!
//! Callers identify themselves with `x-reportek-actor` (an actor kind such
//! as `reporter` or `client`) and optionally `x-reportek-user`. The system
//! actor is reserved for the engine and cannot be claimed over HTTP.

use crate::error::ApiError;
use axum::{extract::FromRequestParts, http::request::Parts};
use reportek_core::UserId;
use reportek_workflow::{ActorContext, ActorKind};
use std::str::FromStr;

pub const ACTOR_HEADER: &str = "x-reportek-actor";
pub const USER_HEADER: &str = "x-reportek-user";

/// The caller of a request.
pub struct Actor(pub ActorContext);

fn header<'a>(parts: &'a Parts, name: &str) -> Result<Option<&'a str>, ApiError> {
    parts
        .headers
        .get(name)
        .map(|value| value.to_str())
        .transpose()
        .map_err(|e| ApiError::InvalidActor {
            details: format!("{name}: {e}"),
        })
}

impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let kind = header(parts, ACTOR_HEADER)?.ok_or_else(|| ApiError::InvalidActor {
            details: format!("missing {ACTOR_HEADER} header"),
        })?;
        let kind = ActorKind::from_str(kind).map_err(|e| ApiError::InvalidActor {
            details: e.to_string(),
        })?;
        if kind.is_system() {
            return Err(ApiError::InvalidActor {
                details: "the system actor cannot be claimed".to_string(),
            });
        }

        let user = header(parts, USER_HEADER)?
            .map(UserId::from_str)
            .transpose()
            .map_err(|e| ApiError::InvalidActor {
                details: e.to_string(),
            })?;

        Ok(Actor(ActorContext { kind, user }))
    }
}

impl Actor {
    /// Fails unless the caller is an administrator.
    ///
    /// # Errors
    ///
    /// Returns `AdminRequired` for every other actor kind.
    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.0.kind == ActorKind::Admin {
            Ok(())
        } else {
            Err(ApiError::AdminRequired)
        }
    }
}
