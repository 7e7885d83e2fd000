use crate::access::Caller;
use crate::domain::models::Identity;
use crate::state::SharedState;
use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap, StatusCode},
};

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Axum extractor for the verified caller.
///
/// Usage:
/// ```ignore
/// async fn handler(user: AuthUser) -> Result<...> {
///     let caller = user.caller();
/// }
/// ```
pub struct AuthUser(pub Identity);

impl AuthUser {
    pub fn caller(&self) -> Caller {
        Caller::user(self.0.clone())
    }

    pub fn user_id(&self) -> uuid::Uuid {
        self.0.user_id
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    SharedState: FromRef<S>,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let shared_state = SharedState::from_ref(state);

        let token = bearer_token(&parts.headers).ok_or(StatusCode::UNAUTHORIZED)?;

        let identity = shared_state.identity.verify(token).map_err(|e| {
            tracing::warn!("Token verification failed: {}", e);
            StatusCode::UNAUTHORIZED
        })?;

        Ok(AuthUser(identity))
    }
}
