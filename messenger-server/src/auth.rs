use anyhow::anyhow;
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use messenger_common::{User, UserId, USER_ID_HEADER};

use crate::error::AppError;
use crate::State;

/// The user an upstream authentication layer vouched for.
///
/// Sessions and cookies live outside this server; it only trusts the
/// identity header and checks that the user exists.
#[derive(Clone, Debug)]
pub struct CurrentUser(pub User);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let state = parts
            .extensions
            .get::<State>()
            .cloned()
            .ok_or_else(|| AppError::Internal(anyhow!("State extension missing")))?;
        let login_required = || AppError::Unauthorized("Login required".into());
        let id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse().ok())
            .map(UserId)
            .ok_or_else(login_required)?;
        let user = state.users.find(id)?.ok_or_else(login_required)?;
        Ok(CurrentUser(user))
    }
}
