// ==========================================
// Precast tracking backend - session extraction
// ==========================================

use crate::api::ApiError;
use crate::domain::CallerContext;
use crate::server::AppState;
use crate::services::{bearer_token, AuthError};
use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

/// Authenticated caller of a handler.
pub struct Caller(pub CallerContext);

#[async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(bearer_token)
            .ok_or(AuthError::MissingToken)?;

        let mut caller = state.sessions.validate(token).await?;
        if caller.ip.is_none() {
            caller.ip = forwarded_for(parts);
        }
        Ok(Caller(caller))
    }
}

fn forwarded_for(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
}
