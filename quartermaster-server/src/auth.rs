use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use quartermaster_core::{GuildData, PlayerData, SessionData};

use crate::{context::ServerContext, errors::ServerError};

/// Wraps [SessionData] so [FromRequestParts] can be implemented for it
pub struct Session(SessionData);

impl Session {
    pub fn player(&self) -> &PlayerData {
        &self.0.player
    }

    pub fn guild(&self) -> &GuildData {
        &self.0.guild
    }

    /// Errors unless the acting player carries the admin flag
    pub fn require_admin(&self) -> Result<(), ServerError> {
        if self.0.player.admin {
            Ok(())
        } else {
            Err(ServerError::Forbidden("This action requires admin rights"))
        }
    }
}

#[async_trait]
impl FromRequestParts<ServerContext> for Session {
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ServerContext,
    ) -> Result<Self, Self::Rejection> {
        let key = bearer_key(parts)
            .or_else(|| query_key(parts))
            .ok_or(ServerError::Unauthorized)?;

        let session = state.app.auth.session(&key).await?;

        Ok(Self(session))
    }
}

fn bearer_key(parts: &Parts) -> Option<String> {
    let header = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|x| x.to_str().ok())?;

    header
        .strip_prefix("Bearer ")
        .map(|key| key.trim().to_string())
}

/// The SSE stream cannot set headers, so it passes the key as `?key=`
fn query_key(parts: &Parts) -> Option<String> {
    parts
        .uri
        .query()?
        .split('&')
        .find_map(|pair| pair.strip_prefix("key="))
        .map(str::to_string)
}
