use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use quartermaster_core::{AuthError, DatabaseError, GuildError, ImportError, LootError};
use thiserror::Error;

pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Missing or invalid player key")]
    Unauthorized,
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("{0}")]
    BadRequest(String),
    #[error("{resource}:{identifier} not found")]
    NotFound {
        resource: &'static str,
        identifier: &'static str,
    },
    #[error("{resource} with {field} of value {value} already exists")]
    Conflict {
        resource: &'static str,
        field: &'static str,
        value: String,
    },
    #[error("Loot requesting is currently locked")]
    LootLocked,
    #[error("Unknown internal error: {0}")]
    Unknown(String),
}

impl ServerError {
    fn as_status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::LootLocked => StatusCode::CONFLICT,
            Self::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        (self.as_status_code(), self.to_string()).into_response()
    }
}

impl From<DatabaseError> for ServerError {
    fn from(value: DatabaseError) -> Self {
        match value {
            DatabaseError::NotFound {
                resource,
                identifier,
            } => Self::NotFound {
                resource,
                identifier,
            },
            DatabaseError::Conflict {
                resource,
                field,
                value,
            } => Self::Conflict {
                resource,
                field,
                value,
            },
            e => Self::Unknown(e.to_string()),
        }
    }
}

impl From<AuthError> for ServerError {
    fn from(value: AuthError) -> Self {
        match value {
            AuthError::InvalidKey => Self::Unauthorized,
            AuthError::Db(e) => e.into(),
        }
    }
}

impl From<GuildError> for ServerError {
    fn from(value: GuildError) -> Self {
        match value {
            GuildError::NotLeader => Self::Forbidden("Only the guild leader can do this"),
            GuildError::Db(e) => e.into(),
            e => Self::BadRequest(e.to_string()),
        }
    }
}

impl From<LootError> for ServerError {
    fn from(value: LootError) -> Self {
        match value {
            LootError::Locked => Self::LootLocked,
            LootError::NotRequestOwner => {
                Self::Forbidden("Only the requesting player can withdraw a request")
            }
            LootError::Db(e) => e.into(),
            e => Self::BadRequest(e.to_string()),
        }
    }
}

impl From<ImportError> for ServerError {
    fn from(value: ImportError) -> Self {
        match value {
            ImportError::Db(e) => e.into(),
            e => Self::BadRequest(e.to_string()),
        }
    }
}
