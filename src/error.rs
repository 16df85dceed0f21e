use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::models::{ApiError, ApiResponse};

pub type AppResult<T> = Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("No offers available right now")]
    EmptyPool,

    #[error("Offer {offer_id} has no unclaimed codes left")]
    OfferExhausted { offer_id: String },

    #[error("Lost the claim race on offer {offer_id}")]
    AlreadyClaimedByOther { offer_id: String },

    #[error("Remote error: {0}")]
    RemoteError(String),

    #[error("A play is already in progress for this user")]
    PlayInProgress,

    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::DbErr),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error("JWT error: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),

    #[error("HTTP request error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),
}

/// 通知层可见的错误分类（不会出现未分类的错误）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlayErrorKind {
    NotAuthenticated,
    EmptyPool,
    OfferExhausted,
    AlreadyClaimedByOther,
    RemoteError,
    PlayInProgress,
    ValidationError,
    InternalError,
}

impl PlayErrorKind {
    pub fn as_code(&self) -> &'static str {
        match self {
            PlayErrorKind::NotAuthenticated => "NOT_AUTHENTICATED",
            PlayErrorKind::EmptyPool => "EMPTY_POOL",
            PlayErrorKind::OfferExhausted => "OFFER_EXHAUSTED",
            PlayErrorKind::AlreadyClaimedByOther => "ALREADY_CLAIMED_BY_OTHER",
            PlayErrorKind::RemoteError => "REMOTE_ERROR",
            PlayErrorKind::PlayInProgress => "PLAY_IN_PROGRESS",
            PlayErrorKind::ValidationError => "VALIDATION_ERROR",
            PlayErrorKind::InternalError => "INTERNAL_ERROR",
        }
    }

    /// 是否可以稍后重试
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PlayErrorKind::EmptyPool
                | PlayErrorKind::OfferExhausted
                | PlayErrorKind::AlreadyClaimedByOther
                | PlayErrorKind::RemoteError
                | PlayErrorKind::PlayInProgress
        )
    }
}

impl AppError {
    pub fn kind(&self) -> PlayErrorKind {
        match self {
            AppError::NotAuthenticated | AppError::JwtError(_) => PlayErrorKind::NotAuthenticated,
            AppError::EmptyPool => PlayErrorKind::EmptyPool,
            AppError::OfferExhausted { .. } => PlayErrorKind::OfferExhausted,
            AppError::AlreadyClaimedByOther { .. } => PlayErrorKind::AlreadyClaimedByOther,
            AppError::RemoteError(_) | AppError::ReqwestError(_) => PlayErrorKind::RemoteError,
            AppError::PlayInProgress => PlayErrorKind::PlayInProgress,
            AppError::ValidationError(_) => PlayErrorKind::ValidationError,
            AppError::DatabaseError(_)
            | AppError::ConfigError(_)
            | AppError::InternalError(_)
            | AppError::SerdeJsonError(_) => PlayErrorKind::InternalError,
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self.kind() {
            PlayErrorKind::NotAuthenticated => StatusCode::UNAUTHORIZED,
            PlayErrorKind::EmptyPool => StatusCode::NOT_FOUND,
            PlayErrorKind::OfferExhausted
            | PlayErrorKind::AlreadyClaimedByOther
            | PlayErrorKind::PlayInProgress => StatusCode::CONFLICT,
            PlayErrorKind::RemoteError => StatusCode::BAD_GATEWAY,
            PlayErrorKind::ValidationError => StatusCode::BAD_REQUEST,
            PlayErrorKind::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let kind = self.kind();
        let message = match kind {
            PlayErrorKind::NotAuthenticated => {
                log::debug!("Rejected unauthenticated play: {self}");
                "Please sign in to play".to_string()
            }
            PlayErrorKind::EmptyPool => "Nothing available right now".to_string(),
            PlayErrorKind::OfferExhausted
            | PlayErrorKind::AlreadyClaimedByOther
            | PlayErrorKind::PlayInProgress
            | PlayErrorKind::ValidationError => {
                log::warn!("{self}");
                self.to_string()
            }
            PlayErrorKind::RemoteError => {
                log::error!("Remote error: {self}");
                "Reward service temporarily unavailable".to_string()
            }
            PlayErrorKind::InternalError => {
                log::error!("Internal error: {self}");
                "Internal server error".to_string()
            }
        };

        HttpResponse::build(self.status_code()).json(ApiResponse::<()>::failure(ApiError {
            code: kind.as_code().to_string(),
            message,
            retryable: kind.is_retryable(),
        }))
    }
}
