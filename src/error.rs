//! Crate-wide error type and its HTTP rendering.
//!
//! Every handler returns `Result<T, StoreError>`. Failures are rendered as
//! `{ "success": false, "message": ... }` with a status code per kind.
//! Storage and internal failures are logged and reported as "Server error".

use axum::{
    extract::{multipart::MultipartError, rejection::JsonRejection, FromRequest},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::ai::AiError;
use crate::domain::aggregates::OrderError;
use crate::domain::value_objects::RatingError;
use crate::media::MediaError;
use crate::payments::PaymentError;
use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("Rating 1..5 required")]
    InvalidRating,

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    /// A lifecycle guard refused the operation.
    #[error("{0}")]
    InvalidState(String),

    #[error("{0}")]
    UnsupportedMedia(String),

    /// Payment provider, embedding or language-model call failed.
    #[error("{0}")]
    UpstreamFailure(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) | Self::InvalidRating => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidState(_) => StatusCode::CONFLICT,
            Self::UnsupportedMedia(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::UpstreamFailure(_) => StatusCode::BAD_GATEWAY,
            Self::Storage(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for StoreError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Don't expose internal error details to clients
        let message = match &self {
            Self::Storage(_) | Self::Internal(_) => {
                tracing::error!(error = %self, "Request error");
                "Server error".to_string()
            }
            Self::UpstreamFailure(_) => {
                tracing::warn!(error = %self, "Upstream failure");
                self.to_string()
            }
            _ => self.to_string(),
        };
        (status, Json(json!({ "success": false, "message": message }))).into_response()
    }
}

impl From<OrderError> for StoreError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::NoItems | OrderError::UnknownStatus(_) | OrderError::OutOfRange => Self::InvalidInput(err.to_string()),
            OrderError::NoRefundRequest => Self::NotFound(err.to_string()),
            OrderError::AlreadyDelivered | OrderError::AlreadyCancelled
            | OrderError::NotDelivered | OrderError::IllegalTransition { .. } => Self::InvalidState(err.to_string()),
        }
    }
}

impl From<RatingError> for StoreError {
    fn from(_: RatingError) -> Self { Self::InvalidRating }
}

impl From<PaymentError> for StoreError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::Unavailable(_) => Self::InvalidInput("payment method unavailable".into()),
            other => Self::UpstreamFailure(other.to_string()),
        }
    }
}

impl From<AiError> for StoreError {
    fn from(err: AiError) -> Self {
        match err {
            AiError::DimensionMismatch { .. } => Self::InvalidInput(err.to_string()),
            other => Self::UpstreamFailure(other.to_string()),
        }
    }
}

impl From<MediaError> for StoreError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::UnsupportedType(_) | MediaError::TooLarge { .. } | MediaError::TooMany { .. } => {
                Self::UnsupportedMedia(err.to_string())
            }
            MediaError::UnexpectedField(_) | MediaError::InvalidPath(_) => Self::InvalidInput(err.to_string()),
            MediaError::NotFound(_) => Self::NotFound(err.to_string()),
            MediaError::Io(_) => Self::Internal(err.to_string()),
        }
    }
}

impl From<JsonRejection> for StoreError {
    fn from(rejection: JsonRejection) -> Self { Self::InvalidInput(rejection.body_text()) }
}

impl From<MultipartError> for StoreError {
    fn from(err: MultipartError) -> Self { Self::InvalidInput(err.body_text()) }
}

impl From<validator::ValidationErrors> for StoreError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
        fields.sort_by_key(|(name, _)| *name);
        let message = fields
            .first()
            .and_then(|(name, errs)| {
                errs.first().map(|e| e.message.as_ref().map_or_else(|| format!("Invalid {name}"), |m| m.to_string()))
            })
            .unwrap_or_else(|| "Invalid request".to_string());
        Self::InvalidInput(message)
    }
}

/// `Json` whose rejection is rendered in the store's error envelope.
#[derive(Debug, FromRequest)]
#[from_request(via(Json), rejection(StoreError))]
pub struct ApiJson<T>(pub T);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::OrderStatus;

    #[test]
    fn test_status_mapping() {
        assert_eq!(StoreError::InvalidInput("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(StoreError::from(OrderError::NotDelivered).status(), StatusCode::CONFLICT);
        assert_eq!(StoreError::from(OrderError::NoRefundRequest).status(), StatusCode::NOT_FOUND);
        assert_eq!(StoreError::from(OrderError::OutOfRange).status(), StatusCode::BAD_REQUEST);
        let illegal = OrderError::IllegalTransition { from: OrderStatus::Cancelled, to: OrderStatus::Paid };
        assert_eq!(StoreError::from(illegal).to_string(), "Cannot move order from Cancelled to Paid");
        assert_eq!(StoreError::from(RatingError).status(), StatusCode::BAD_REQUEST);
        assert_eq!(StoreError::from(PaymentError::Unavailable("stripe")).to_string(), "payment method unavailable");
    }
}
