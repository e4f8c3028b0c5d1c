//! Error taxonomy shared by the domain, the stores and the HTTP layer.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::order::OrderStatus;

#[derive(Debug, Error)]
pub enum Error {
    /// A referenced record does not exist: "product", "variant", "order", ...
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("insufficient stock for {name}")]
    InsufficientStock { name: String },

    #[error("invalid or expired coupon")]
    CouponInvalid,

    #[error("minimum purchase amount of ${minimum} required")]
    BelowMinimum { minimum: Decimal },

    #[error("cannot change order status from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("{0}")]
    Validation(String),

    #[error("missing or invalid credentials")]
    Unauthorized,

    #[error("access denied")]
    Forbidden,

    #[error(transparent)]
    Storage(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    fn status(&self) -> StatusCode {
        match self {
            Error::NotFound(_) | Error::CouponInvalid => StatusCode::NOT_FOUND,
            Error::BelowMinimum { .. } | Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::InsufficientStock { .. } | Error::InvalidTransition { .. } => {
                StatusCode::CONFLICT
            }
            Error::Unauthorized => StatusCode::UNAUTHORIZED,
            Error::Forbidden => StatusCode::FORBIDDEN,
            Error::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Error::Storage(err) => {
                tracing::error!(%err, "storage error");
                "internal error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(serde_json::json!({ "message": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(Error::NotFound("product").status(), StatusCode::NOT_FOUND);
        assert_eq!(Error::CouponInvalid.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            Error::InsufficientStock { name: "SKU-1".into() }.status(),
            StatusCode::CONFLICT
        );
        assert_eq!(Error::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(Error::Forbidden.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn below_minimum_message_names_the_threshold() {
        let err = Error::BelowMinimum { minimum: Decimal::new(50, 0) };
        assert_eq!(err.to_string(), "minimum purchase amount of $50 required");
    }
}
