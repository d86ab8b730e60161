//! Error taxonomy and its HTTP rendering.
//!
//! Business-rule rejections carry a machine-readable kind plus enough
//! detail to correct and retry; store failures surface as opaque 500s and
//! are logged instead.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::order::OrderStatus;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Validation(String),

    #[error("cart is empty")]
    EmptyCart,

    #[error("{}", unavailable_message(.name, .product_id))]
    ProductUnavailable {
        product_id: Uuid,
        name: Option<String>,
    },

    /// Detected before any write begins.
    #[error("insufficient stock for {name}")]
    InsufficientStock {
        product_id: Uuid,
        name: String,
        requested: i32,
        available: i32,
    },

    /// The atomic decrement at commit time found less stock than the
    /// assembly-time check saw. The transaction was rolled back; the caller
    /// may retry.
    #[error("insufficient stock for {name}")]
    StockConflict {
        product_id: Uuid,
        name: String,
        requested: i32,
        available: i32,
    },

    #[error("{0}")]
    PaymentDeclined(String),

    #[error("order cannot move from {from} to {to}")]
    IllegalTransition { from: OrderStatus, to: OrderStatus },

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("missing or invalid user identity")]
    Unauthorized,

    #[error("administrator access required")]
    Forbidden,

    #[error(transparent)]
    Store(#[from] StoreError),
}

fn unavailable_message(name: &Option<String>, product_id: &Uuid) -> String {
    match name {
        Some(name) => format!("product {name} is no longer available"),
        None => format!("product {product_id} no longer exists"),
    }
}

impl Error {
    fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::EmptyCart => "empty_cart",
            Self::ProductUnavailable { .. } => "product_unavailable",
            Self::InsufficientStock { .. } | Self::StockConflict { .. } => "insufficient_stock",
            Self::PaymentDeclined(_) => "payment_declined",
            Self::IllegalTransition { .. } => "illegal_transition",
            Self::NotFound(_) => "not_found",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::Store(_) => "internal_error",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_)
            | Self::EmptyCart
            | Self::ProductUnavailable { .. }
            | Self::InsufficientStock { .. }
            | Self::PaymentDeclined(_)
            | Self::IllegalTransition { .. } => StatusCode::BAD_REQUEST,
            Self::StockConflict { .. } => StatusCode::CONFLICT,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
            let body = json!({"error": {"kind": "internal_error", "message": "internal server error"}});
            return (status, Json(body)).into_response();
        }

        let mut detail = json!({"kind": self.kind(), "message": self.to_string()});
        match &self {
            Self::InsufficientStock {
                product_id,
                requested,
                available,
                ..
            }
            | Self::StockConflict {
                product_id,
                requested,
                available,
                ..
            } => {
                detail["product_id"] = json!(product_id);
                detail["requested"] = json!(requested);
                detail["available"] = json!(available);
            }
            Self::ProductUnavailable { product_id, .. } => {
                detail["product_id"] = json!(product_id);
            }
            _ => {}
        }

        (status, Json(json!({ "error": detail }))).into_response()
    }
}
