//! HTTP surface.
//!
//! Authentication is handled upstream; the service trusts the `x-user-id`
//! and `x-user-role` headers injected by the gateway.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::checkout::{CheckoutService, OrderDetail};
use crate::domain::cart::CartLine;
use crate::domain::order::{Address, Order, OrderStatus};
use crate::domain::product::Product;
use crate::error::Error;
use crate::payment::{PaymentDetails, SimulatedGateway};
use crate::store::postgres::PgStore;

#[derive(Clone)]
pub struct AppState {
    pub checkout: Arc<CheckoutService<PgStore, SimulatedGateway>>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/products", get(list_products))
        .route("/api/products/:id", get(get_product))
        .route("/api/cart", get(get_cart).delete(clear_cart))
        .route("/api/cart/items", post(add_cart_item))
        .route("/api/cart/items/:product_id", delete(remove_cart_item))
        .route("/api/orders", get(list_orders).post(place_order))
        .route("/api/orders/:id", get(get_order))
        .route("/api/orders/:id/cancel", put(cancel_order))
        .route("/api/orders/:id/status", put(update_order_status))
        .with_state(state)
}

pub struct UserId(pub Uuid);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for UserId {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Uuid::parse_str(v).ok())
            .map(UserId)
            .ok_or(Error::Unauthorized)
    }
}

pub struct AdminUser(pub Uuid);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for AdminUser {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let UserId(user_id) = UserId::from_request_parts(parts, state).await?;
        let role = parts
            .headers
            .get("x-user-role")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if role != "admin" {
            return Err(Error::Forbidden);
        }
        Ok(AdminUser(user_id))
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "healthy", "service": "empower-storefront"}))
}

#[derive(Debug, Deserialize)]
struct PageParams {
    page: Option<u32>,
    per_page: Option<u32>,
}

async fn list_products(
    State(s): State<AppState>,
    Query(p): Query<PageParams>,
) -> Result<Json<Vec<Product>>, Error> {
    let products = s
        .checkout
        .products(p.page.unwrap_or(1), p.per_page.unwrap_or(20))
        .await?;
    Ok(Json(products))
}

async fn get_product(
    State(s): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Product>, Error> {
    Ok(Json(s.checkout.product(id).await?))
}

async fn get_cart(
    State(s): State<AppState>,
    UserId(user_id): UserId,
) -> Result<Json<Vec<CartLine>>, Error> {
    Ok(Json(s.checkout.cart(user_id).await?))
}

#[derive(Debug, Deserialize, Validate)]
struct AddCartItemRequest {
    product_id: Uuid,
    #[validate(range(min = 1, message = "quantity must be greater than 0"))]
    quantity: i32,
}

async fn add_cart_item(
    State(s): State<AppState>,
    UserId(user_id): UserId,
    Json(req): Json<AddCartItemRequest>,
) -> Result<(StatusCode, Json<CartLine>), Error> {
    req.validate().map_err(|e| Error::Validation(e.to_string()))?;
    let line = s
        .checkout
        .add_to_cart(user_id, req.product_id, req.quantity)
        .await?;
    Ok((StatusCode::CREATED, Json(line)))
}

async fn remove_cart_item(
    State(s): State<AppState>,
    UserId(user_id): UserId,
    Path(product_id): Path<Uuid>,
) -> Result<StatusCode, Error> {
    s.checkout.remove_from_cart(user_id, product_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn clear_cart(
    State(s): State<AppState>,
    UserId(user_id): UserId,
) -> Result<StatusCode, Error> {
    s.checkout.clear_cart(user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_orders(
    State(s): State<AppState>,
    UserId(user_id): UserId,
) -> Result<Json<Vec<Order>>, Error> {
    Ok(Json(s.checkout.orders(user_id).await?))
}

async fn get_order(
    State(s): State<AppState>,
    UserId(user_id): UserId,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderDetail>, Error> {
    Ok(Json(s.checkout.order_detail(user_id, id).await?))
}

#[derive(Debug, Deserialize, Validate)]
struct PlaceOrderRequest {
    #[validate]
    shipping_address: Address,
    #[validate]
    billing_address: Address,
    payment_info: PaymentDetails,
}

async fn place_order(
    State(s): State<AppState>,
    UserId(user_id): UserId,
    Json(req): Json<PlaceOrderRequest>,
) -> Result<(StatusCode, Json<OrderDetail>), Error> {
    req.validate().map_err(|e| Error::Validation(e.to_string()))?;
    let detail = s
        .checkout
        .place_order(
            user_id,
            req.shipping_address,
            req.billing_address,
            req.payment_info,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

async fn cancel_order(
    State(s): State<AppState>,
    UserId(user_id): UserId,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, Error> {
    Ok(Json(s.checkout.cancel_order(user_id, id).await?))
}

#[derive(Debug, Deserialize)]
struct UpdateStatusRequest {
    status: String,
}

async fn update_order_status(
    State(s): State<AppState>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<Order>, Error> {
    let status = OrderStatus::parse(&req.status)
        .ok_or_else(|| Error::Validation(format!("invalid status: {}", req.status)))?;
    Ok(Json(s.checkout.advance_status(id, status).await?))
}
