//! Persistence boundary.
//!
//! Checkout and cancellation run against an explicit transaction handle
//! ([`StoreTx`]) obtained from [`Store::begin`]; dropping the handle
//! without calling `commit` rolls everything back. Stock decrements are
//! conditional at this boundary so two concurrent commits can never
//! oversell, regardless of what earlier reads saw.

pub mod postgres;

#[cfg(test)]
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::cart::CartLine;
use crate::domain::order::{Address, Order, OrderItem};
use crate::domain::plan::PlanLine;
use crate::domain::product::Product;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The generated order number collided with an existing one. The whole
    /// transaction must be retried with a fresh number.
    #[error("order number already taken")]
    DuplicateOrderNumber,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0}")]
    Internal(String),
}

/// Order header as handed to the store; ids and timestamps are assigned
/// on insert.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: Uuid,
    pub order_number: String,
    pub status: String,
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub shipping_amount: Decimal,
    pub discount_amount: Decimal,
    pub total_amount: Decimal,
    pub shipping_address: Address,
    pub billing_address: Address,
    pub payment_method: String,
    pub payment_status: String,
    pub transaction_id: Option<String>,
}

#[async_trait]
pub trait Store: Send + Sync + 'static {
    type Tx: StoreTx;

    async fn begin(&self) -> Result<Self::Tx, StoreError>;

    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, StoreError>;
    async fn list_products(&self, limit: i64, offset: i64) -> Result<Vec<Product>, StoreError>;

    async fn get_cart_lines(&self, user_id: Uuid) -> Result<Vec<CartLine>, StoreError>;
    /// Inserts a line or adds to an existing one, unique per
    /// (user, product).
    async fn upsert_cart_line(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<CartLine, StoreError>;
    /// Returns false when no matching line existed.
    async fn remove_cart_line(&self, user_id: Uuid, product_id: Uuid)
        -> Result<bool, StoreError>;
    async fn clear_cart(&self, user_id: Uuid) -> Result<(), StoreError>;

    /// `user_id` scopes the lookup to an owner; `None` is the
    /// administrative view.
    async fn get_order(&self, id: Uuid, user_id: Option<Uuid>)
        -> Result<Option<Order>, StoreError>;
    async fn list_orders(&self, user_id: Uuid) -> Result<Vec<Order>, StoreError>;
    async fn get_order_items(&self, order_id: Uuid) -> Result<Vec<OrderItem>, StoreError>;
}

#[async_trait]
pub trait StoreTx: Send {
    async fn insert_order(&mut self, order: &NewOrder) -> Result<Order, StoreError>;
    async fn insert_order_items(
        &mut self,
        order_id: Uuid,
        lines: &[PlanLine],
    ) -> Result<Vec<OrderItem>, StoreError>;

    /// Atomic conditional decrement; returns false (leaving the row
    /// untouched) when stock would go negative.
    async fn decrement_stock(&mut self, product_id: Uuid, quantity: i32)
        -> Result<bool, StoreError>;
    async fn increment_stock(&mut self, product_id: Uuid, quantity: i32)
        -> Result<(), StoreError>;

    async fn clear_cart(&mut self, user_id: Uuid) -> Result<(), StoreError>;

    /// Row-locks the order so cancellation and status changes on the same
    /// order cannot interleave.
    async fn lock_order(
        &mut self,
        id: Uuid,
        user_id: Option<Uuid>,
    ) -> Result<Option<Order>, StoreError>;
    async fn get_order_items(&mut self, order_id: Uuid) -> Result<Vec<OrderItem>, StoreError>;

    /// Sets the status; `shipped_at`/`delivered_at` are only stamped when
    /// currently unset.
    async fn update_order_status(
        &mut self,
        id: Uuid,
        status: &str,
        shipped_at: Option<DateTime<Utc>>,
        delivered_at: Option<DateTime<Utc>>,
    ) -> Result<Order, StoreError>;

    async fn commit(self) -> Result<(), StoreError>;
}
