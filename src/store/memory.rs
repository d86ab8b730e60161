//! In-memory store used by the checkout tests.
//!
//! A transaction takes the whole-state lock on `begin` and keeps a
//! snapshot; dropping the handle without committing restores the snapshot,
//! mirroring the rollback semantics of the Postgres store.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{NewOrder, Store, StoreError, StoreTx};
use crate::domain::cart::CartLine;
use crate::domain::order::{Order, OrderItem};
use crate::domain::plan::PlanLine;
use crate::domain::product::Product;

#[derive(Default, Clone)]
struct State {
    products: HashMap<Uuid, Product>,
    cart: Vec<CartLine>,
    orders: Vec<Order>,
    order_items: HashMap<Uuid, Vec<OrderItem>>,
    order_numbers: HashSet<String>,
}

#[derive(Default, Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    duplicate_inserts: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub async fn seed_product(&self, product: Product) {
        self.state
            .lock()
            .await
            .products
            .insert(product.id, product);
    }

    pub async fn seed_cart_line(&self, user_id: Uuid, product_id: Uuid, quantity: i32) {
        let now = Utc::now();
        self.state.lock().await.cart.push(CartLine {
            id: Uuid::new_v4(),
            user_id,
            product_id,
            quantity,
            created_at: now,
            updated_at: now,
        });
    }

    /// Makes the next `n` order-header inserts fail with
    /// [`StoreError::DuplicateOrderNumber`], to exercise the retry loop.
    pub fn fail_next_inserts_with_duplicate(&self, n: usize) {
        self.duplicate_inserts.store(n, Ordering::SeqCst);
    }

    pub async fn all_orders(&self) -> Vec<Order> {
        self.state.lock().await.orders.clone()
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<State>,
    snapshot: State,
    committed: bool,
    duplicate_inserts: Arc<AtomicUsize>,
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        if !self.committed {
            *self.guard = std::mem::take(&mut self.snapshot);
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        let snapshot = guard.clone();
        Ok(MemoryTx {
            guard,
            snapshot,
            committed: false,
            duplicate_inserts: self.duplicate_inserts.clone(),
        })
    }

    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, StoreError> {
        Ok(self.state.lock().await.products.get(&id).cloned())
    }

    async fn list_products(&self, limit: i64, offset: i64) -> Result<Vec<Product>, StoreError> {
        let state = self.state.lock().await;
        let mut products: Vec<Product> =
            state.products.values().filter(|p| p.is_active).cloned().collect();
        products.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(products
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn get_cart_lines(&self, user_id: Uuid) -> Result<Vec<CartLine>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .cart
            .iter()
            .filter(|l| l.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn upsert_cart_line(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<CartLine, StoreError> {
        let mut state = self.state.lock().await;
        if let Some(line) = state
            .cart
            .iter_mut()
            .find(|l| l.user_id == user_id && l.product_id == product_id)
        {
            line.quantity += quantity;
            line.updated_at = Utc::now();
            return Ok(line.clone());
        }
        let now = Utc::now();
        let line = CartLine {
            id: Uuid::new_v4(),
            user_id,
            product_id,
            quantity,
            created_at: now,
            updated_at: now,
        };
        state.cart.push(line.clone());
        Ok(line)
    }

    async fn remove_cart_line(
        &self,
        user_id: Uuid,
        product_id: Uuid,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        let before = state.cart.len();
        state
            .cart
            .retain(|l| !(l.user_id == user_id && l.product_id == product_id));
        Ok(state.cart.len() < before)
    }

    async fn clear_cart(&self, user_id: Uuid) -> Result<(), StoreError> {
        self.state.lock().await.cart.retain(|l| l.user_id != user_id);
        Ok(())
    }

    async fn get_order(
        &self,
        id: Uuid,
        user_id: Option<Uuid>,
    ) -> Result<Option<Order>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .orders
            .iter()
            .find(|o| o.id == id && user_id.map_or(true, |u| o.user_id == u))
            .cloned())
    }

    async fn list_orders(&self, user_id: Uuid) -> Result<Vec<Order>, StoreError> {
        let state = self.state.lock().await;
        let mut orders: Vec<Order> = state
            .orders
            .iter()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn get_order_items(&self, order_id: Uuid) -> Result<Vec<OrderItem>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.order_items.get(&order_id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn insert_order(&mut self, order: &NewOrder) -> Result<Order, StoreError> {
        let budget = self.duplicate_inserts.load(Ordering::SeqCst);
        if budget > 0 {
            self.duplicate_inserts.store(budget - 1, Ordering::SeqCst);
            return Err(StoreError::DuplicateOrderNumber);
        }
        if self.guard.order_numbers.contains(&order.order_number) {
            return Err(StoreError::DuplicateOrderNumber);
        }

        let now = Utc::now();
        let row = Order {
            id: Uuid::new_v4(),
            order_number: order.order_number.clone(),
            user_id: order.user_id,
            status: order.status.clone(),
            subtotal: order.subtotal,
            tax_amount: order.tax_amount,
            shipping_amount: order.shipping_amount,
            discount_amount: order.discount_amount,
            total_amount: order.total_amount,
            shipping_address: Json(order.shipping_address.clone()),
            billing_address: Json(order.billing_address.clone()),
            payment_method: order.payment_method.clone(),
            payment_status: order.payment_status.clone(),
            transaction_id: order.transaction_id.clone(),
            created_at: now,
            updated_at: now,
            shipped_at: None,
            delivered_at: None,
        };
        self.guard.order_numbers.insert(row.order_number.clone());
        self.guard.orders.push(row.clone());
        Ok(row)
    }

    async fn insert_order_items(
        &mut self,
        order_id: Uuid,
        lines: &[PlanLine],
    ) -> Result<Vec<OrderItem>, StoreError> {
        let items: Vec<OrderItem> = lines
            .iter()
            .map(|line| OrderItem {
                id: Uuid::new_v4(),
                order_id,
                product_id: line.product_id,
                quantity: line.quantity,
                unit_price: line.unit_price,
                total_price: line.total_price,
            })
            .collect();
        self.guard.order_items.insert(order_id, items.clone());
        Ok(items)
    }

    async fn decrement_stock(
        &mut self,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<bool, StoreError> {
        match self.guard.products.get_mut(&product_id) {
            Some(product) if product.stock_quantity >= quantity => {
                product.stock_quantity -= quantity;
                product.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn increment_stock(
        &mut self,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<(), StoreError> {
        if let Some(product) = self.guard.products.get_mut(&product_id) {
            product.stock_quantity += quantity;
            product.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn clear_cart(&mut self, user_id: Uuid) -> Result<(), StoreError> {
        self.guard.cart.retain(|l| l.user_id != user_id);
        Ok(())
    }

    async fn lock_order(
        &mut self,
        id: Uuid,
        user_id: Option<Uuid>,
    ) -> Result<Option<Order>, StoreError> {
        Ok(self
            .guard
            .orders
            .iter()
            .find(|o| o.id == id && user_id.map_or(true, |u| o.user_id == u))
            .cloned())
    }

    async fn get_order_items(&mut self, order_id: Uuid) -> Result<Vec<OrderItem>, StoreError> {
        Ok(self.guard.order_items.get(&order_id).cloned().unwrap_or_default())
    }

    async fn update_order_status(
        &mut self,
        id: Uuid,
        status: &str,
        shipped_at: Option<DateTime<Utc>>,
        delivered_at: Option<DateTime<Utc>>,
    ) -> Result<Order, StoreError> {
        let order = self
            .guard
            .orders
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or_else(|| StoreError::Internal(format!("order {id} disappeared")))?;
        order.status = status.to_string();
        order.shipped_at = order.shipped_at.or(shipped_at);
        order.delivered_at = order.delivered_at.or(delivered_at);
        order.updated_at = Utc::now();
        Ok(order.clone())
    }

    async fn commit(mut self) -> Result<(), StoreError> {
        self.committed = true;
        Ok(())
    }
}
