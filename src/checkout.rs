//! Checkout and order lifecycle.
//!
//! [`CheckoutService::place_order`] is the only path that turns a mutable
//! cart into an immutable order: assemble (read-only), authorize payment,
//! then commit header, items, stock decrements and cart clearing in one
//! transaction. [`CheckoutService::cancel_order`] is the compensating
//! action, restoring stock exactly once inside the same transaction as the
//! status flip.

use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::cart::CartLine;
use crate::domain::order::{Address, Order, OrderItem, OrderStatus, PaymentStatus};
use crate::domain::plan::{Charges, OrderPlan};
use crate::domain::product::Product;
use crate::error::Error;
use crate::payment::{PaymentDetails, PaymentGateway, PaymentOutcome};
use crate::store::{NewOrder, Store, StoreError, StoreTx};

/// How many fresh order numbers to try before giving up. A collision needs
/// the same day and the same four-digit suffix, so one retry almost always
/// settles it.
const ORDER_NUMBER_ATTEMPTS: usize = 5;

#[derive(Debug, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

pub struct CheckoutService<S, P> {
    store: S,
    gateway: P,
    charges: Charges,
    payment_timeout: Duration,
}

impl<S: Store, P: PaymentGateway> CheckoutService<S, P> {
    pub fn new(store: S, gateway: P, charges: Charges, payment_timeout: Duration) -> Self {
        Self {
            store,
            gateway,
            charges,
            payment_timeout,
        }
    }

    /// Places an order from the user's cart.
    ///
    /// Assembly and payment authorization happen before any write; the
    /// commit transaction re-checks stock with conditional decrements and
    /// rolls back entirely on conflict, so no partial order is ever
    /// observable.
    pub async fn place_order(
        &self,
        user_id: Uuid,
        shipping_address: Address,
        billing_address: Address,
        payment: PaymentDetails,
    ) -> Result<OrderDetail, Error> {
        let cart = self.store.get_cart_lines(user_id).await?;
        if cart.is_empty() {
            return Err(Error::EmptyCart);
        }

        let mut lines = Vec::with_capacity(cart.len());
        for line in cart {
            let product = self.store.get_product(line.product_id).await?.ok_or(
                Error::ProductUnavailable {
                    product_id: line.product_id,
                    name: None,
                },
            )?;
            lines.push((line, product));
        }
        let plan = OrderPlan::assemble(&self.charges, &lines)?;

        let outcome = match tokio::time::timeout(
            self.payment_timeout,
            self.gateway.authorize(&payment),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => PaymentOutcome::Declined {
                reason: "payment authorization timed out".into(),
            },
        };
        let transaction_id = match outcome {
            PaymentOutcome::Approved { transaction_id } => transaction_id,
            PaymentOutcome::Declined { reason } => return Err(Error::PaymentDeclined(reason)),
        };

        for _ in 0..ORDER_NUMBER_ATTEMPTS {
            let header = NewOrder {
                user_id,
                order_number: generate_order_number(),
                status: OrderStatus::Confirmed.as_str().to_string(),
                subtotal: plan.subtotal,
                tax_amount: plan.tax_amount,
                shipping_amount: plan.shipping_amount,
                discount_amount: plan.discount_amount,
                total_amount: plan.total_amount,
                shipping_address: shipping_address.clone(),
                billing_address: billing_address.clone(),
                payment_method: payment.method().to_string(),
                payment_status: PaymentStatus::Completed.as_str().to_string(),
                transaction_id: Some(transaction_id.clone()),
            };

            let mut tx = self.store.begin().await?;
            let order = match tx.insert_order(&header).await {
                Ok(order) => order,
                Err(StoreError::DuplicateOrderNumber) => {
                    tracing::warn!(order_number = %header.order_number, "order number collision, retrying");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            let items = tx.insert_order_items(order.id, &plan.lines).await?;

            for line in &plan.lines {
                if !tx.decrement_stock(line.product_id, line.quantity).await? {
                    // Stock moved between assembly and commit; roll back
                    // and report what is available now.
                    drop(tx);
                    let name = lines
                        .iter()
                        .find(|(_, p)| p.id == line.product_id)
                        .map(|(_, p)| p.name.clone())
                        .unwrap_or_else(|| line.product_id.to_string());
                    let available = self
                        .store
                        .get_product(line.product_id)
                        .await?
                        .map(|p| p.stock_quantity)
                        .unwrap_or(0);
                    tracing::warn!(product_id = %line.product_id, requested = line.quantity, available, "stock conflict at commit");
                    return Err(Error::StockConflict {
                        product_id: line.product_id,
                        name,
                        requested: line.quantity,
                        available,
                    });
                }
            }

            tx.clear_cart(user_id).await?;
            tx.commit().await?;

            tracing::info!(
                order_id = %order.id,
                order_number = %order.order_number,
                total = %order.total_amount,
                "order placed"
            );
            return Ok(OrderDetail { order, items });
        }

        Err(Error::Store(StoreError::Internal(
            "could not allocate a unique order number".into(),
        )))
    }

    /// Cancels an order, restoring stock for every line item exactly once.
    /// Legal only from `pending` or `confirmed`.
    pub async fn cancel_order(&self, user_id: Uuid, order_id: Uuid) -> Result<Order, Error> {
        let mut tx = self.store.begin().await?;
        let order = tx
            .lock_order(order_id, Some(user_id))
            .await?
            .ok_or(Error::NotFound("order"))?;
        let status = parse_status(&order.status)?;
        if !status.is_cancellable() {
            return Err(Error::IllegalTransition {
                from: status,
                to: OrderStatus::Cancelled,
            });
        }

        let mut items = tx.get_order_items(order_id).await?;
        // Restore in product-id order, matching the lock order taken by
        // commits, so a cancellation cannot deadlock a racing placement.
        items.sort_by_key(|i| i.product_id);
        for item in &items {
            tx.increment_stock(item.product_id, item.quantity).await?;
        }
        let updated = tx
            .update_order_status(order_id, OrderStatus::Cancelled.as_str(), None, None)
            .await?;
        tx.commit().await?;

        tracing::info!(order_id = %order_id, order_number = %updated.order_number, "order cancelled, stock restored");
        Ok(updated)
    }

    /// Administrative status change. Stamps `shipped_at`/`delivered_at` the
    /// first time those states are entered. Moving into `cancelled` is
    /// rejected here: stock restoration belongs to [`Self::cancel_order`].
    pub async fn advance_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
    ) -> Result<Order, Error> {
        let mut tx = self.store.begin().await?;
        let order = tx
            .lock_order(order_id, None)
            .await?
            .ok_or(Error::NotFound("order"))?;
        let from = parse_status(&order.status)?;
        if from.is_terminal() || new_status == OrderStatus::Cancelled {
            return Err(Error::IllegalTransition {
                from,
                to: new_status,
            });
        }

        let now = Utc::now();
        let (shipped_at, delivered_at) = match new_status {
            OrderStatus::Shipped => (Some(now), None),
            OrderStatus::Delivered => (None, Some(now)),
            _ => (None, None),
        };
        let updated = tx
            .update_order_status(order_id, new_status.as_str(), shipped_at, delivered_at)
            .await?;
        tx.commit().await?;

        tracing::info!(order_id = %order_id, status = %new_status, "order status updated");
        Ok(updated)
    }

    pub async fn order_detail(&self, user_id: Uuid, order_id: Uuid) -> Result<OrderDetail, Error> {
        let order = self
            .store
            .get_order(order_id, Some(user_id))
            .await?
            .ok_or(Error::NotFound("order"))?;
        let items = self.store.get_order_items(order_id).await?;
        Ok(OrderDetail { order, items })
    }

    pub async fn orders(&self, user_id: Uuid) -> Result<Vec<Order>, Error> {
        Ok(self.store.list_orders(user_id).await?)
    }

    pub async fn products(&self, page: u32, per_page: u32) -> Result<Vec<Product>, Error> {
        let page = page.max(1);
        let per_page = per_page.clamp(1, 100);
        let offset = i64::from((page - 1) * per_page);
        Ok(self.store.list_products(i64::from(per_page), offset).await?)
    }

    pub async fn product(&self, product_id: Uuid) -> Result<Product, Error> {
        self.store
            .get_product(product_id)
            .await?
            .ok_or(Error::NotFound("product"))
    }

    pub async fn cart(&self, user_id: Uuid) -> Result<Vec<CartLine>, Error> {
        Ok(self.store.get_cart_lines(user_id).await?)
    }

    /// Adds to the cart, merging with any existing line. The stock check
    /// here is a fast fail against the merged quantity; commit remains the
    /// real guard.
    pub async fn add_to_cart(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<CartLine, Error> {
        let product = self
            .store
            .get_product(product_id)
            .await?
            .ok_or(Error::NotFound("product"))?;
        if !product.is_active {
            return Err(Error::ProductUnavailable {
                product_id,
                name: Some(product.name),
            });
        }
        let existing = self
            .store
            .get_cart_lines(user_id)
            .await?
            .into_iter()
            .find(|l| l.product_id == product_id)
            .map(|l| l.quantity)
            .unwrap_or(0);
        let wanted = existing
            .checked_add(quantity)
            .ok_or_else(|| Error::Validation("quantity is out of range".into()))?;
        if product.stock_quantity < wanted {
            return Err(Error::InsufficientStock {
                product_id,
                name: product.name,
                requested: wanted,
                available: product.stock_quantity,
            });
        }
        Ok(self
            .store
            .upsert_cart_line(user_id, product_id, quantity)
            .await?)
    }

    pub async fn remove_from_cart(&self, user_id: Uuid, product_id: Uuid) -> Result<(), Error> {
        if !self.store.remove_cart_line(user_id, product_id).await? {
            return Err(Error::NotFound("cart item"));
        }
        Ok(())
    }

    pub async fn clear_cart(&self, user_id: Uuid) -> Result<(), Error> {
        Ok(self.store.clear_cart(user_id).await?)
    }
}

fn parse_status(value: &str) -> Result<OrderStatus, Error> {
    OrderStatus::parse(value).ok_or_else(|| {
        Error::Store(StoreError::Internal(format!(
            "unrecognized order status: {value}"
        )))
    })
}

/// `EMP` + date + four-digit suffix, e.g. `EMP202608291234`. Uniqueness is
/// enforced by the store; collisions restart the commit transaction with a
/// fresh number.
fn generate_order_number() -> String {
    let suffix: u32 = rand::thread_rng().gen_range(1000..=9999);
    format!("EMP{}{}", Utc::now().format("%Y%m%d"), suffix)
}
