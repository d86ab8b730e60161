//! Order assembly: cart lines + live catalog state -> a priced, immutable
//! plan. Pure computation, no writes, so a failed attempt leaves nothing
//! to clean up.

use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::cart::CartLine;
use crate::domain::product::Product;
use crate::error::Error;

/// Order-level charge configuration. Tax, shipping and discount are seams,
/// not business rules baked into the assembly algorithm.
#[derive(Debug, Clone)]
pub struct Charges {
    pub tax_rate: Decimal,
    pub shipping_amount: Decimal,
    pub discount_amount: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanLine {
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub total_price: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderPlan {
    pub lines: Vec<PlanLine>,
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub shipping_amount: Decimal,
    pub discount_amount: Decimal,
    pub total_amount: Decimal,
}

impl OrderPlan {
    /// Validates every cart line against the catalog and prices the order.
    ///
    /// The stock check here is a fast-fail courtesy only; the commit step
    /// re-checks with an atomic conditional decrement, since this read is
    /// stale by the time the transaction runs.
    pub fn assemble(charges: &Charges, lines: &[(CartLine, Product)]) -> Result<Self, Error> {
        if lines.is_empty() {
            return Err(Error::EmptyCart);
        }

        let mut plan_lines = Vec::with_capacity(lines.len());
        let mut subtotal = Decimal::ZERO;

        for (line, product) in lines {
            if !product.is_active {
                return Err(Error::ProductUnavailable {
                    product_id: product.id,
                    name: Some(product.name.clone()),
                });
            }
            if product.stock_quantity < line.quantity {
                return Err(Error::InsufficientStock {
                    product_id: product.id,
                    name: product.name.clone(),
                    requested: line.quantity,
                    available: product.stock_quantity,
                });
            }

            let unit_price = product.effective_price();
            let total_price = unit_price * Decimal::from(line.quantity);
            subtotal += total_price;
            plan_lines.push(PlanLine {
                product_id: product.id,
                quantity: line.quantity,
                unit_price,
                total_price,
            });
        }

        // Every commit walks product rows in the same global order, so two
        // multi-line placements can never hold each other's row locks.
        plan_lines.sort_by_key(|l| l.product_id);

        let tax_amount = (subtotal * charges.tax_rate).round_dp(2);
        let shipping_amount = charges.shipping_amount;
        let discount_amount = charges.discount_amount;
        let total_amount = subtotal + tax_amount + shipping_amount - discount_amount;

        Ok(Self {
            lines: plan_lines,
            subtotal,
            tax_amount,
            shipping_amount,
            discount_amount,
            total_amount,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn charges() -> Charges {
        Charges {
            tax_rate: "0.08".parse().unwrap(),
            shipping_amount: Decimal::ZERO,
            discount_amount: Decimal::ZERO,
        }
    }

    fn product(price: &str, stock: i32) -> Product {
        let now = Utc::now();
        Product {
            id: Uuid::new_v4(),
            sku: format!("SKU-{}", Uuid::new_v4()),
            name: "Linen Shirt".into(),
            description: None,
            price: price.parse().unwrap(),
            sale_price: None,
            stock_quantity: stock,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn line(product: &Product, quantity: i32) -> CartLine {
        let now = Utc::now();
        CartLine {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            product_id: product.id,
            quantity,
            created_at: now,
            updated_at: now,
        }
    }

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn prices_a_simple_cart() {
        let p = product("100.00", 5);
        let plan = OrderPlan::assemble(&charges(), &[(line(&p, 2), p.clone())]).unwrap();
        assert_eq!(plan.subtotal, dec("200.00"));
        assert_eq!(plan.tax_amount, dec("16.00"));
        assert_eq!(plan.shipping_amount, Decimal::ZERO);
        assert_eq!(plan.discount_amount, Decimal::ZERO);
        assert_eq!(plan.total_amount, dec("216.00"));
        assert_eq!(plan.lines.len(), 1);
        assert_eq!(plan.lines[0].unit_price, dec("100.00"));
        assert_eq!(plan.lines[0].total_price, dec("200.00"));
    }

    #[test]
    fn tax_rounds_to_two_decimals() {
        let p = product("19.99", 10);
        let plan = OrderPlan::assemble(&charges(), &[(line(&p, 3), p.clone())]).unwrap();
        assert_eq!(plan.subtotal, dec("59.97"));
        // 59.97 * 0.08 = 4.7976
        assert_eq!(plan.tax_amount, dec("4.80"));
        assert_eq!(plan.total_amount, dec("64.77"));
    }

    #[test]
    fn subtotal_matches_summed_line_totals() {
        let a = product("12.50", 10);
        let b = product("7.35", 10);
        let plan =
            OrderPlan::assemble(&charges(), &[(line(&a, 4), a.clone()), (line(&b, 3), b.clone())])
                .unwrap();
        let summed: Decimal = plan.lines.iter().map(|l| l.total_price).sum();
        assert_eq!(plan.subtotal, summed);
        assert_eq!(
            plan.total_amount,
            plan.subtotal + plan.tax_amount + plan.shipping_amount - plan.discount_amount
        );
    }

    #[test]
    fn sale_price_flows_into_the_plan() {
        let mut p = product("100.00", 5);
        p.sale_price = Some(dec("80.00"));
        let plan = OrderPlan::assemble(&charges(), &[(line(&p, 1), p.clone())]).unwrap();
        assert_eq!(plan.lines[0].unit_price, dec("80.00"));
        assert_eq!(plan.subtotal, dec("80.00"));
    }

    #[test]
    fn lines_come_out_in_product_id_order() {
        let a = product("12.50", 10);
        let b = product("7.35", 10);
        // Feed the higher id first; the plan must still be ordered.
        let (first, second) = if a.id > b.id { (a, b) } else { (b, a) };
        let plan = OrderPlan::assemble(
            &charges(),
            &[
                (line(&first, 1), first.clone()),
                (line(&second, 1), second.clone()),
            ],
        )
        .unwrap();
        assert!(plan.lines[0].product_id < plan.lines[1].product_id);
    }

    #[test]
    fn rejects_empty_cart() {
        assert!(matches!(
            OrderPlan::assemble(&charges(), &[]),
            Err(Error::EmptyCart)
        ));
    }

    #[test]
    fn rejects_inactive_product() {
        let mut p = product("10.00", 5);
        p.is_active = false;
        let err = OrderPlan::assemble(&charges(), &[(line(&p, 1), p.clone())]).unwrap_err();
        assert!(matches!(err, Error::ProductUnavailable { product_id, .. } if product_id == p.id));
    }

    #[test]
    fn reports_available_stock_on_shortfall() {
        let p = product("10.00", 3);
        let err = OrderPlan::assemble(&charges(), &[(line(&p, 5), p.clone())]).unwrap_err();
        match err {
            Error::InsufficientStock {
                requested,
                available,
                ..
            } => {
                assert_eq!(requested, 5);
                assert_eq!(available, 3);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn shipping_and_discount_feed_the_total() {
        let p = product("50.00", 5);
        let charges = Charges {
            tax_rate: "0.08".parse().unwrap(),
            shipping_amount: dec("5.00"),
            discount_amount: dec("10.00"),
        };
        let plan = OrderPlan::assemble(&charges, &[(line(&p, 2), p.clone())]).unwrap();
        assert_eq!(plan.subtotal, dec("100.00"));
        assert_eq!(plan.tax_amount, dec("8.00"));
        assert_eq!(plan.total_amount, dec("103.00"));
    }
}
