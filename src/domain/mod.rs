//! Domain model: catalog products, cart lines, orders and order plans.

pub mod cart;
pub mod order;
pub mod plan;
pub mod product;
