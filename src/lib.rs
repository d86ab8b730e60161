//! Empower Storefront
//!
//! Checkout and order service for the storefront API: cart to confirmed
//! order in one transaction, with compensating stock restoration on
//! cancellation.
//!
//! ## Subsystems
//! - Pricing and order assembly (pure, no writes)
//! - Payment authorization behind a substitutable gateway
//! - Transactional order commit with atomic stock decrements
//! - Order lifecycle (cancellation, administrative status changes)

pub mod checkout;
pub mod config;
pub mod domain;
pub mod error;
pub mod http;
pub mod payment;
pub mod store;
