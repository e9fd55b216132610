//! A webhook-buffering proxy for the MercadoLibre marketplace API.
//!
//! This crate provides a **bounded, in-memory, best-effort** notification
//! buffer plus a resilient upstream-fetch pipeline that assembles a
//! derived "unshipped orders" report.
//!
//! ## Guarantees
//! - Bounded buffer memory (oldest notifications evicted on overflow)
//! - At-most-once consume per order id, atomic read-then-purge
//! - Bounded upstream retries with capped, jittered backoff
//! - Bounded pagination (hard scan cap per report request)
//!
//! ## Non-Guarantees
//! - Durability across restarts
//! - Exactly-once delivery to report consumers
//! - Distributed coordination or buffer sharding
//!
//! The webhook intake is fire-and-forget: it always answers 200, and a
//! malformed notification degrades to a log line.

mod backoff;
mod buffer;
mod config;
mod error;
mod fetch;
mod report;
mod routes;
mod types;
mod upstream;

pub use backoff::{with_backoff, RetryPolicy};
pub use buffer::EventBuffer;
pub use config::Config;
pub use error::{ApiError, UpstreamError};
pub use fetch::{fetch_paid_orders, PAGE_SIZE, SCAN_CAP};
pub use report::build_report;
pub use routes::{router, AppState};
pub use types::{
    Buyer, EventRow, FetchWindow, ItemRef, OrderId, OrderItem, OrderRecord, OrdersPage, Paging,
    ReportBuyer, ReportRow, SellerId, ShipmentRecord, ShippingRef, UserProfile, WebhookEvent,
};
pub use upstream::{MeliClient, OrdersApi, OrdersQuery, API_BASE_URL};
