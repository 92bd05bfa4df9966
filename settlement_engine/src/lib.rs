//! Payment Settlement Engine
//!
//! The settlement engine owns the authoritative local record of marketplace orders and keeps it consistent with the
//! external payment processor, which delivers notifications out of order and at-least-once. This library contains the
//! core logic; it knows nothing about HTTP or about any particular processor's wire format.
//!
//! The library is divided into three main sections:
//! 1. Database management ([`mod@sqlite`] behind the [`traits`] module). SQLite is the supported backend. You should
//!    never need to access the database directly; use the public API instead. The exception is the data types used in
//!    the database, which are defined in the `db_types` module and are public.
//! 2. The engine public API ([`SettlementApi`]). This is where purchase requests become pending orders, where
//!    payment-processor events are reconciled into order state exactly once, and where the fulfilment flow advances
//!    settled orders.
//! 3. Event hooks ([`mod@events`]). Fire-and-forget notifications emitted when orders settle or are annulled, so
//!    downstream sinks (mail, feeds) can react without participating in the transaction.
mod api;
pub mod db_types;
pub mod events;
pub mod helpers;
#[cfg(feature = "sqlite")]
mod sqlite;
pub mod traits;

#[cfg(feature = "test_utils")]
pub mod test_utils;

pub use api::{CheckoutRequest, SettlementApi, SettlementApiError};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
