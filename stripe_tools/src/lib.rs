//! Stripe integration for the payment settlement gateway.
//!
//! This crate owns everything that talks to, or receives notifications from, Stripe:
//! * [`StripeApi`] — a thin REST client for creating Checkout Sessions and probing their status.
//! * [`webhook`] — `Stripe-Signature` verification and the typed webhook event envelope. Payloads are parsed exactly
//!   once, at this boundary; everything downstream operates on [`WebhookEvent`] variants rather than free-form JSON.
//!
//! The crate is deliberately ignorant of local order state. It deals in Stripe's vocabulary (sessions, payment
//! intents, events) and leaves reconciliation to the settlement engine.
mod api;
mod config;
mod data_objects;
mod error;
pub mod webhook;

pub use api::StripeApi;
pub use config::StripeConfig;
pub use data_objects::{CheckoutSession, NewCheckoutSession, PaymentIntent, SessionStatus};
pub use error::StripeApiError;
pub use webhook::{EventPayload, WebhookError, WebhookEvent};
