use std::time::Duration;

use log::*;
use psg_common::Secret;

const DEFAULT_API_BASE: &str = "https://api.stripe.com";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Clone)]
pub struct StripeConfig {
    /// Base URL for the Stripe REST API. Only overridden in tests, where it points at a local mock.
    pub api_base: String,
    pub secret_key: Secret<String>,
    /// The `whsec_...` signing secret used to verify incoming webhook signatures.
    pub webhook_secret: Secret<String>,
    /// Where Stripe redirects the buyer after checkout completes or is abandoned.
    pub success_url: String,
    pub cancel_url: String,
    /// Upper bound on any single outbound call to Stripe. A checkout that times out leaves the local order pending
    /// and unreferenced; the stale-checkout sweeper cancels it later.
    pub request_timeout: Duration,
}

impl Default for StripeConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            secret_key: Secret::default(),
            webhook_secret: Secret::default(),
            success_url: String::default(),
            cancel_url: String::default(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl StripeConfig {
    pub fn from_env_or_default() -> Self {
        let api_base = std::env::var("PSG_STRIPE_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.to_string());
        let secret_key = Secret::new(std::env::var("PSG_STRIPE_SECRET_KEY").unwrap_or_else(|_| {
            error!("💳️ PSG_STRIPE_SECRET_KEY is not set. Calls to Stripe will be rejected.");
            String::default()
        }));
        let webhook_secret = Secret::new(std::env::var("PSG_STRIPE_WEBHOOK_SECRET").unwrap_or_else(|_| {
            error!("💳️ PSG_STRIPE_WEBHOOK_SECRET is not set. Incoming payment events cannot be verified.");
            String::default()
        }));
        let success_url = std::env::var("PSG_CHECKOUT_SUCCESS_URL").unwrap_or_else(|_| {
            warn!("💳️ PSG_CHECKOUT_SUCCESS_URL not set, using (probably useless) default");
            "https://localhost/checkout/success".to_string()
        });
        let cancel_url = std::env::var("PSG_CHECKOUT_CANCEL_URL").unwrap_or_else(|_| {
            warn!("💳️ PSG_CHECKOUT_CANCEL_URL not set, using (probably useless) default");
            "https://localhost/checkout/cancelled".to_string()
        });
        let request_timeout = std::env::var("PSG_STRIPE_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS));
        Self { api_base, secret_key, webhook_secret, success_url, cancel_url, request_timeout }
    }
}
