use std::collections::HashMap;

use psg_common::Money;
use serde::{Deserialize, Serialize};

//--------------------------------------   NewCheckoutSession   ------------------------------------------------------
/// Everything needed to open a Checkout Session for a single-listing marketplace purchase. The platform fee and the
/// seller's connected account are passed through to Stripe so the commission split settles at the processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCheckoutSession {
    pub currency: String,
    pub product_name: String,
    pub unit_amount: Money,
    pub quantity: i64,
    pub platform_fee: Money,
    /// The seller's connected (payout) account id, e.g. `acct_...`.
    pub destination_account: String,
    /// The local order id, carried in session metadata. Used for cross-checks only; the payment intent id is the
    /// join key for reconciliation.
    pub order_id: String,
}

//--------------------------------------    CheckoutSession     ------------------------------------------------------
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CheckoutSession {
    /// The session id (`cs_...`). This is the opaque handle handed back to the client.
    pub id: String,
    /// The payment intent (`pi_...`) backing this session. This is the reconciliation join key.
    pub payment_intent: Option<String>,
    /// The hosted checkout URL the buyer is redirected to.
    pub url: Option<String>,
    /// Session lifecycle status: `open`, `complete` or `expired`.
    pub status: Option<String>,
    /// Payment status: `unpaid`, `paid` or `no_payment_required`.
    pub payment_status: Option<String>,
    pub amount_total: Option<i64>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl CheckoutSession {
    pub fn order_id(&self) -> Option<&str> {
        self.metadata.get("order_id").map(String::as_str)
    }
}

//--------------------------------------     PaymentIntent      ------------------------------------------------------
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PaymentIntent {
    /// The payment intent id (`pi_...`).
    pub id: String,
    pub status: Option<String>,
    pub amount: Option<i64>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

//--------------------------------------     SessionStatus      ------------------------------------------------------
/// The synchronous view of a checkout session, as reported by Stripe. Purely informational; the status probe never
/// writes local state from this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatus {
    pub status: String,
    pub payment_status: String,
}

impl From<&CheckoutSession> for SessionStatus {
    fn from(session: &CheckoutSession) -> Self {
        Self {
            status: session.status.clone().unwrap_or_else(|| "unknown".to_string()),
            payment_status: session.payment_status.clone().unwrap_or_else(|| "unknown".to_string()),
        }
    }
}
