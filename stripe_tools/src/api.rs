use std::sync::Arc;

use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client,
};
use serde::de::DeserializeOwned;

use crate::{
    config::StripeConfig,
    data_objects::{CheckoutSession, NewCheckoutSession},
    StripeApiError,
};

#[derive(Clone)]
pub struct StripeApi {
    config: StripeConfig,
    client: Arc<Client>,
}

impl StripeApi {
    pub fn new(config: StripeConfig) -> Result<Self, StripeApiError> {
        let mut headers = HeaderMap::with_capacity(1);
        let bearer = format!("Bearer {}", config.secret_key.reveal());
        let val =
            HeaderValue::from_str(&bearer).map_err(|e| StripeApiError::Initialization(e.to_string()))?;
        headers.insert("Authorization", val);
        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| StripeApiError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    /// Open a new Checkout Session for a marketplace purchase.
    ///
    /// The commission split travels with the session: `application_fee_amount` is the platform's cut and
    /// `transfer_data[destination]` routes the remainder to the seller's connected account. The local order id rides
    /// along in metadata for cross-checking, but the returned `payment_intent` id is the reconciliation join key,
    /// so a session that comes back without one is treated as an error.
    pub async fn create_checkout_session(
        &self,
        request: &NewCheckoutSession,
    ) -> Result<CheckoutSession, StripeApiError> {
        let unit_amount = request.unit_amount.value().to_string();
        let quantity = request.quantity.to_string();
        let platform_fee = request.platform_fee.value().to_string();
        let params: Vec<(&str, &str)> = vec![
            ("mode", "payment"),
            ("success_url", &self.config.success_url),
            ("cancel_url", &self.config.cancel_url),
            ("line_items[0][price_data][currency]", &request.currency),
            ("line_items[0][price_data][unit_amount]", &unit_amount),
            ("line_items[0][price_data][product_data][name]", &request.product_name),
            ("line_items[0][quantity]", &quantity),
            ("payment_intent_data[application_fee_amount]", &platform_fee),
            ("payment_intent_data[transfer_data][destination]", &request.destination_account),
            ("metadata[order_id]", &request.order_id),
        ];
        let session: CheckoutSession = self.form_post("/v1/checkout/sessions", &params).await?;
        if session.payment_intent.is_none() {
            return Err(StripeApiError::MissingPaymentIntent(session.id));
        }
        debug!("💳️ Checkout session {} created for order {}", session.id, request.order_id);
        Ok(session)
    }

    /// Fetch the current state of a checkout session. Read-only; used by the status probe.
    pub async fn fetch_checkout_session(&self, session_id: &str) -> Result<CheckoutSession, StripeApiError> {
        let path = format!("/v1/checkout/sessions/{session_id}");
        self.get(&path).await
    }

    async fn form_post<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T, StripeApiError> {
        let url = self.url(path);
        trace!("💳️ POST {url}");
        let response = self.client.post(url).form(params).send().await?;
        Self::parse_response(response).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, StripeApiError> {
        let url = self.url(path);
        trace!("💳️ GET {url}");
        let response = self.client.get(url).send().await?;
        Self::parse_response(response).await
    }

    async fn parse_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, StripeApiError> {
        if response.status().is_success() {
            trace!("💳️ Query successful. {}", response.status());
            response.json::<T>().await.map_err(|e| StripeApiError::JsonError(e.to_string()))
        } else {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_else(|e| e.to_string());
            Err(StripeApiError::QueryError { status, message })
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.api_base)
    }
}
