use thiserror::Error;

#[derive(Debug, Error)]
pub enum StripeApiError {
    #[error("Could not initialize client: {0}")]
    Initialization(String),
    #[error("Stripe could not be reached: {0}")]
    Unreachable(String),
    #[error("Request to Stripe timed out")]
    Timeout,
    #[error("Could not deserialize JSON: {0}")]
    JsonError(String),
    #[error("Query failed. Error {status}. {message}")]
    QueryError { status: u16, message: String },
    #[error("Checkout session {0} has no payment intent attached")]
    MissingPaymentIntent(String),
}

impl StripeApiError {
    /// True for failures the caller may retry: network errors, timeouts and server-side 5xx responses.
    /// Client errors (4xx) indicate a malformed request and retrying cannot succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            StripeApiError::Unreachable(_) | StripeApiError::Timeout => true,
            StripeApiError::QueryError { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for StripeApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            StripeApiError::Timeout
        } else {
            StripeApiError::Unreachable(e.to_string())
        }
    }
}
