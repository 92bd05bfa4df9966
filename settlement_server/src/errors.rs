use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use settlement_engine::{traits::SettlementDbError, SettlementApiError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("The storage layer is temporarily unavailable. {0}")]
    StorageUnavailable(String),
    #[error("The payment processor could not be reached. {0}")]
    PaymentProcessorError(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("The requested listing is not available. {0}")]
    ListingUnavailable(String),
    #[error("The seller cannot accept payments yet. {0}")]
    SellerNotOnboarded(String),
    #[error("The request conflicts with the current order state. {0}")]
    Conflict(String),
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error("Authentication Error. {0}")]
    AuthenticationError(#[from] AuthError),
    #[error("Insufficient Permissions. {0}")]
    InsufficientPermissions(String),
    #[error("Could not serialize access token. {0}")]
    CouldNotSerializeAccessToken(String),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::ListingUnavailable(_) => StatusCode::BAD_REQUEST,
            Self::SellerNotOnboarded(_) => StatusCode::CONFLICT,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::AuthenticationError(e) => match e {
                AuthError::MissingToken => StatusCode::UNAUTHORIZED,
                AuthError::ValidationError(_) => StatusCode::UNAUTHORIZED,
            },
            Self::InsufficientPermissions(_) => StatusCode::FORBIDDEN,
            Self::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::PaymentProcessorError(_) => StatusCode::BAD_GATEWAY,
            Self::CouldNotSerializeAccessToken(_) => StatusCode::BAD_REQUEST,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("No access token was provided.")]
    MissingToken,
    #[error("Access token is invalid. {0}")]
    ValidationError(String),
}

impl From<SettlementApiError> for ServerError {
    fn from(e: SettlementApiError) -> Self {
        match e {
            SettlementApiError::ListingUnavailable(_) => Self::ListingUnavailable(e.to_string()),
            SettlementApiError::SellerNotOnboarded(_) => Self::SellerNotOnboarded(e.to_string()),
            SettlementApiError::InvalidQuantity(_) => Self::InvalidRequestBody(e.to_string()),
            SettlementApiError::OrderNotFound(_) => Self::NoRecordFound(e.to_string()),
            SettlementApiError::TransitionForbidden { .. } => Self::Conflict(e.to_string()),
            SettlementApiError::DatabaseError(db) => Self::from(db),
        }
    }
}

impl From<SettlementDbError> for ServerError {
    fn from(e: SettlementDbError) -> Self {
        match &e {
            SettlementDbError::OrderNotFound(_) | SettlementDbError::OrderIdNotFound(_) => {
                Self::NoRecordFound(e.to_string())
            },
            SettlementDbError::PaymentRefNotAttachable(_) | SettlementDbError::DuplicatePaymentRef(_) => {
                Self::Conflict(e.to_string())
            },
            SettlementDbError::DatabaseError(_) => Self::StorageUnavailable(e.to_string()),
        }
    }
}
