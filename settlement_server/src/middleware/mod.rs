mod signature;

pub use signature::SignatureMiddlewareFactory;

/// The header Stripe uses to sign event deliveries.
pub const SIGNATURE_HEADER: &str = "Stripe-Signature";
