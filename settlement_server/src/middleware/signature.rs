//! Webhook signature middleware for Actix Web.
//!
//! This middleware guards the payment-event endpoints. The payment processor signs every delivery with the
//! endpoint's shared secret; the signature arrives in a header and covers the raw request body. Verification fails
//! closed: a request with a missing, malformed, stale or mismatched signature is rejected before any handler runs,
//! so an unauthenticated payload can never touch order state.

use std::{
    future::{ready, Ready},
    rc::Rc,
};

use actix_http::h1;
use actix_web::{
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    error::{ErrorBadRequest, ErrorForbidden},
    web,
    Error,
};
use chrono::Utc;
use futures::future::LocalBoxFuture;
use log::{trace, warn};
use psg_common::Secret;
use stripe_tools::webhook::verify_signature;

pub struct SignatureMiddlewareFactory {
    signature_header: String,
    secret: Secret<String>,
    tolerance_secs: i64,
    // If false, the middleware will not check signatures and always allow the call
    enabled: bool,
}

impl SignatureMiddlewareFactory {
    pub fn new(signature_header: &str, secret: Secret<String>, tolerance_secs: i64, enabled: bool) -> Self {
        SignatureMiddlewareFactory { signature_header: signature_header.into(), secret, tolerance_secs, enabled }
    }
}

impl<S, B> Transform<S, ServiceRequest> for SignatureMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<B>;
    type Transform = SignatureMiddlewareService<S>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(SignatureMiddlewareService {
            signature_header: self.signature_header.clone(),
            secret: self.secret.clone(),
            tolerance_secs: self.tolerance_secs,
            enabled: self.enabled,
            service: Rc::new(service),
        }))
    }
}

pub struct SignatureMiddlewareService<S> {
    signature_header: String,
    secret: Secret<String>,
    tolerance_secs: i64,
    enabled: bool,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for SignatureMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;
    type Response = ServiceResponse<B>;

    forward_ready!(service);

    fn call(&self, mut req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let secret = self.secret.reveal().clone();
        let signature_header = self.signature_header.clone();
        let tolerance_secs = self.tolerance_secs;
        let enabled = self.enabled;
        Box::pin(async move {
            trace!("🔐️ Checking event signature for request");
            if !enabled {
                trace!("🔐️ Signature checks are disabled. Allowing request.");
                return service.call(req).await;
            }
            let data = req.extract::<web::Bytes>().await.map_err(|e| {
                warn!("🔐️ Failed to extract request data: {:?}", e);
                ErrorBadRequest("Failed to extract request data.")
            })?;
            let header = req.headers().get(&signature_header).and_then(|v| v.to_str().ok()).ok_or_else(|| {
                warn!("🔐️ No event signature found in request. Denying access.");
                ErrorForbidden("No event signature found.")
            })?;
            match verify_signature(&secret, data.as_ref(), header, tolerance_secs, Utc::now().timestamp()) {
                Ok(()) => {
                    trace!("🔐️ Event signature check ✅️");
                    req.set_payload(bytes_to_payload(data));
                    service.call(req).await
                },
                Err(e) => {
                    warn!("🔐️ Rejecting payment event: {e}");
                    Err(ErrorForbidden("Invalid event signature."))
                },
            }
        })
    }
}

fn bytes_to_payload(buf: web::Bytes) -> Payload {
    let (_, mut pl) = h1::Payload::create(true);
    pl.unread_data(buf);
    Payload::from(pl)
}
