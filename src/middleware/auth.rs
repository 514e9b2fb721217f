use crate::core::AppError;
use actix_web::{
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    Error, FromRequest, HttpMessage, HttpRequest,
};
use futures_util::future::LocalBoxFuture;
use std::future::{ready, Ready};
use std::rc::Rc;

/// Authenticated caller identity, as established by the upstream auth gate.
///
/// This service performs no credential validation itself: requests arrive
/// pre-authenticated and the gate forwards the caller id and write permission
/// in trusted headers.
#[derive(Debug, Clone)]
pub struct Caller {
    pub user_id: String,
    pub can_write: bool,
}

impl Caller {
    /// Fail with `Unauthorized` unless the caller may mutate installment data
    pub fn require_write(&self) -> crate::core::Result<()> {
        if !self.can_write {
            return Err(AppError::unauthorized(
                "Caller does not have write permission",
            ));
        }
        Ok(())
    }
}

impl FromRequest for Caller {
    type Error = Error;
    type Future = Ready<std::result::Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let caller = req.extensions().get::<Caller>().cloned();
        ready(caller.ok_or_else(|| {
            Error::from(AppError::unauthorized("Missing caller identity"))
        }))
    }
}

/// Identity middleware consuming the upstream gate's headers
pub struct IdentityGate;

impl<S, B> Transform<S, ServiceRequest> for IdentityGate
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = IdentityGateMiddleware<S>;
    type Future = Ready<std::result::Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(IdentityGateMiddleware {
            service: Rc::new(service),
        }))
    }
}

pub struct IdentityGateMiddleware<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for IdentityGateMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, std::result::Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let svc = self.service.clone();

        Box::pin(async move {
            // Skip identity extraction for health check and public endpoints
            let path = req.path();
            if path == "/health" || path == "/" {
                return svc.call(req).await;
            }

            let user_id = req
                .headers()
                .get("X-User-Id")
                .and_then(|h| h.to_str().ok())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| Error::from(AppError::unauthorized("Missing X-User-Id header")))?
                .to_string();

            let can_write = req
                .headers()
                .get("X-User-Can-Write")
                .and_then(|h| h.to_str().ok())
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false);

            req.extensions_mut().insert(Caller { user_id, can_write });

            svc.call(req).await
        })
    }
}
