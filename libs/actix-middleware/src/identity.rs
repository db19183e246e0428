//! Gateway identity middleware
//!
//! The platform gateway authenticates every request and forwards the caller
//! as an `X-User-ID` header. This middleware parses that header into a
//! [`UserId`] stored in request extensions; services treat its absence as an
//! unauthenticated request (handlers decide whether that is an error).

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage,
};
use futures::future::LocalBoxFuture;
use std::future::{ready, Ready};
use uuid::Uuid;

pub const USER_ID_HEADER: &str = "x-user-id";

/// Authenticated caller id, inserted into request extensions when the
/// gateway header is present and well-formed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserId(pub Uuid);

#[derive(Clone, Default)]
pub struct IdentityGateway;

impl IdentityGateway {
    pub fn new() -> Self {
        Self
    }
}

impl<S, B> Transform<S, ServiceRequest> for IdentityGateway
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = IdentityGatewayService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(IdentityGatewayService { service }))
    }
}

pub struct IdentityGatewayService<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for IdentityGatewayService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let user_id = req
            .headers()
            .get(USER_ID_HEADER)
            .and_then(|h| h.to_str().ok())
            .and_then(|s| Uuid::parse_str(s.trim()).ok());

        match user_id {
            Some(id) => {
                req.extensions_mut().insert(UserId(id));
            }
            None => {
                // Leave extensions untouched; downstream extractors reject
                // with 401 where authentication is required.
                if req.headers().contains_key(USER_ID_HEADER) {
                    tracing::warn!("malformed {} header dropped", USER_ID_HEADER);
                }
            }
        }

        let fut = self.service.call(req);
        Box::pin(fut)
    }
}
