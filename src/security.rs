use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::{http::header, Error};
use futures_util::future::{ready, LocalBoxFuture, Ready};
use std::rc::Rc;

const CSP: &str = "default-src 'self'; img-src 'self' data: blob:; media-src 'self'; object-src 'none'; \
                   base-uri 'none'; frame-ancestors 'none'; form-action 'self'";

/// Adds a fixed set of response hardening headers unless the handler already
/// set them. Uploaded media is readable cross-origin so a frontend served from
/// another host can embed it.
#[derive(Clone, Default)]
pub struct SecurityHeaders {
    pub enable_hsts: bool,
}

impl SecurityHeaders {
    pub fn new(enable_hsts: bool) -> Self {
        Self { enable_hsts }
    }
}

impl<S, B> Transform<S, ServiceRequest> for SecurityHeaders
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = SecurityHeadersMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(SecurityHeadersMiddleware { service: Rc::new(service), cfg: self.clone() }))
    }
}

pub struct SecurityHeadersMiddleware<S> {
    service: Rc<S>,
    cfg: SecurityHeaders,
}

impl<S, B> Service<ServiceRequest> for SecurityHeadersMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&self, ctx: &mut std::task::Context<'_>) -> std::task::Poll<Result<(), Self::Error>> {
        self.service.poll_ready(ctx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let svc = self.service.clone();
        let hsts = self.cfg.enable_hsts;
        let media = req.path().starts_with("/uploads/");
        Box::pin(async move {
            let mut res = svc.call(req).await?;
            let headers = res.response_mut().headers_mut();
            let mut set_default = |name: header::HeaderName, value: &'static str| {
                if !headers.contains_key(&name) {
                    headers.insert(name, header::HeaderValue::from_static(value));
                }
            };
            set_default(header::CONTENT_SECURITY_POLICY, CSP);
            set_default(header::REFERRER_POLICY, "no-referrer");
            set_default(header::X_CONTENT_TYPE_OPTIONS, "nosniff");
            set_default(header::X_FRAME_OPTIONS, "DENY");
            set_default(header::X_XSS_PROTECTION, "0");
            set_default(
                header::HeaderName::from_static("cross-origin-resource-policy"),
                if media { "cross-origin" } else { "same-origin" },
            );
            if hsts {
                set_default(header::STRICT_TRANSPORT_SECURITY, "max-age=63072000; includeSubDomains");
            }
            Ok(res)
        })
    }
}
