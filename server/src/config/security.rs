use axum::http::{header, HeaderName, HeaderValue, Request, Response};
use std::task::{Context, Poll};
use tower::{Layer, Service};

const X_XSS_PROTECTION: &str = "x-xss-protection";
const PERMISSIONS_POLICY: &str = "permissions-policy";

const NOSNIFF: &str = "nosniff";
const DENY: &str = "DENY";
const XSS_BLOCK: &str = "1; mode=block";
const HSTS_VALUE: &str = "max-age=31536000; includeSubDomains";
const CSP_API_VALUE: &str = "default-src 'none'; frame-ancestors 'none'";
const REFERRER_POLICY_VALUE: &str = "strict-origin-when-cross-origin";
const PERMISSIONS_POLICY_VALUE: &str = "geolocation=(), microphone=(), camera=()";
// Entitlement views carry activation codes and pins.
const NO_STORE: &str = "no-store";

#[derive(Clone)]
pub struct SecurityHeadersLayer {
    include_hsts: bool,
}

impl SecurityHeadersLayer {
    pub fn new(include_hsts: bool) -> Self {
        if include_hsts {
            tracing::info!("Security: HSTS header enabled (production mode)");
        } else {
            tracing::info!("Security: HSTS header disabled (development mode)");
        }
        Self { include_hsts }
    }
}

impl<S> Layer<S> for SecurityHeadersLayer {
    type Service = SecurityHeadersService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SecurityHeadersService {
            inner,
            include_hsts: self.include_hsts,
        }
    }
}

#[derive(Clone)]
pub struct SecurityHeadersService<S> {
    inner: S,
    include_hsts: bool,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for SecurityHeadersService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = SecurityHeadersFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        SecurityHeadersFuture {
            future: self.inner.call(request),
            include_hsts: self.include_hsts,
        }
    }
}

#[pin_project::pin_project]
pub struct SecurityHeadersFuture<F> {
    #[pin]
    future: F,
    include_hsts: bool,
}

impl<F, ResBody, E> std::future::Future for SecurityHeadersFuture<F>
where
    F: std::future::Future<Output = Result<Response<ResBody>, E>>,
{
    type Output = Result<Response<ResBody>, E>;

    fn poll(self: std::pin::Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();

        match this.future.poll(cx) {
            Poll::Ready(Ok(mut response)) => {
                let headers = response.headers_mut();

                headers.insert(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static(NOSNIFF));
                headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static(DENY));
                headers.insert(
                    HeaderName::from_static(X_XSS_PROTECTION),
                    HeaderValue::from_static(XSS_BLOCK),
                );
                headers.insert(
                    header::CONTENT_SECURITY_POLICY,
                    HeaderValue::from_static(CSP_API_VALUE),
                );
                headers.insert(
                    header::REFERRER_POLICY,
                    HeaderValue::from_static(REFERRER_POLICY_VALUE),
                );
                headers.insert(
                    HeaderName::from_static(PERMISSIONS_POLICY),
                    HeaderValue::from_static(PERMISSIONS_POLICY_VALUE),
                );
                headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(NO_STORE));

                if *this.include_hsts {
                    headers.insert(
                        header::STRICT_TRANSPORT_SECURITY,
                        HeaderValue::from_static(HSTS_VALUE),
                    );
                }

                Poll::Ready(Ok(response))
            }
            Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
            Poll::Pending => Poll::Pending,
        }
    }
}

pub fn create_security_headers_layer(production: bool) -> SecurityHeadersLayer {
    SecurityHeadersLayer::new(production)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::{routing::get, Router};
    use tower::ServiceExt;

    #[test]
    fn test_security_headers_layer_creation() {
        assert!(!SecurityHeadersLayer::new(false).include_hsts);
        assert!(SecurityHeadersLayer::new(true).include_hsts);
    }

    #[tokio::test]
    async fn test_headers_applied_to_responses() {
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(create_security_headers_layer(false));

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let headers = response.headers();
        assert_eq!(headers.get(header::X_CONTENT_TYPE_OPTIONS).unwrap(), "nosniff");
        assert_eq!(headers.get(header::CACHE_CONTROL).unwrap(), "no-store");
        assert!(headers.get(header::STRICT_TRANSPORT_SECURITY).is_none());
    }

    #[tokio::test]
    async fn test_production_adds_hsts_and_custom_headers() {
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(create_security_headers_layer(true));

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let headers = response.headers();
        assert_eq!(headers.get(header::STRICT_TRANSPORT_SECURITY).unwrap(), HSTS_VALUE);
        assert_eq!(headers.get(X_XSS_PROTECTION).unwrap(), XSS_BLOCK);
        assert_eq!(headers.get(PERMISSIONS_POLICY).unwrap(), PERMISSIONS_POLICY_VALUE);
    }
}
