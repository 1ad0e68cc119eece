//! LiveProxy — reverse proxy to a single deployment head.
//!
//! The in-flight counter is incremented before a request is dispatched
//! upstream and decremented exactly once when the upstream response
//! arrives or the transport fails. The drain protocol relies on the
//! counter never drifting: a completed request always returns it to its
//! pre-request value.

use std::sync::atomic::{AtomicI64, Ordering};

use axum::body::Body;
use axum::http::{header, HeaderValue, Request, Response, StatusCode, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tracing::warn;

/// Reverse proxy bound to one deployment head.
pub struct LiveProxy {
    /// Upstream address, `ip:port`.
    target: String,
    in_flight: AtomicI64,
    client: Client<HttpConnector, Body>,
}

impl LiveProxy {
    /// Build a proxy targeting the head container's bridge address.
    pub fn new(ip_address: &str, port: u16) -> Self {
        Self {
            target: format!("{ip_address}:{port}"),
            in_flight: AtomicI64::new(0),
            client: Client::builder(TokioExecutor::new()).build_http(),
        }
    }

    /// Upstream address this proxy forwards to.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Requests currently dispatched upstream.
    pub fn in_flight(&self) -> i64 {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Forward a request to the head, rewriting the URL and Host header.
    ///
    /// A transport failure yields `503 Service Unavailable`; the request
    /// body is dropped with the failed connection either way.
    pub async fn forward(&self, mut req: Request<Body>) -> Response<Body> {
        let path_and_query = req
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let uri: Uri = match format!("http://{}{}", self.target, path_and_query).parse() {
            Ok(uri) => uri,
            Err(e) => {
                warn!(target = %self.target, error = %e, "failed to build upstream uri");
                return status_response(StatusCode::INTERNAL_SERVER_ERROR, "Bad upstream target");
            }
        };
        *req.uri_mut() = uri;

        if let Ok(host) = HeaderValue::from_str(&self.target) {
            req.headers_mut().insert(header::HOST, host);
        }

        self.in_flight.fetch_add(1, Ordering::SeqCst);
        match self.client.request(req).await {
            Ok(resp) => {
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                resp.map(Body::new)
            }
            Err(e) => {
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                warn!(target = %self.target, error = %e, "proxy error");
                status_response(StatusCode::SERVICE_UNAVAILABLE, "Service unavailable")
            }
        }
    }
}

impl std::fmt::Debug for LiveProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveProxy")
            .field("target", &self.target)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

fn status_response(status: StatusCode, message: &'static str) -> Response<Body> {
    Response::builder()
        .status(status)
        .body(Body::from(message))
        .expect("static response")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    async fn spawn_backend(body: &'static str) -> String {
        let app = axum::Router::new().route("/", axum::routing::get(move || async move { body }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr.to_string()
    }

    fn request() -> Request<Body> {
        Request::builder()
            .uri("/")
            .header(header::HOST, "web.test")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn forwards_and_counter_returns_to_zero() {
        let addr = spawn_backend("hello").await;
        let (ip, port) = addr.rsplit_once(':').unwrap();
        let proxy = LiveProxy::new(ip, port.parse().unwrap());

        let resp = proxy.forward(request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(proxy.in_flight(), 0);
    }

    #[tokio::test]
    async fn transport_failure_is_503_and_counter_returns_to_zero() {
        // Nothing listens on this port.
        let proxy = LiveProxy::new("127.0.0.1", 1);

        let resp = proxy.forward(request()).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(proxy.in_flight(), 0);
    }

    #[tokio::test]
    async fn concurrent_requests_never_leave_a_residual_count() {
        let addr = spawn_backend("ok").await;
        let (ip, port) = addr.rsplit_once(':').unwrap();
        let proxy = Arc::new(LiveProxy::new(ip, port.parse().unwrap()));

        let mut handles = Vec::new();
        for _ in 0..32 {
            let proxy = proxy.clone();
            handles.push(tokio::spawn(async move {
                let resp = proxy.forward(request()).await;
                assert_eq!(resp.status(), StatusCode::OK);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(proxy.in_flight(), 0);
    }

    #[tokio::test]
    async fn counter_never_goes_negative_under_mixed_outcomes() {
        let addr = spawn_backend("ok").await;
        let (ip, port) = addr.rsplit_once(':').unwrap();
        let good = Arc::new(LiveProxy::new(ip, port.parse().unwrap()));
        let bad = Arc::new(LiveProxy::new("127.0.0.1", 1));

        let mut handles = Vec::new();
        for i in 0..16 {
            let proxy = if i % 2 == 0 { good.clone() } else { bad.clone() };
            handles.push(tokio::spawn(async move {
                let _ = proxy.forward(request()).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(good.in_flight(), 0);
        assert_eq!(bad.in_flight(), 0);
    }
}
