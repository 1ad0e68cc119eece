//! The axum service that fronts the routing table.

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, Request, Response, StatusCode};

use crate::router::HostRouter;

/// Build the proxy listener's service: every request is dispatched on
/// its `Host` header; unknown hosts get 404.
pub fn proxy_service(router: HostRouter) -> axum::Router {
    axum::Router::new().fallback(dispatch).with_state(router)
}

async fn dispatch(State(router): State<HostRouter>, req: Request<Body>) -> Response<Body> {
    let host = req
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    match router.get(&host) {
        Some(proxy) => proxy.forward(req).await,
        None => Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Body::from("Deployment not found"))
            .expect("static response"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live::LiveProxy;
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn spawn_backend(body: &'static str) -> (String, u16) {
        let app = axum::Router::new().route("/", axum::routing::get(move || async move { body }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (addr.ip().to_string(), addr.port())
    }

    fn request_for(host: &str) -> Request<Body> {
        Request::builder()
            .uri("/")
            .header(header::HOST, host)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn unknown_host_is_404() {
        let service = proxy_service(HostRouter::new());
        let resp = service.oneshot(request_for("nope.test")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn known_host_reaches_the_backend() {
        let (ip, port) = spawn_backend("blue").await;
        let router = HostRouter::new();
        router.insert("web.test", Arc::new(LiveProxy::new(&ip, port)));

        let service = proxy_service(router);
        let resp = service.oneshot(request_for("web.test")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"blue");
    }

    #[tokio::test]
    async fn cutover_repoints_new_requests() {
        let (blue_ip, blue_port) = spawn_backend("blue").await;
        let (green_ip, green_port) = spawn_backend("green").await;

        let router = HostRouter::new();
        router.insert("web.test", Arc::new(LiveProxy::new(&blue_ip, blue_port)));

        let service = proxy_service(router.clone());
        let resp = service
            .clone()
            .oneshot(request_for("web.test"))
            .await
            .unwrap();
        let body = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"blue");

        // Cutover: a single insert atomically replaces the handler.
        router.insert("web.test", Arc::new(LiveProxy::new(&green_ip, green_port)));

        let resp = service.oneshot(request_for("web.test")).await.unwrap();
        let body = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"green");
    }

    #[tokio::test]
    async fn removed_host_stops_accepting_requests() {
        let (ip, port) = spawn_backend("blue").await;
        let router = HostRouter::new();
        router.insert("web.test", Arc::new(LiveProxy::new(&ip, port)));
        router.remove("web.test");

        let service = proxy_service(router);
        let resp = service.oneshot(request_for("web.test")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
