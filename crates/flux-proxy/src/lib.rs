//! flux-proxy — the host-routing fabric in front of deployments.
//!
//! A process-wide mapping from `Host` header to [`LiveProxy`] plus an
//! axum service that dispatches incoming requests on it. Each live proxy
//! counts its in-flight requests so the graceful drain can wait for old
//! traffic to finish before removing a displaced generation.

pub mod live;
pub mod router;
mod service;

pub use live::LiveProxy;
pub use router::HostRouter;
pub use service::proxy_service;
