//! Host-keyed routing table.
//!
//! Many readers (request serving) and rare writers (deploy, upgrade,
//! stop, remove). The std `RwLock` is never held across an await; reads
//! clone the `Arc<LiveProxy>` out and serve from it.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::live::LiveProxy;

/// Process-wide mapping of `Host` header → live proxy.
#[derive(Clone, Default)]
pub struct HostRouter {
    hosts: Arc<RwLock<HashMap<String, Arc<LiveProxy>>>>,
}

impl HostRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the proxy for a host. Replacing is the
    /// upgrade cutover: every request routed after this call lands on
    /// the new proxy. Returns the displaced proxy, if any, so the
    /// caller can drain it.
    pub fn insert(&self, host: &str, proxy: Arc<LiveProxy>) -> Option<Arc<LiveProxy>> {
        let mut hosts = self.hosts.write().expect("hosts lock");
        debug!(host, target = proxy.target(), "route registered");
        hosts.insert(host.to_string(), proxy)
    }

    /// Remove the proxy for a host. In-flight requests on the returned
    /// proxy continue to completion; new requests get 404.
    pub fn remove(&self, host: &str) -> Option<Arc<LiveProxy>> {
        let mut hosts = self.hosts.write().expect("hosts lock");
        let removed = hosts.remove(host);
        if removed.is_some() {
            debug!(host, "route removed");
        }
        removed
    }

    /// Resolve a host to its proxy.
    pub fn get(&self, host: &str) -> Option<Arc<LiveProxy>> {
        let hosts = self.hosts.read().expect("hosts lock");
        hosts.get(host).cloned()
    }

    /// All registered hosts.
    pub fn hosts(&self) -> Vec<String> {
        let hosts = self.hosts.read().expect("hosts lock");
        hosts.keys().cloned().collect()
    }
}
