//! fluxd — the flux daemon's frontend.
//!
//! The binary wires the composition root together (catalog, runtime,
//! router, registry, deployer) and serves two listeners: the admin API
//! on `:5647` and the host-routing proxy on `FLUXD_PROXY_PORT`. The API
//! handlers live in [`api`] so they can be exercised in-process by the
//! integration tests.

pub mod api;
