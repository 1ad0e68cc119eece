//! flux-state — the durable catalog behind the flux daemon.
//!
//! A redb-backed relational store of apps, deployments, containers, and
//! volumes. The catalog is the sole source of truth across restarts: the
//! in-memory registry is rebuilt from it on startup, and every pipeline
//! mutation is committed here before it becomes visible elsewhere.
//!
//! All values are JSON-serialized into redb's `&[u8]` value columns;
//! multi-row mutations run inside a single write transaction.

pub mod catalog;
pub mod error;
pub mod records;
mod tables;

pub use catalog::{Catalog, VolumeSpec};
pub use error::{StateError, StateResult};
pub use records::{
    AppRecord, ContainerRecord, DeploymentRecord, LoadedApp, LoadedContainer, VolumeRecord,
};
