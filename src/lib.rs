//! Queue-Mediated Remote Invocation
//!
//! This library implements the command-relay protocol: a producer running in
//! an unrestricted environment and a worker behind an outbound-only network
//! boundary exchange one command/result pair at a time through two named
//! slots in a shared object store. Neither side can reach the other
//! directly; both only poll the store.

pub mod app_state;
pub mod config;
pub mod models;
pub mod routes;
pub mod services;
