//! # Discovery Agent Library
//!
//! Resolves Office 365-style service endpoints through a discovery service,
//! caches the results in a local file, and mints bearer tokens with a
//! silent-first acquisition flow.
//!
//! Modules:
//! - `config` — service configuration (auth, discovery, storage, settings)
//! - `cache` — persisted discovery cache (length-prefixed file format)
//! - `auth` — identity provider, token resolver, session anchor
//! - `discovery` — discovery service REST client
//! - `clients` — capability-bound resource clients (directory, mail, files)
//! - `session` — caller-owned session memoizing the resource clients

pub mod auth;
pub mod cache;
pub mod clients;
pub mod config;
pub mod discovery;
pub mod error;
pub mod observability;
pub mod resilience;
pub mod server;
pub mod session;
pub mod store;
pub mod utils;

#[cfg(test)]
mod tests;

pub use crate::error::{AgentError, AgentResult};
pub use crate::session::ServiceSession;
