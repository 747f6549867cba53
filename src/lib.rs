//! # fibserv
//!
//! An authenticated async HTTP service that computes Fibonacci numbers,
//! serves repeated requests from a shared cache, and records a per-user
//! calculation history with paginated retrieval and aggregate statistics.
//!
//! The interesting parts are capability seams: the orchestrator
//! ([`service::FibonacciService`]) is written against [`cache::ResultCache`]
//! and [`history::HistoryStore`] traits, with in-memory backends provided
//! for tests and single-process deployments.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use fibserv::api::Api;
//! use fibserv::auth::StaticTokenAuthenticator;
//! use fibserv::cache::MemoryCache;
//! use fibserv::history::MemoryHistory;
//! use fibserv::server::Server;
//! use fibserv::service::FibonacciService;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = FibonacciService::new(
//!         Arc::new(MemoryCache::new()),
//!         Arc::new(MemoryHistory::new()),
//!     );
//!     let auth = StaticTokenAuthenticator::new().with_token("dev-token", 1);
//!     let api = Api::new(service, Arc::new(auth));
//!
//!     let server = Server::bind("127.0.0.1:8080").await?;
//!     server
//!         .run(move |req| {
//!             let api = api.clone();
//!             async move { api.dispatch(req).await }
//!         })
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod auth;
pub mod cache;
pub mod engine;
pub mod history;
pub mod http;
pub mod page;
pub mod server;
pub mod service;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use server::{Server, ServerError};
pub use service::{Calculation, CalculationStats, FibonacciService, ServiceConfig, ServiceError};
