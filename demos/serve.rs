//! Runs fibserv on 127.0.0.1:8080 with in-memory backends.
//!
//! ```text
//! cargo run --example serve
//! curl -X POST http://127.0.0.1:8080/fibonacci/calculate \
//!     -H 'Authorization: Bearer dev-token' \
//!     -H 'Content-Type: application/json' \
//!     -d '{"index": 100}'
//! curl 'http://127.0.0.1:8080/fibonacci/history?page=1&limit=10' \
//!     -H 'Authorization: Bearer dev-token'
//! ```

use std::sync::Arc;

use fibserv::api::Api;
use fibserv::auth::StaticTokenAuthenticator;
use fibserv::cache::MemoryCache;
use fibserv::history::MemoryHistory;
use fibserv::server::Server;
use fibserv::service::{FibonacciService, ServiceConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let service = FibonacciService::with_config(
        Arc::new(MemoryCache::new()),
        Arc::new(MemoryHistory::new()),
        ServiceConfig::default(),
    );
    let auth = StaticTokenAuthenticator::new()
        .with_token("dev-token", 1)
        .with_token("other-token", 2);
    let api = Api::new(service, Arc::new(auth));

    let server = Server::bind("127.0.0.1:8080").await?;
    println!("fibserv listening on http://{}", server.local_addr());

    server
        .run(move |req| {
            let api = api.clone();
            async move { api.dispatch(req).await }
        })
        .await?;

    Ok(())
}
