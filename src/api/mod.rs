//! API surface — fixed-route dispatch over the calculation service.
//!
//! Five routes, all requiring a bearer token:
//!
//! | Route                      | Method | Operation                         |
//! |----------------------------|--------|-----------------------------------|
//! | `/fibonacci/calculate`     | POST   | compute-or-cache, record history  |
//! | `/fibonacci/history`       | GET    | timeline view, newest first       |
//! | `/fibonacci/all`           | GET    | coverage view, index ascending    |
//! | `/fibonacci/range`         | GET    | inclusive index-range search      |
//! | `/fibonacci/stats`         | GET    | aggregate statistics              |
//!
//! Error mapping: validation failures are `400`, missing/unknown tokens are
//! `401`, unknown paths `404`, known paths with the wrong method `405`, and
//! store failures on the read path `500`. All error bodies are
//! `{"error": message}`.

use std::sync::Arc;

use serde::Deserialize;
use tracing::warn;

use crate::auth::{Authenticator, bearer_token};
use crate::http::{Method, Request, Response, StatusCode};
use crate::page::PageRequest;
use crate::service::{FibonacciService, ServiceError};

const ROUTE_PATHS: &[&str] = &[
    "/fibonacci/calculate",
    "/fibonacci/history",
    "/fibonacci/all",
    "/fibonacci/range",
    "/fibonacci/stats",
];

/// Body of a `POST /fibonacci/calculate` request.
///
/// `index` is taken as `i64` so a negative number is rejected with a clear
/// message instead of a generic deserialization error.
#[derive(Debug, Deserialize)]
struct CalculateBody {
    index: i64,
}

/// The HTTP API: authenticates requests and routes them to the service.
#[derive(Clone)]
pub struct Api {
    service: FibonacciService,
    auth: Arc<dyn Authenticator>,
}

impl Api {
    /// Builds the API over a service and an authenticator.
    pub fn new(service: FibonacciService, auth: Arc<dyn Authenticator>) -> Self {
        Self { service, auth }
    }

    /// Dispatches one request to its handler.
    ///
    /// This is the function handed to [`crate::server::Server::run`].
    pub async fn dispatch(&self, request: Request) -> Response {
        let user_id = match self.authenticate(&request).await {
            Some(id) => id,
            None => {
                return Response::error(
                    StatusCode::Unauthorized,
                    "missing or invalid bearer token",
                );
            }
        };

        let path = normalize_path(request.path());

        match (request.method(), path) {
            (Method::Post, "/fibonacci/calculate") => self.calculate(user_id, &request).await,
            (Method::Get, "/fibonacci/history") => self.history(user_id, &request).await,
            (Method::Get, "/fibonacci/all") => self.all_calculations(user_id, &request).await,
            (Method::Get, "/fibonacci/range") => self.range_search(user_id, &request).await,
            (Method::Get, "/fibonacci/stats") => self.stats(user_id).await,
            (_, path) if ROUTE_PATHS.contains(&path) => Response::error(
                StatusCode::MethodNotAllowed,
                "method not allowed for this route",
            ),
            _ => Response::error(StatusCode::NotFound, "no such route"),
        }
    }

    async fn authenticate(&self, request: &Request) -> Option<u64> {
        let header = request.headers().get("authorization")?;
        let token = bearer_token(header)?;
        self.auth.verify(token).await
    }

    async fn calculate(&self, user_id: u64, request: &Request) -> Response {
        let body: CalculateBody = match request.json() {
            Ok(body) => body,
            Err(_) => {
                return Response::error(
                    StatusCode::BadRequest,
                    r#"body must be JSON of the form {"index": n}"#,
                );
            }
        };

        let Ok(index) = u32::try_from(body.index) else {
            return Response::error(StatusCode::BadRequest, "index must be between 0 and 1000");
        };

        match self.service.calculate(user_id, index).await {
            Ok(calculation) => Response::json(StatusCode::Ok, &calculation),
            Err(e) => error_response(e),
        }
    }

    async fn history(&self, user_id: u64, request: &Request) -> Response {
        let page = match page_request(request) {
            Ok(page) => page,
            Err(response) => return response,
        };
        match self.service.history(user_id, page).await {
            Ok(page) => Response::json(StatusCode::Ok, &page),
            Err(e) => error_response(e),
        }
    }

    async fn all_calculations(&self, user_id: u64, request: &Request) -> Response {
        let page = match page_request(request) {
            Ok(page) => page,
            Err(response) => return response,
        };
        match self.service.all_calculations(user_id, page).await {
            Ok(page) => Response::json(StatusCode::Ok, &page),
            Err(e) => error_response(e),
        }
    }

    async fn range_search(&self, user_id: u64, request: &Request) -> Response {
        let (min, max) = match (
            required_u32_param(request, "min"),
            required_u32_param(request, "max"),
        ) {
            (Ok(min), Ok(max)) => (min, max),
            (Err(response), _) | (_, Err(response)) => return response,
        };
        let page = match page_request(request) {
            Ok(page) => page,
            Err(response) => return response,
        };

        match self.service.range_search(user_id, min, max, page).await {
            Ok(page) => Response::json(StatusCode::Ok, &page),
            Err(e) => error_response(e),
        }
    }

    async fn stats(&self, user_id: u64) -> Response {
        match self.service.stats(user_id).await {
            Ok(stats) => Response::json(StatusCode::Ok, &stats),
            Err(e) => error_response(e),
        }
    }
}

// Trailing slashes are equivalent: `/fibonacci/stats/` routes like
// `/fibonacci/stats`.
fn normalize_path(path: &str) -> &str {
    if path.len() > 1 {
        path.trim_end_matches('/')
    } else {
        path
    }
}

fn error_response(err: ServiceError) -> Response {
    match err {
        ServiceError::IndexOutOfRange { .. } | ServiceError::InvalidRange { .. } => {
            Response::error(StatusCode::BadRequest, &err.to_string())
        }
        ServiceError::Store(e) => {
            warn!(error = %e, "query failed against history store");
            Response::error(StatusCode::InternalServerError, "history store unavailable")
        }
    }
}

// `page`/`limit` are optional; when present they must be non-negative
// integers. Out-of-range values are clamped downstream, not rejected.
fn page_request(request: &Request) -> Result<PageRequest, Response> {
    let page = optional_u64_param(request, "page")?;
    let limit = optional_u64_param(request, "limit")?;
    Ok(PageRequest::new(page, limit))
}

fn optional_u64_param(request: &Request, name: &str) -> Result<Option<u64>, Response> {
    match request.query_param(name) {
        None => Ok(None),
        Some(raw) => raw.parse::<u64>().map(Some).map_err(|_| {
            Response::error(
                StatusCode::BadRequest,
                &format!("query parameter '{name}' must be a non-negative integer"),
            )
        }),
    }
}

fn required_u32_param(request: &Request, name: &str) -> Result<u32, Response> {
    let raw = request.query_param(name).ok_or_else(|| {
        Response::error(
            StatusCode::BadRequest,
            &format!("missing required query parameter '{name}'"),
        )
    })?;
    raw.parse::<u32>().map_err(|_| {
        Response::error(
            StatusCode::BadRequest,
            &format!("query parameter '{name}' must be a non-negative integer"),
        )
    })
}
