//! HTTP router.
//!
//! Returns a composable `Router` with the JSON API nested under `/api/`
//! and the gated web views at the root.
//!
//! Middleware stack (outermost → innermost):
//! 1. Access logger → 2. Cross-origin headers → 3. Session validator
//!    (protected `/api` routes only)

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue};
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::api::endpoints;
use crate::api::middleware;
use crate::api::types::ApiContext;
use crate::core_state::CoreState;

/// Build the application router.
///
/// Middleware uses `Extension<ApiContext>` (injected as the outermost layer).
/// Endpoint handlers use `State<ApiContext>` (provided via `with_state`).
pub fn app_router(core: Arc<CoreState>) -> Router {
    build_router(ApiContext::new(core))
}

fn build_router(ctx: ApiContext) -> Router {
    // NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
    let protected = Router::new()
        .route("/auth/logout", post(endpoints::auth::logout))
        .route("/me", get(endpoints::auth::me))
        .route(
            "/patients",
            get(endpoints::patients::list).post(endpoints::patients::create),
        )
        .route("/patients/:id", get(endpoints::patients::get))
        .route(
            "/patients/:id/visits",
            get(endpoints::visits::list).post(endpoints::visits::create),
        )
        .route(
            "/patients/:id/visits/:visit_id/prescription",
            put(endpoints::visits::update_prescription),
        )
        .route("/billing/:id", post(endpoints::billing::generate))
        .with_state(ctx.clone())
        .route_layer(axum::middleware::from_fn(middleware::auth::require_session));

    let public = Router::new()
        .route("/auth/register", post(endpoints::auth::register))
        .route("/auth/login", post(endpoints::auth::login))
        .route("/health", get(endpoints::health::check))
        .route("/network", get(endpoints::network::status))
        .route("/network/retry", post(endpoints::network::retry))
        .with_state(ctx.clone());

    // Views gate themselves and answer with redirects instead of 401s
    let pages = Router::new()
        .route("/", get(endpoints::pages::index))
        .route("/login", get(endpoints::pages::login))
        .route("/doctor", get(endpoints::pages::doctor))
        .route("/receptionist", get(endpoints::pages::receptionist))
        .route("/billing/:id", get(endpoints::pages::billing))
        .route("/test", get(endpoints::pages::test_page))
        .route("/debug", get(endpoints::diagnostics::debug))
        .with_state(ctx.clone());

    Router::new()
        .nest("/api", protected.merge(public))
        .merge(pages)
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("cross-origin-embedder-policy"),
            HeaderValue::from_static("unsafe-none"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("cross-origin-opener-policy"),
            HeaderValue::from_static("same-origin-allow-popups"),
        ))
        .layer(axum::middleware::from_fn(middleware::audit::log_access))
        // Extension must be outermost so middleware can extract ApiContext
        .layer(axum::Extension(ctx))
}
