//! API Router configuration

use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, patch, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the main API router
pub fn create_router(state: AppState, enable_cors: bool) -> Router {
    let api_routes = Router::new()
        // Health
        .route("/health", get(handlers::health_check))
        // Definitions
        .route(
            "/definitions",
            get(handlers::list_definitions).post(handlers::create_definition),
        )
        .route(
            "/definitions/:id",
            get(handlers::get_definition)
                .patch(handlers::update_definition)
                .delete(handlers::delete_definition),
        )
        .route("/definitions/:id/activate", post(handlers::activate_definition))
        .route("/definitions/:id/deactivate", post(handlers::deactivate_definition))
        .route("/definitions/:id/duplicate", post(handlers::duplicate_definition))
        .route("/definitions/:id/validation", get(handlers::validate_definition))
        // Stages
        .route("/definitions/:id/stages", post(handlers::add_stage))
        .route("/definitions/:id/stages/order", put(handlers::reorder_stages))
        .route(
            "/stages/:id",
            patch(handlers::update_stage).delete(handlers::delete_stage),
        )
        .route("/stages/:id/required-documents", get(handlers::required_documents))
        // Transitions
        .route("/definitions/:id/transitions", post(handlers::add_transition))
        .route(
            "/transitions/:id",
            patch(handlers::update_transition).delete(handlers::delete_transition),
        )
        // Orchestration
        .route(
            "/categories/:category/active-definition",
            get(handlers::get_active_definition),
        )
        .route("/applications", post(handlers::attach_application))
        .route("/applications/:id", get(handlers::get_application_state))
        .route("/applications/:id/transitions", post(handlers::request_transition))
        .route(
            "/applications/:id/eligible-transitions",
            post(handlers::eligible_transitions),
        )
        .route("/applications/:id/reevaluate", post(handlers::reevaluate_application))
        // Audit
        .route("/audit", get(handlers::list_audit))
        .route("/audit/verify", get(handlers::verify_audit));

    let router = Router::new()
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http());

    let router = if enable_cors {
        router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        router
    };

    router.with_state(state)
}
