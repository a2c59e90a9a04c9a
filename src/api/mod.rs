pub mod level_size;

use axum::{middleware, Router};
use tower_http::cors::CorsLayer;

pub use level_size::{level_size_router, LevelSizeState, QueryError};

/// Full application router: level size + health, with request logging and CORS.
pub fn app(state: LevelSizeState) -> Router {
    level_size_router()
        .layer(middleware::from_fn(crate::middleware::request_logging))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
