//! CORS configuration

use tower_http::cors::CorsLayer;

/// Any origin, method and header
pub fn cors_layer() -> CorsLayer {
    CorsLayer::permissive()
}
