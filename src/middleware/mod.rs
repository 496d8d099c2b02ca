pub mod auth;
pub mod cors;
pub mod request_stats;
pub mod response;

pub use auth::{jwt_auth_middleware, AuthUser};
pub use cors::cors_layer;
pub use request_stats::{request_stats_middleware, RequestStats};
pub use response::{ApiResponse, ApiResult};
