mod auth;
mod error_handler;
mod rate_limit;
mod role_guard;

pub use auth::auth_middleware;
pub use error_handler::log_errors;
pub use rate_limit::{RateLimiter, rate_limit};
pub use role_guard::require_admin;
