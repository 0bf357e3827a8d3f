pub mod auth;
pub mod rate_limit;

pub use auth::{customer_auth_middleware, CustomerClaims};
pub use rate_limit::{rate_limit_middleware, RateLimiter};
