pub mod auth;
pub mod resiliency;

pub use auth::{customer_auth_middleware, provider_auth_middleware, Claims};
