pub mod api_keys;
pub mod jwt;
pub mod middleware;
